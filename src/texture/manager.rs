//! Texture Resource Manager
//!
//! Owns the pool of texture resources, brokers load-by-asset-id requests
//! through the resource streamer, substitutes fallback textures while
//! streaming is in flight, applies the global top-mipmap-stripping policy,
//! and eagerly creates the built-in dynamic textures (white/black/identity
//! maps) under their well-known ids so material blueprints can always bind
//! something before real content loads.
//!
//! The pool is mutated only from the main thread. Workers mutate the
//! content of the load they were handed, never the pool structure.

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use std::sync::Arc;

use crate::asset::{self, AssetId, AssetProvider};
use crate::errors::{EngineError, Result};
use crate::rhi::{
    RhiDevice, RhiTexture, TextureDesc, TextureDimension, TextureFormat, TextureViewDimension,
};
use crate::streamer::{LoadRequest, ResourceStreamer};
use crate::texture::loader::{LoaderKind, create_gpu_texture};
use crate::texture::resource::{
    LoadState, ResourceListener, TextureResource, TextureResourceId,
};

const DEFAULT_WORKER_COUNT: usize = 2;

/// Pool owner and streaming broker for texture resources.
pub struct TextureResourceManager {
    device: Arc<dyn RhiDevice>,
    provider: Arc<dyn AssetProvider>,
    streamer: ResourceStreamer,
    pool: SlotMap<TextureResourceId, TextureResource>,
    lookup: FxHashMap<AssetId, TextureResourceId>,
    in_flight: FxHashSet<TextureResourceId>,
    listeners: FxHashMap<TextureResourceId, Vec<Arc<dyn ResourceListener>>>,
    top_mips_to_remove: u32,
}

impl TextureResourceManager {
    pub fn new(device: Arc<dyn RhiDevice>, provider: Arc<dyn AssetProvider>) -> Result<Self> {
        Self::with_worker_count(device, provider, DEFAULT_WORKER_COUNT)
    }

    pub fn with_worker_count(
        device: Arc<dyn RhiDevice>,
        provider: Arc<dyn AssetProvider>,
        worker_count: usize,
    ) -> Result<Self> {
        let streamer =
            ResourceStreamer::new(worker_count, Arc::clone(&provider), Arc::clone(&device));
        let mut manager = Self {
            device,
            provider,
            streamer,
            pool: SlotMap::default(),
            lookup: FxHashMap::default(),
            in_flight: FxHashSet::default(),
            listeners: FxHashMap::default(),
            top_mips_to_remove: 0,
        };
        manager.create_default_textures()?;
        Ok(manager)
    }

    // ========================================================================
    // Public contract
    // ========================================================================

    /// Requests `asset_id` asynchronously. The returned id is valid the
    /// moment this call returns; the resource's texture is the fallback
    /// (when one is available and loaded) until streaming completes.
    pub fn load_texture_resource_by_asset_id(
        &mut self,
        asset_id: AssetId,
        fallback_asset_id: Option<AssetId>,
        listener: Option<Arc<dyn ResourceListener>>,
        srgb: bool,
        reload: bool,
        loader_kind: Option<LoaderKind>,
    ) -> Result<TextureResourceId> {
        let existing = self.lookup.get(&asset_id).copied();
        let id = match existing {
            Some(id) => {
                if let Some(listener) = listener {
                    self.listeners.entry(id).or_default().push(listener);
                }
                let state = self.pool[id].load_state();
                if !reload && state != LoadState::Failed && state != LoadState::Unloaded {
                    return Ok(id);
                }
                id
            }
            None => {
                let kind = self.resolve_loader_kind(asset_id, loader_kind)?;
                let id = self
                    .pool
                    .insert(TextureResource::new_streamed(asset_id, srgb, kind));
                self.lookup.insert(asset_id, id);
                if let Some(listener) = listener {
                    self.listeners.entry(id).or_default().push(listener);
                }
                id
            }
        };

        // Bind the fallback so renders proceed with a placeholder. A
        // previously loaded texture stays bound across a reload.
        if self.pool[id].texture().is_none() {
            let fallback = fallback_asset_id.and_then(|fallback_id| {
                let resource = self.lookup.get(&fallback_id).map(|&fid| &self.pool[fid])?;
                resource.texture().cloned()
            });
            match fallback {
                Some(texture) => self.pool[id].set_texture(Some(texture)),
                None => log::warn!(
                    "no fallback texture available for {asset_id:?}; consumers null-check until streaming completes"
                ),
            }
        }

        let kind = self.pool[id]
            .loader_kind()
            .ok_or(EngineError::AssetAlreadyRegistered(asset_id))?;
        self.transition(id, LoadState::Loading);
        self.in_flight.insert(id);
        self.streamer.commit_load_request(LoadRequest {
            asset_id,
            resource_id: id,
            loader_kind: kind,
            srgb,
            reload,
            top_mips_to_remove: self.top_mips_to_remove,
        })?;
        Ok(id)
    }

    /// Synchronously wraps an already constructed GPU texture, used for
    /// dynamically generated textures such as the shadow targets.
    pub fn create_texture_resource_by_asset_id(
        &mut self,
        asset_id: AssetId,
        texture: RhiTexture,
        srgb: bool,
    ) -> Result<TextureResourceId> {
        if self.lookup.contains_key(&asset_id) {
            debug_assert!(false, "asset id {asset_id:?} is already registered");
            return Err(EngineError::AssetAlreadyRegistered(asset_id));
        }
        let id = self
            .pool
            .insert(TextureResource::new_dynamic(asset_id, texture, srgb));
        self.lookup.insert(asset_id, id);
        Ok(id)
    }

    /// Removes a resource from the pool. Destroying a resource with a
    /// streaming request in flight is a programming error; the call
    /// degrades to a no-op so the in-flight result cannot dangle.
    pub fn destroy_texture_resource(&mut self, id: TextureResourceId) -> Result<()> {
        if self.in_flight.contains(&id) {
            debug_assert!(false, "destroying a texture resource with a load in flight");
            log::error!("refusing to destroy texture resource with a load in flight");
            return Ok(());
        }
        let resource = self.pool.remove(id).ok_or(EngineError::StaleHandle)?;
        self.lookup.remove(&resource.asset_id());
        self.listeners.remove(&id);
        Ok(())
    }

    /// Global top-mipmap-stripping policy. An actual change triggers a
    /// bulk reload of every loaded asset-backed texture; repeating the
    /// current value is a no-op.
    pub fn set_number_of_top_mipmaps_to_remove(&mut self, count: u32) -> Result<()> {
        if count == self.top_mips_to_remove {
            return Ok(());
        }
        self.top_mips_to_remove = count;

        let to_reload: Vec<(TextureResourceId, AssetId, bool, LoaderKind)> = self
            .pool
            .iter()
            .filter(|(_, r)| r.is_asset_backed() && r.load_state() == LoadState::Loaded)
            .filter_map(|(id, r)| Some((id, r.asset_id(), r.is_srgb(), r.loader_kind()?)))
            .collect();

        log::debug!(
            "top mipmap removal set to {count}; reloading {} textures",
            to_reload.len()
        );
        for (id, asset_id, srgb, kind) in to_reload {
            self.transition(id, LoadState::Loading);
            self.in_flight.insert(id);
            self.streamer.commit_load_request(LoadRequest {
                asset_id,
                resource_id: id,
                loader_kind: kind,
                srgb,
                reload: true,
                top_mips_to_remove: count,
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn number_of_top_mipmaps_to_remove(&self) -> u32 {
        self.top_mips_to_remove
    }

    // ========================================================================
    // Per-frame dispatch (GPU-owning thread)
    // ========================================================================

    /// Completes finished loads: builds the GPU texture when the worker
    /// could not, publishes the handle, then flips the loading state.
    /// Call once per frame from the thread that owns the GPU context.
    pub fn dispatch(&mut self) {
        for result in self.streamer.drain_results() {
            let id = result.request.resource_id;
            self.in_flight.remove(&id);
            let Some(resource) = self.pool.get_mut(id) else {
                log::warn!(
                    "streamed result for {:?} arrived after the resource was destroyed",
                    result.request.asset_id
                );
                continue;
            };

            match result.outcome {
                Ok(completed) => {
                    let gpu = match completed.gpu {
                        Some(gpu) => Ok(gpu),
                        None => create_gpu_texture(&*self.device, &completed.decoded),
                    };
                    match gpu {
                        Ok(texture) => {
                            // Handle assignment is the publication point;
                            // the state flips only afterwards.
                            resource.set_texture(Some(texture));
                            self.transition(id, LoadState::Loaded);
                        }
                        Err(e) => {
                            log::error!(
                                "GPU texture creation failed for {:?}: {e}",
                                result.request.asset_id
                            );
                            self.transition(id, LoadState::Failed);
                        }
                    }
                }
                Err(e) => {
                    // The fallback (or previous texture) stays bound; the
                    // resource simply never reaches LOADED.
                    log::error!(
                        "texture decode failed for {:?}: {e}",
                        result.request.asset_id
                    );
                    self.transition(id, LoadState::Failed);
                }
            }
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    #[must_use]
    pub fn get(&self, id: TextureResourceId) -> Option<&TextureResource> {
        self.pool.get(id)
    }

    #[must_use]
    pub fn get_by_asset_id(&self, asset_id: AssetId) -> Option<&TextureResource> {
        self.lookup.get(&asset_id).map(|&id| &self.pool[id])
    }

    #[must_use]
    pub fn resource_id_by_asset_id(&self, asset_id: AssetId) -> Option<TextureResourceId> {
        self.lookup.get(&asset_id).copied()
    }

    /// The GPU texture currently bound for an asset id, if any.
    #[must_use]
    pub fn texture_by_asset_id(&self, asset_id: AssetId) -> Option<&RhiTexture> {
        self.get_by_asset_id(asset_id).and_then(TextureResource::texture)
    }

    /// Number of streaming requests currently in flight.
    #[must_use]
    pub fn pending_load_count(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn device(&self) -> &Arc<dyn RhiDevice> {
        &self.device
    }

    /// Blocks until every in-flight load has been dispatched. Intended
    /// for tools and tests; the render loop uses [`dispatch`](Self::dispatch).
    pub fn wait_for_pending_loads(&mut self) {
        while !self.in_flight.is_empty() {
            self.dispatch();
            if !self.in_flight.is_empty() {
                std::thread::yield_now();
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn resolve_loader_kind(
        &self,
        asset_id: AssetId,
        explicit: Option<LoaderKind>,
    ) -> Result<LoaderKind> {
        if let Some(kind) = explicit {
            return Ok(kind);
        }
        let filename = self
            .provider
            .virtual_filename(asset_id)
            .ok_or(EngineError::AssetNotFound(asset_id))?;
        LoaderKind::from_filename(&filename)
            .ok_or(EngineError::UnknownLoaderKind { filename })
    }

    fn transition(&mut self, id: TextureResourceId, state: LoadState) {
        let Some(resource) = self.pool.get_mut(id) else {
            return;
        };
        if resource.load_state() == state {
            return;
        }
        resource.set_state(state);
        if let Some(listeners) = self.listeners.get(&id) {
            for listener in listeners {
                listener.on_loading_state_change(id, state);
            }
        }
    }

    fn create_default_textures(&mut self) -> Result<()> {
        use asset::dynamic as ids;

        let white = [255u8, 255, 255, 255];
        let black = [0u8, 0, 0, 0];
        let normal = [128u8, 128, 255, 255];
        // Channel-packing identities: albedo/normal-x-alpha and
        // height/roughness/metallic/normal-y packings.
        let argb_nxa = [255u8, 255, 255, 128];
        let hr_rg_mb_nya = [255u8, 255, 0, 128];

        self.register_dynamic_2d(ids::WHITE_MAP_2D, "WhiteMap2D", white, true)?;
        self.register_dynamic_2d(ids::BLACK_MAP_2D, "BlackMap2D", black, true)?;
        self.register_dynamic_1d(ids::WHITE_MAP_1D, "WhiteMap1D", white)?;
        self.register_dynamic_1d(ids::BLACK_MAP_1D, "BlackMap1D", black)?;
        self.register_dynamic_cube(ids::WHITE_MAP_CUBE, "WhiteMapCube", white)?;
        self.register_dynamic_cube(ids::BLACK_MAP_CUBE, "BlackMapCube", black)?;
        self.register_dynamic_3d(ids::WHITE_MAP_3D, "WhiteMap3D", white)?;
        self.register_dynamic_3d(ids::BLACK_MAP_3D, "BlackMap3D", black)?;

        self.register_dynamic_2d(ids::IDENTITY_ALBEDO_MAP_2D, "IdentityAlbedoMap2D", white, true)?;
        self.register_dynamic_2d(ids::IDENTITY_NORMAL_MAP_2D, "IdentityNormalMap2D", normal, false)?;
        self.register_dynamic_2d(ids::IDENTITY_EMISSIVE_MAP_2D, "IdentityEmissiveMap2D", black, true)?;
        self.register_dynamic_2d(ids::IDENTITY_ARGB_NXA_2D, "Identity_argb_nxa2D", argb_nxa, false)?;
        self.register_dynamic_2d(
            ids::IDENTITY_HR_RG_MB_NYA_2D,
            "Identity_hr_rg_mb_nya2D",
            hr_rg_mb_nya,
            false,
        )?;

        self.register_dynamic_r8(ids::IDENTITY_ALPHA_MAP_2D, "IdentityAlphaMap2D", 255)?;
        self.register_dynamic_r8(ids::IDENTITY_ROUGHNESS_MAP_2D, "IdentityRoughnessMap2D", 255)?;
        self.register_dynamic_r8(ids::DIELECTRIC_METALLIC_MAP_2D, "DielectricMetallicMap2D", 0)?;
        Ok(())
    }

    fn register_dynamic_2d(
        &mut self,
        id: AssetId,
        label: &str,
        texel: [u8; 4],
        srgb: bool,
    ) -> Result<()> {
        let desc = TextureDesc::new_2d(
            label,
            1,
            1,
            if srgb {
                TextureFormat::Rgba8UnormSrgb
            } else {
                TextureFormat::Rgba8Unorm
            },
        );
        let texture = self.device.create_texture(&desc, Some(&texel))?;
        self.create_texture_resource_by_asset_id(id, texture, srgb)?;
        Ok(())
    }

    fn register_dynamic_1d(&mut self, id: AssetId, label: &str, texel: [u8; 4]) -> Result<()> {
        let desc = TextureDesc {
            dimension: TextureDimension::D1,
            view_dimension: TextureViewDimension::D1,
            ..TextureDesc::new_2d(label, 1, 1, TextureFormat::Rgba8Unorm)
        };
        let texture = self.device.create_texture(&desc, Some(&texel))?;
        self.create_texture_resource_by_asset_id(id, texture, false)?;
        Ok(())
    }

    fn register_dynamic_cube(&mut self, id: AssetId, label: &str, texel: [u8; 4]) -> Result<()> {
        let mut data = Vec::with_capacity(4 * 6);
        for _ in 0..6 {
            data.extend_from_slice(&texel);
        }
        let desc = TextureDesc {
            depth_or_array_layers: 6,
            view_dimension: TextureViewDimension::Cube,
            ..TextureDesc::new_2d(label, 1, 1, TextureFormat::Rgba8Unorm)
        };
        let texture = self.device.create_texture(&desc, Some(&data))?;
        self.create_texture_resource_by_asset_id(id, texture, false)?;
        Ok(())
    }

    fn register_dynamic_3d(&mut self, id: AssetId, label: &str, texel: [u8; 4]) -> Result<()> {
        let desc = TextureDesc {
            dimension: TextureDimension::D3,
            view_dimension: TextureViewDimension::D3,
            ..TextureDesc::new_2d(label, 1, 1, TextureFormat::Rgba8Unorm)
        };
        let texture = self.device.create_texture(&desc, Some(&texel))?;
        self.create_texture_resource_by_asset_id(id, texture, false)?;
        Ok(())
    }

    fn register_dynamic_r8(&mut self, id: AssetId, label: &str, texel: u8) -> Result<()> {
        let desc = TextureDesc::new_2d(label, 1, 1, TextureFormat::R8Unorm);
        let texture = self.device.create_texture(&desc, Some(&[texel]))?;
        self.create_texture_resource_by_asset_id(id, texture, false)?;
        Ok(())
    }

    /// Registers a texture created by a compositor pass under its
    /// dynamic id, replacing a previous registration if present.
    /// Used by the shadow pass across render-target recreation.
    pub fn replace_dynamic_texture(
        &mut self,
        asset_id: AssetId,
        texture: RhiTexture,
    ) -> Result<TextureResourceId> {
        if let Some(id) = self.lookup.get(&asset_id).copied() {
            self.destroy_texture_resource(id)?;
        }
        self.create_texture_resource_by_asset_id(asset_id, texture, false)
    }

    /// Deregisters a pass-owned dynamic texture, if registered.
    pub fn remove_dynamic_texture(&mut self, asset_id: AssetId) {
        if let Some(id) = self.lookup.get(&asset_id).copied() {
            let _ = self.destroy_texture_resource(id);
        }
    }
}
