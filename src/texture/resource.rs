//! Texture Resource
//!
//! One logical texture asset. Owned exclusively by the
//! [`TextureResourceManager`](super::manager::TextureResourceManager)'s
//! pooled storage and referenced by id from materials, compositor passes
//! and renderables. The pool is a generation-checked slotmap, so a stale
//! id is a detectable error rather than undefined behavior.

use slotmap::new_key_type;

use crate::asset::AssetId;
use crate::rhi::RhiTexture;
use crate::texture::loader::LoaderKind;

new_key_type! {
    /// Generation-checked handle into the texture resource pool.
    pub struct TextureResourceId;
}

/// Streaming state of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Callback fired on the main thread when a streamed resource changes
/// loading state.
pub trait ResourceListener: Send + Sync {
    fn on_loading_state_change(&self, id: TextureResourceId, state: LoadState);
}

/// One logical texture asset.
pub struct TextureResource {
    asset_id: AssetId,
    state: LoadState,
    /// Null while loading unless a fallback has been substituted. The
    /// handle has two writers across its lifetime (streamer worker and
    /// main thread) but never concurrently; assignment is the
    /// publication point.
    texture: Option<RhiTexture>,
    srgb: bool,
    /// `false` for textures wrapped by code (shadow targets, built-in
    /// identity maps); they are excluded from bulk reloads.
    asset_backed: bool,
    loader_kind: Option<LoaderKind>,
}

impl TextureResource {
    pub(crate) fn new_streamed(asset_id: AssetId, srgb: bool, loader_kind: LoaderKind) -> Self {
        Self {
            asset_id,
            state: LoadState::Unloaded,
            texture: None,
            srgb,
            asset_backed: true,
            loader_kind: Some(loader_kind),
        }
    }

    pub(crate) fn new_dynamic(asset_id: AssetId, texture: RhiTexture, srgb: bool) -> Self {
        Self {
            asset_id,
            state: LoadState::Loaded,
            texture: Some(texture),
            srgb,
            asset_backed: false,
            loader_kind: None,
        }
    }

    #[must_use]
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    #[must_use]
    pub fn load_state(&self) -> LoadState {
        self.state
    }

    /// The currently bound GPU texture: the streamed result once loaded,
    /// a fallback while loading, or `None` when neither exists yet.
    #[must_use]
    pub fn texture(&self) -> Option<&RhiTexture> {
        self.texture.as_ref()
    }

    #[must_use]
    pub fn is_srgb(&self) -> bool {
        self.srgb
    }

    #[must_use]
    pub fn is_asset_backed(&self) -> bool {
        self.asset_backed
    }

    #[must_use]
    pub fn loader_kind(&self) -> Option<LoaderKind> {
        self.loader_kind
    }

    pub(crate) fn set_state(&mut self, state: LoadState) {
        self.state = state;
    }

    pub(crate) fn set_texture(&mut self, texture: Option<RhiTexture>) {
        self.texture = texture;
    }
}
