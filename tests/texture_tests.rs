//! Texture Streaming Tests
//!
//! Tests for:
//! - Synchronous id validity and fallback substitution while streaming
//! - Loading-state transitions via the listener callback
//! - Top-mipmap-removal clamping (4×4 block constraints)
//! - Bulk reload on top-mip policy change, no-op on repeated value
//! - Block-compressed single and array texture decoding
//! - RGBA8 transcode fallback on backends without BC sampling

use std::sync::{Arc, Mutex};

use ember::asset::{AssetId, MemoryAssetProvider, dynamic};
use ember::rhi::{Capabilities, NullDevice, RhiDevice, TextureFormat, TextureViewDimension};
use ember::texture::loader::clamp_top_mipmap_removal;
use ember::texture::{LoadState, ResourceListener, TextureResourceId, TextureResourceManager};

// ============================================================================
// Helpers
// ============================================================================

fn bytes_per_block(format_tag: u8) -> u32 {
    match format_tag {
        0 => 8,
        _ => 16,
    }
}

/// Builds an engine block-texture container with filler block data.
fn build_btx(format_tag: u8, width: u32, height: u32, mips: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"EBTX");
    out.push(format_tag);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&mips.to_le_bytes());
    for mip in 0..mips {
        let blocks_x = (width >> mip).max(1).div_ceil(4);
        let blocks_y = (height >> mip).max(1).div_ceil(4);
        let size = blocks_x * blocks_y * bytes_per_block(format_tag);
        out.extend(std::iter::repeat_n(0xAB, size as usize));
    }
    out
}

fn build_bta(slice_ids: &[AssetId]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"EBTA");
    out.push(0);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(&(slice_ids.len() as u32).to_le_bytes());
    for id in slice_ids {
        out.extend_from_slice(&id.0.to_le_bytes());
    }
    out
}

fn setup() -> (Arc<MemoryAssetProvider>, TextureResourceManager) {
    setup_with_capabilities(Capabilities::default())
}

fn setup_with_capabilities(
    capabilities: Capabilities,
) -> (Arc<MemoryAssetProvider>, TextureResourceManager) {
    let provider = Arc::new(MemoryAssetProvider::new());
    let device: Arc<dyn RhiDevice> = Arc::new(NullDevice::with_capabilities(capabilities));
    let manager = TextureResourceManager::new(device, provider.clone()).unwrap();
    (provider, manager)
}

#[derive(Default)]
struct RecordingListener {
    states: Mutex<Vec<LoadState>>,
}

impl ResourceListener for RecordingListener {
    fn on_loading_state_change(&self, _id: TextureResourceId, state: LoadState) {
        self.states.lock().unwrap().push(state);
    }
}

// ============================================================================
// Top-Mipmap-Removal Clamp Tests
// ============================================================================

#[test]
fn mip_removal_keeps_block_aligned_base() {
    // 16x16 with two mips removed leaves a 4x4 base: allowed.
    assert_eq!(clamp_top_mipmap_removal(2, 16, 16), 2);
}

#[test]
fn mip_removal_snaps_downward_past_too_small_levels() {
    // Removing 3 from 16x16 would leave 2x2; snap down to 2 (4x4 base).
    assert_eq!(clamp_top_mipmap_removal(3, 16, 16), 2);
}

#[test]
fn mip_removal_requires_divisible_by_four() {
    // 20>>1 = 10, not divisible by 4; 20>>2 = 5, not divisible: clamp to 0.
    assert_eq!(clamp_top_mipmap_removal(2, 20, 20), 0);
}

#[test]
fn mip_removal_zero_is_identity() {
    assert_eq!(clamp_top_mipmap_removal(0, 1024, 1024), 0);
}

#[test]
fn mip_removal_no_valid_level_clamps_to_zero() {
    assert_eq!(clamp_top_mipmap_removal(2, 6, 6), 0);
}

#[test]
fn mip_removal_respects_both_axes() {
    // 64x16: removal 2 leaves 16x4 (both >=4, divisible): allowed.
    assert_eq!(clamp_top_mipmap_removal(2, 64, 16), 2);
    // Removal 3 would leave 8x2: snap to 2.
    assert_eq!(clamp_top_mipmap_removal(3, 64, 16), 2);
}

// ============================================================================
// Fallback Substitution (streaming)
// ============================================================================

#[test]
fn load_returns_valid_id_with_fallback_bound_immediately() {
    let (provider, mut manager) = setup();
    let asset = provider.insert("textures/rock.btx", build_btx(0, 16, 16, 3));

    let id = manager
        .load_texture_resource_by_asset_id(
            asset,
            Some(dynamic::IDENTITY_ALBEDO_MAP_2D),
            None,
            true,
            false,
            None,
        )
        .unwrap();

    // The id resolves synchronously; the bound texture is the built-in
    // identity albedo map until streaming completes.
    let fallback = manager
        .texture_by_asset_id(dynamic::IDENTITY_ALBEDO_MAP_2D)
        .unwrap()
        .clone();
    let resource = manager.get(id).unwrap();
    assert_eq!(resource.load_state(), LoadState::Loading);
    let bound = resource.texture().expect("fallback must be bound");
    assert!(bound.same_allocation(&fallback));

    manager.wait_for_pending_loads();
    let resource = manager.get(id).unwrap();
    assert_eq!(resource.load_state(), LoadState::Loaded);
    let streamed = resource.texture().unwrap();
    assert!(!streamed.same_allocation(&fallback));
    assert_eq!(streamed.desc().width, 16);
    assert_eq!(streamed.desc().mip_level_count, 3);
    assert_eq!(streamed.desc().format, TextureFormat::Bc1RgbaUnormSrgb);
}

#[test]
fn listener_sees_loading_then_loaded() {
    let (provider, mut manager) = setup();
    let asset = provider.insert("textures/wall.btx", build_btx(1, 8, 8, 1));
    let listener = Arc::new(RecordingListener::default());
    let listener_handle: Arc<dyn ember::texture::ResourceListener> = listener.clone();

    manager
        .load_texture_resource_by_asset_id(
            asset,
            Some(dynamic::IDENTITY_ALBEDO_MAP_2D),
            Some(listener_handle),
            false,
            false,
            None,
        )
        .unwrap();
    manager.wait_for_pending_loads();

    let states = listener.states.lock().unwrap().clone();
    assert_eq!(states, vec![LoadState::Loading, LoadState::Loaded]);
}

#[test]
fn missing_fallback_leaves_texture_unbound() {
    let (provider, mut manager) = setup();
    let asset = provider.insert("textures/late.btx", build_btx(0, 8, 8, 1));

    let id = manager
        .load_texture_resource_by_asset_id(asset, None, None, false, false, None)
        .unwrap();
    assert!(manager.get(id).unwrap().texture().is_none());

    manager.wait_for_pending_loads();
    assert!(manager.get(id).unwrap().texture().is_some());
}

#[test]
fn repeated_load_reuses_resource_id() {
    let (provider, mut manager) = setup();
    let asset = provider.insert("textures/shared.btx", build_btx(0, 8, 8, 1));

    let first = manager
        .load_texture_resource_by_asset_id(asset, None, None, false, false, None)
        .unwrap();
    let second = manager
        .load_texture_resource_by_asset_id(asset, None, None, false, false, None)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(manager.pending_load_count(), 1);
    manager.wait_for_pending_loads();
}

#[test]
fn decode_failure_keeps_fallback_and_marks_failed() {
    let (provider, mut manager) = setup();
    let asset = provider.insert("textures/corrupt.btx", b"EBTXgarbage".to_vec());

    let id = manager
        .load_texture_resource_by_asset_id(
            asset,
            Some(dynamic::IDENTITY_ALBEDO_MAP_2D),
            None,
            false,
            false,
            None,
        )
        .unwrap();
    manager.wait_for_pending_loads();

    let resource = manager.get(id).unwrap();
    assert_eq!(resource.load_state(), LoadState::Failed);
    // Never leaves the placeholder: the fallback is still bound.
    let fallback = manager
        .texture_by_asset_id(dynamic::IDENTITY_ALBEDO_MAP_2D)
        .unwrap();
    assert!(manager.get(id).unwrap().texture().unwrap().same_allocation(fallback));
}

#[test]
fn unknown_extension_is_rejected() {
    let (provider, mut manager) = setup();
    let asset = provider.insert("textures/file.xyz", vec![0u8; 4]);
    let result =
        manager.load_texture_resource_by_asset_id(asset, None, None, false, false, None);
    assert!(result.is_err());
}

// ============================================================================
// Top-Mip Policy Bulk Reload
// ============================================================================

#[test]
fn top_mip_policy_change_reloads_loaded_assets_once() {
    let (provider, mut manager) = setup();
    let asset = provider.insert("textures/big.btx", build_btx(0, 16, 16, 3));
    let id = manager
        .load_texture_resource_by_asset_id(asset, None, None, false, false, None)
        .unwrap();
    manager.wait_for_pending_loads();
    assert_eq!(
        manager.get(id).unwrap().texture().unwrap().desc().mip_level_count,
        3
    );

    manager.set_number_of_top_mipmaps_to_remove(2).unwrap();
    assert_eq!(manager.pending_load_count(), 1, "one bulk reload expected");
    manager.wait_for_pending_loads();

    let desc = manager.get(id).unwrap().texture().unwrap().desc().clone();
    assert_eq!(desc.width, 4);
    assert_eq!(desc.height, 4);
    assert_eq!(desc.mip_level_count, 1);

    // Same value again: stored policy unchanged, no reload pass.
    manager.set_number_of_top_mipmaps_to_remove(2).unwrap();
    assert_eq!(manager.pending_load_count(), 0, "repeat must be a no-op");
}

#[test]
fn dynamic_textures_are_exempt_from_bulk_reload() {
    let (_provider, mut manager) = setup();
    manager.set_number_of_top_mipmaps_to_remove(1).unwrap();
    assert_eq!(manager.pending_load_count(), 0);
}

// ============================================================================
// Built-in Dynamic Textures
// ============================================================================

#[test]
fn built_in_identity_maps_exist() {
    let (_provider, manager) = setup();
    for id in [
        dynamic::WHITE_MAP_1D,
        dynamic::WHITE_MAP_2D,
        dynamic::WHITE_MAP_CUBE,
        dynamic::WHITE_MAP_3D,
        dynamic::BLACK_MAP_1D,
        dynamic::BLACK_MAP_2D,
        dynamic::BLACK_MAP_CUBE,
        dynamic::BLACK_MAP_3D,
        dynamic::IDENTITY_ALBEDO_MAP_2D,
        dynamic::IDENTITY_ALPHA_MAP_2D,
        dynamic::IDENTITY_NORMAL_MAP_2D,
        dynamic::IDENTITY_ROUGHNESS_MAP_2D,
        dynamic::DIELECTRIC_METALLIC_MAP_2D,
        dynamic::IDENTITY_EMISSIVE_MAP_2D,
        dynamic::IDENTITY_ARGB_NXA_2D,
        dynamic::IDENTITY_HR_RG_MB_NYA_2D,
    ] {
        let resource = manager.get_by_asset_id(id).unwrap_or_else(|| {
            panic!("built-in dynamic texture {id:?} missing");
        });
        assert_eq!(resource.load_state(), LoadState::Loaded);
        assert!(resource.texture().is_some());
        assert!(!resource.is_asset_backed());
    }
}

#[test]
fn duplicate_dynamic_registration_is_an_error() {
    let (_provider, mut manager) = setup();
    let existing = manager
        .texture_by_asset_id(dynamic::WHITE_MAP_2D)
        .unwrap()
        .clone();
    // Registering the same well-known id twice must fail.
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        manager.create_texture_resource_by_asset_id(dynamic::WHITE_MAP_2D, existing, true)
    }));
    // Debug builds assert; release builds return the error.
    match result {
        Ok(inner) => assert!(inner.is_err()),
        Err(_) => {}
    }
}

// ============================================================================
// Block Array Textures
// ============================================================================

#[test]
fn block_array_decodes_all_slices() {
    let (provider, mut manager) = setup();
    let slice0 = provider.insert("textures/array_0.btx", build_btx(0, 8, 8, 2));
    let slice1 = provider.insert("textures/array_1.btx", build_btx(0, 8, 8, 2));
    let manifest = provider.insert("textures/array.bta", build_bta(&[slice0, slice1]));

    let id = manager
        .load_texture_resource_by_asset_id(manifest, None, None, false, false, None)
        .unwrap();
    manager.wait_for_pending_loads();

    let resource = manager.get(id).unwrap();
    assert_eq!(resource.load_state(), LoadState::Loaded);
    let desc = resource.texture().unwrap().desc().clone();
    assert_eq!(desc.depth_or_array_layers, 2);
    assert_eq!(desc.view_dimension, TextureViewDimension::D2Array);
    assert_eq!(desc.mip_level_count, 2);
    assert_eq!(desc.format, TextureFormat::Bc1RgbaUnorm);
}

#[test]
fn block_array_slice_mismatch_fails_the_load() {
    let (provider, mut manager) = setup();
    let slice0 = provider.insert("textures/bad_0.btx", build_btx(0, 8, 8, 2));
    // Wrong dimensions relative to the master slice.
    let slice1 = provider.insert("textures/bad_1.btx", build_btx(0, 16, 16, 2));
    let manifest = provider.insert("textures/bad.bta", build_bta(&[slice0, slice1]));

    let id = manager
        .load_texture_resource_by_asset_id(manifest, None, None, false, false, None)
        .unwrap();

    // In debug builds the worker thread asserts on the mismatch, which
    // surfaces as a failed load either way.
    manager.wait_for_pending_loads();
    assert_ne!(manager.get(id).unwrap().load_state(), LoadState::Loaded);
}

// ============================================================================
// Transcode Fallback (no BC sampling support)
// ============================================================================

#[test]
fn bc_payload_transcodes_to_rgba_when_unsupported() {
    let (provider, mut manager) = setup_with_capabilities(Capabilities {
        supports_bc_compression: false,
        ..Capabilities::default()
    });
    let asset = provider.insert("textures/soft.btx", build_btx(0, 8, 8, 2));

    let id = manager
        .load_texture_resource_by_asset_id(asset, None, None, false, false, None)
        .unwrap();
    manager.wait_for_pending_loads();

    let resource = manager.get(id).unwrap();
    assert_eq!(resource.load_state(), LoadState::Loaded);
    let desc = resource.texture().unwrap().desc().clone();
    assert_eq!(desc.format, TextureFormat::Rgba8Unorm);
    assert_eq!(desc.mip_level_count, 2);
}

// ============================================================================
// Single-Threaded Upload Path
// ============================================================================

#[test]
fn upload_happens_at_dispatch_without_native_multithreading() {
    let (provider, mut manager) = setup_with_capabilities(Capabilities {
        native_multithreading: false,
        ..Capabilities::default()
    });
    let asset = provider.insert("textures/serial.btx", build_btx(0, 8, 8, 1));

    let id = manager
        .load_texture_resource_by_asset_id(asset, None, None, false, false, None)
        .unwrap();
    manager.wait_for_pending_loads();
    assert_eq!(manager.get(id).unwrap().load_state(), LoadState::Loaded);
    assert!(manager.get(id).unwrap().texture().is_some());
}

#[test]
fn destroy_after_load_completes() {
    let (provider, mut manager) = setup();
    let asset = provider.insert("textures/done.btx", build_btx(0, 8, 8, 1));
    let id = manager
        .load_texture_resource_by_asset_id(asset, None, None, false, false, None)
        .unwrap();
    manager.wait_for_pending_loads();
    manager.destroy_texture_resource(id).unwrap();
    assert!(manager.get(id).is_none());
    assert!(manager.get_by_asset_id(asset).is_none());
}
