//! Compositor Execution Tests
//!
//! Tests for:
//! - Shadow pass settings-generation idempotence and lazy rebuild
//! - Disabled shadow pass: dummy variance map only, zero recorded work
//! - Full-frame shadow execution: cascade splits, pass data, commands
//! - Copy / generate-mipmaps / compute pass recording
//! - Binary workspace deserialization

use std::sync::Arc;

use glam::{Mat4, Vec3};

use ember::asset::{AssetId, MemoryAssetProvider, dynamic};
use ember::compositor::desc::{
    CompositorNodeDesc, CompositorPassDesc, CompositorTargetDesc, CompositorWorkspaceDesc,
    CopyPassDesc, GenerateMipmapsPassDesc, ShadowMapPassDesc,
};
use ember::compositor::generation::{SettingsGeneration, SettingsState};
use ember::compositor::{CompositorWorkspace, FrameContext};
use ember::material::{MaterialBlueprint, MaterialBlueprintLibrary, MaterialResourceManager};
use ember::renderable::RenderableManager;
use ember::rhi::{
    BindingKind, Command, NullDevice, PipelineKind, RhiDevice, TextureDesc, TextureFormat,
};
use ember::scene::{CameraItem, DirectionalLightItem, FrameScene};
use ember::texture::TextureResourceManager;

const EPSILON: f32 = 1e-3;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

// ============================================================================
// Helpers
// ============================================================================

struct TestWorld {
    null_device: Arc<NullDevice>,
    textures: TextureResourceManager,
    blueprints: MaterialBlueprintLibrary,
    materials: MaterialResourceManager,
    renderables: RenderableManager,
    camera: CameraItem,
    light: DirectionalLightItem,
}

impl TestWorld {
    fn new() -> Self {
        let null_device = Arc::new(NullDevice::new());
        let device: Arc<dyn RhiDevice> = null_device.clone();
        let provider = Arc::new(MemoryAssetProvider::new());
        let textures = TextureResourceManager::new(device, provider).unwrap();

        let mut materials = MaterialResourceManager::new();
        let mut renderables = RenderableManager::new();
        let caster_material =
            materials.create_material(AssetId::from_path("M/Caster"), 50, true, false);
        for i in 0..3u32 {
            let key = renderables.create_renderable(i * 36..(i + 1) * 36, None);
            renderables
                .set_material(key, caster_material, &mut materials)
                .unwrap();
        }
        renderables.update_cached_aggregates();

        let camera = CameraItem {
            view_matrix: Mat4::look_at_rh(Vec3::new(0.0, 3.0, 8.0), Vec3::ZERO, Vec3::Y),
            projection_matrix: Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
            near: 0.1,
            far: 100.0,
        };
        let light = DirectionalLightItem {
            direction: Vec3::new(0.3, -1.0, 0.2).normalize(),
        };

        Self {
            null_device,
            textures,
            blueprints: MaterialBlueprintLibrary::new(),
            materials,
            renderables,
            camera,
            light,
        }
    }

    fn workspace(&mut self, desc: CompositorWorkspaceDesc) -> CompositorWorkspace {
        CompositorWorkspace::new(Arc::new(desc), &mut self.textures, &self.blueprints).unwrap()
    }

    fn execute(&mut self, workspace: &mut CompositorWorkspace) -> ember::rhi::CommandBuffer {
        let mut ctx = FrameContext {
            textures: &mut self.textures,
            blueprints: &self.blueprints,
            scene: FrameScene {
                camera: &self.camera,
                light: Some(&self.light),
                renderables: &self.renderables,
                materials: &self.materials,
            },
            stereo_instancing: false,
        };
        workspace.execute(&mut ctx).unwrap()
    }
}

fn single_pass_desc(pass: CompositorPassDesc) -> CompositorWorkspaceDesc {
    single_pass_desc_with_target(pass, None)
}

fn single_pass_desc_with_target(
    pass: CompositorPassDesc,
    render_target: Option<AssetId>,
) -> CompositorWorkspaceDesc {
    CompositorWorkspaceDesc {
        nodes: vec![Arc::new(CompositorNodeDesc {
            node_id: 1,
            targets: vec![CompositorTargetDesc {
                render_target,
                passes: vec![pass],
            }],
        })],
    }
}

// ============================================================================
// Settings Generation
// ============================================================================

#[test]
fn settings_generation_two_state_machine() {
    let mut generation = SettingsGeneration::new();
    assert_eq!(generation.state(), SettingsState::Current);
    generation.bump();
    assert_eq!(generation.state(), SettingsState::Stale);
    generation.mark_applied();
    assert_eq!(generation.state(), SettingsState::Current);
}

#[test]
fn redundant_cascade_count_does_not_bump_generation() {
    let mut world = TestWorld::new();
    let mut workspace =
        world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
            ShadowMapPassDesc::default(),
        )));

    let shadow = workspace.shadow_pass_mut().unwrap();
    let before = shadow.settings_generation();
    shadow.set_number_of_shadow_cascades(4); // already 4
    assert_eq!(shadow.settings_generation(), before);

    shadow.set_number_of_shadow_cascades(2);
    assert_eq!(shadow.settings_generation(), before + 1);
    shadow.set_number_of_shadow_cascades(2);
    assert_eq!(shadow.settings_generation(), before + 1);
}

#[test]
fn unchanged_settings_do_not_recreate_render_targets() {
    let mut world = TestWorld::new();
    let mut workspace =
        world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
            ShadowMapPassDesc::default(),
        )));

    world.execute(&mut workspace);
    let created_after_first = world.null_device.created_texture_count();

    workspace.shadow_pass_mut().unwrap().set_number_of_shadow_cascades(4);
    world.execute(&mut workspace);
    assert_eq!(
        world.null_device.created_texture_count(),
        created_after_first,
        "no-op settings must not recreate render targets"
    );
}

#[test]
fn changed_settings_recreate_render_targets_once() {
    let mut world = TestWorld::new();
    let mut workspace =
        world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
            ShadowMapPassDesc::default(),
        )));

    world.execute(&mut workspace);
    let created_after_first = world.null_device.created_texture_count();

    workspace.shadow_pass_mut().unwrap().set_number_of_shadow_cascades(2);
    world.execute(&mut workspace);
    let created_after_change = world.null_device.created_texture_count();
    assert!(
        created_after_change > created_after_first,
        "stale settings must rebuild the target chain"
    );

    world.execute(&mut workspace);
    assert_eq!(
        world.null_device.created_texture_count(),
        created_after_change,
        "rebuild happens at most once per settings change"
    );
}

// ============================================================================
// Shadow Pass Execution
// ============================================================================

#[test]
fn shadow_cascade_splits_monotonic_and_reach_far_plane() {
    let mut world = TestWorld::new();
    let mut workspace = world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
        ShadowMapPassDesc {
            split_lambda: 0.99,
            ..ShadowMapPassDesc::default()
        },
    )));

    world.execute(&mut workspace);
    let data = workspace.shadow_pass_data().expect("shadow data produced");

    assert_eq!(data.cascade_count, 4);
    for i in 1..4 {
        assert!(
            data.cascade_splits[i] > data.cascade_splits[i - 1],
            "splits must increase: {:?}",
            data.cascade_splits
        );
    }
    assert!(
        approx(data.cascade_splits[3], 100.0),
        "last split should reach the far plane, got {}",
        data.cascade_splits[3]
    );
    assert_eq!(data.current_cascade, 0, "reset after the render loop");
    assert!(data.shadow_map_texel_size > 0.0);
}

#[test]
fn shadow_pass_records_caster_draws_and_evsm_conversions() {
    let mut world = TestWorld::new();
    let mut workspace =
        world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
            ShadowMapPassDesc::default(),
        )));

    let commands = world.execute(&mut workspace);
    // 3 casters × 4 cascades plus one EVSM fullscreen triangle per
    // cascade, plus blur passes where the footprint is wide enough.
    assert!(
        commands.draw_count() >= 16,
        "expected caster and EVSM draws, got {}",
        commands.draw_count()
    );
    world.null_device.submit(&commands).unwrap();
    assert_eq!(world.null_device.stats().draws as usize, commands.draw_count());
}

#[test]
fn shadow_pass_registers_target_chain_under_dynamic_ids() {
    let mut world = TestWorld::new();
    let _workspace =
        world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
            ShadowMapPassDesc::default(),
        )));

    let depth = world.textures.texture_by_asset_id(dynamic::SHADOW_DEPTH_MAP).unwrap();
    assert_eq!(depth.desc().format, TextureFormat::Depth32Float);
    assert_eq!(depth.desc().width, 1024);

    let variance = world
        .textures
        .texture_by_asset_id(dynamic::SHADOW_VARIANCE_MAP)
        .unwrap();
    assert_eq!(variance.desc().depth_or_array_layers, 4);

    assert!(
        world
            .textures
            .texture_by_asset_id(dynamic::SHADOW_INTERMEDIATE_MAP)
            .is_some()
    );
}

#[test]
fn disabled_shadow_pass_registers_dummy_and_records_nothing() {
    let mut world = TestWorld::new();
    let mut workspace = world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
        ShadowMapPassDesc {
            enabled: false,
            ..ShadowMapPassDesc::default()
        },
    )));

    // Only the 1×1 dummy variance texture is registered.
    let variance = world
        .textures
        .texture_by_asset_id(dynamic::SHADOW_VARIANCE_MAP)
        .unwrap();
    assert_eq!((variance.desc().width, variance.desc().height), (1, 1));
    assert!(
        world
            .textures
            .texture_by_asset_id(dynamic::SHADOW_DEPTH_MAP)
            .is_none()
    );

    let commands = world.execute(&mut workspace);
    assert_eq!(commands.draw_count(), 0);
    assert_eq!(commands.dispatch_count(), 0);
}

#[test]
fn toggling_enabled_switches_between_dummy_and_full_chain() {
    let mut world = TestWorld::new();
    let mut workspace =
        world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
            ShadowMapPassDesc::default(),
        )));
    assert!(
        world
            .textures
            .texture_by_asset_id(dynamic::SHADOW_DEPTH_MAP)
            .is_some()
    );

    workspace.shadow_pass_mut().unwrap().set_enabled(false);
    world.execute(&mut workspace);

    assert!(
        world
            .textures
            .texture_by_asset_id(dynamic::SHADOW_DEPTH_MAP)
            .is_none(),
        "depth map must be deregistered when disabled"
    );
    let variance = world
        .textures
        .texture_by_asset_id(dynamic::SHADOW_VARIANCE_MAP)
        .unwrap();
    assert_eq!((variance.desc().width, variance.desc().height), (1, 1));
}

#[test]
fn multisample_count_clamped_to_backend_maximum() {
    let mut world = TestWorld::new();
    let mut workspace =
        world.workspace(single_pass_desc(CompositorPassDesc::ShadowMap(
            ShadowMapPassDesc::default(),
        )));

    // Backend maximum is 4; requesting 16 must silently clamp.
    workspace
        .shadow_pass_mut()
        .unwrap()
        .set_number_of_shadow_multisamples(16);
    world.execute(&mut workspace);

    let depth = world.textures.texture_by_asset_id(dynamic::SHADOW_DEPTH_MAP).unwrap();
    assert_eq!(depth.desc().sample_count, 4);
}

// ============================================================================
// Copy / GenerateMipmaps / Compute Passes
// ============================================================================

#[test]
fn copy_pass_records_one_copy() {
    let mut world = TestWorld::new();
    let source_id = AssetId::from_path("RT/Source");
    let destination_id = AssetId::from_path("RT/Destination");
    let device = Arc::clone(world.textures.device());
    for (asset_id, label) in [(source_id, "Source"), (destination_id, "Destination")] {
        let texture = device
            .create_texture(&TextureDesc::new_2d(label, 64, 64, TextureFormat::Rgba8Unorm), None)
            .unwrap();
        world
            .textures
            .create_texture_resource_by_asset_id(asset_id, texture, false)
            .unwrap();
    }

    let mut workspace = world.workspace(single_pass_desc(CompositorPassDesc::Copy(
        CopyPassDesc {
            destination: destination_id,
            source: source_id,
        },
    )));
    let commands = world.execute(&mut workspace);
    let copies = commands
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::CopyTexture { .. }))
        .count();
    assert_eq!(copies, 1);
}

#[test]
fn hardware_mipmap_pass_records_generate_command() {
    let mut world = TestWorld::new();
    let texture_id = AssetId::from_path("RT/Mipped");
    let device = Arc::clone(world.textures.device());
    let texture = device
        .create_texture(
            &TextureDesc {
                mip_level_count: 4,
                ..TextureDesc::new_2d("Mipped", 64, 64, TextureFormat::Rgba8Unorm)
            },
            None,
        )
        .unwrap();
    world
        .textures
        .create_texture_resource_by_asset_id(texture_id, texture, false)
        .unwrap();

    let mut workspace = world.workspace(single_pass_desc(
        CompositorPassDesc::GenerateMipmaps(GenerateMipmapsPassDesc {
            texture: texture_id,
            blueprint: None,
        }),
    ));
    let commands = world.execute(&mut workspace);
    assert!(
        commands
            .commands()
            .iter()
            .any(|c| matches!(c, Command::GenerateMipmaps { .. }))
    );
}

#[test]
fn custom_mipmap_pass_draws_once_per_level() {
    let mut world = TestWorld::new();
    let texture_id = AssetId::from_path("RT/Hiz");
    let blueprint_id = AssetId::from_path("Blueprint/Downsample");
    world.blueprints.register(
        blueprint_id,
        MaterialBlueprint {
            label: "Downsample".into(),
            source: "fullscreen downsample".into(),
            kind: PipelineKind::Graphics,
            bindings: vec![BindingKind::Sampler, BindingKind::Texture2d],
        },
    );

    let device = Arc::clone(world.textures.device());
    let texture = device
        .create_texture(
            &TextureDesc {
                mip_level_count: 5,
                usage: ember::rhi::TextureUsage::SAMPLED
                    | ember::rhi::TextureUsage::RENDER_ATTACHMENT,
                ..TextureDesc::new_2d("Hiz", 64, 64, TextureFormat::Rgba8Unorm)
            },
            None,
        )
        .unwrap();
    world
        .textures
        .create_texture_resource_by_asset_id(texture_id, texture, false)
        .unwrap();

    let mut workspace = world.workspace(single_pass_desc(
        CompositorPassDesc::GenerateMipmaps(GenerateMipmapsPassDesc {
            texture: texture_id,
            blueprint: Some(blueprint_id),
        }),
    ));
    let commands = world.execute(&mut workspace);
    // Levels 1..=4 each get one fullscreen draw.
    assert_eq!(commands.draw_count(), 4);
}

#[test]
fn compute_pass_dispatches_against_target_extent() {
    let mut world = TestWorld::new();
    let target_id = AssetId::from_path("RT/ComputeTarget");
    let blueprint_id = AssetId::from_path("Blueprint/Generate");
    world.blueprints.register(
        blueprint_id,
        MaterialBlueprint {
            label: "Generate".into(),
            source: "compute kernel".into(),
            kind: PipelineKind::Compute,
            bindings: vec![],
        },
    );

    let device = Arc::clone(world.textures.device());
    let texture = device
        .create_texture(
            &TextureDesc {
                usage: ember::rhi::TextureUsage::SAMPLED
                    | ember::rhi::TextureUsage::RENDER_ATTACHMENT,
                ..TextureDesc::new_2d("ComputeTarget", 64, 32, TextureFormat::Rgba8Unorm)
            },
            None,
        )
        .unwrap();
    world
        .textures
        .create_texture_resource_by_asset_id(target_id, texture, false)
        .unwrap();

    let mut workspace = world.workspace(single_pass_desc_with_target(
        CompositorPassDesc::Compute(ember::compositor::desc::ComputePassDesc {
            blueprint: blueprint_id,
            properties: ember::material::MaterialProperties::new(),
        }),
        Some(target_id),
    ));
    let commands = world.execute(&mut workspace);
    let dispatch = commands
        .commands()
        .iter()
        .find_map(|c| match c {
            Command::Dispatch { groups } => Some(*groups),
            _ => None,
        })
        .expect("compute pass must dispatch");
    assert_eq!(dispatch, [8, 4, 1]);
}

// ============================================================================
// Wire Format
// ============================================================================

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[test]
fn workspace_deserializes_from_binary_blob() {
    let mut blob = Vec::new();
    blob.extend_from_slice(b"EBCW");
    push_u32(&mut blob, 1); // version
    push_u32(&mut blob, 1); // node count
    push_u64(&mut blob, 0xABCD); // node id
    push_u32(&mut blob, 1); // target count
    push_u64(&mut blob, 0); // no render target
    push_u32(&mut blob, 2); // pass count

    // Copy pass.
    blob.extend_from_slice(b"COPY");
    push_u32(&mut blob, 16);
    push_u64(&mut blob, 0x1111); // destination
    push_u64(&mut blob, 0x2222); // source

    // Compute pass with one texture property.
    blob.extend_from_slice(b"COMP");
    push_u32(&mut blob, 16 + 24);
    push_u64(&mut blob, 0x3333); // blueprint
    push_u32(&mut blob, 1); // property count
    push_u32(&mut blob, 0); // reserved
    push_u64(&mut blob, ember::asset::property::COLOR_MAP.0);
    blob.push(3); // texture kind
    blob.extend_from_slice(&[0; 7]);
    push_u64(&mut blob, 0x4444);

    let desc = CompositorWorkspaceDesc::from_bytes(&blob).unwrap();
    assert_eq!(desc.nodes.len(), 1);
    let node = &desc.nodes[0];
    assert_eq!(node.node_id, 0xABCD);
    assert_eq!(node.targets.len(), 1);
    let target = &node.targets[0];
    assert!(target.render_target.is_none());
    assert_eq!(target.passes.len(), 2);

    match &target.passes[0] {
        CompositorPassDesc::Copy(copy) => {
            assert_eq!(copy.destination, AssetId(0x1111));
            assert_eq!(copy.source, AssetId(0x2222));
        }
        other => panic!("expected copy pass, got {other:?}"),
    }
    match &target.passes[1] {
        CompositorPassDesc::Compute(compute) => {
            assert_eq!(compute.blueprint, AssetId(0x3333));
            assert_eq!(
                compute.properties.get(ember::asset::property::COLOR_MAP),
                Some(ember::material::PropertyValue::Texture(AssetId(0x4444)))
            );
        }
        other => panic!("expected compute pass, got {other:?}"),
    }
}

#[test]
fn workspace_rejects_bad_magic() {
    let mut blob = Vec::new();
    blob.extend_from_slice(b"NOPE");
    push_u32(&mut blob, 1);
    push_u32(&mut blob, 0);
    assert!(CompositorWorkspaceDesc::from_bytes(&blob).is_err());
}

#[test]
fn workspace_rejects_unknown_pass_tag() {
    let mut blob = Vec::new();
    blob.extend_from_slice(b"EBCW");
    push_u32(&mut blob, 1);
    push_u32(&mut blob, 1);
    push_u64(&mut blob, 1);
    push_u32(&mut blob, 1);
    push_u64(&mut blob, 0);
    push_u32(&mut blob, 1);
    blob.extend_from_slice(b"WHAT");
    push_u32(&mut blob, 0);
    assert!(CompositorWorkspaceDesc::from_bytes(&blob).is_err());
}
