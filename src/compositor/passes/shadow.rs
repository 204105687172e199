//! Shadow Map Pass
//!
//! Renders cascaded shadow maps for the primary directional light, each
//! cascade covering a deeper slice of the view frustum, then converts the
//! raw depth into exponential-variance form and blurs it so the lighting
//! pass can sample soft shadows cheaply.
//!
//! Settings mutation is deferred: mutators only bump a generation
//! counter, and the per-frame fill compares applied vs. current and
//! tears down/rebuilds the pass-owned render targets on mismatch. A
//! disabled pass keeps a 1×1 dummy variance texture registered so
//! downstream bindings never see a null resource.

use glam::{Mat4, Vec2, Vec3};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::asset::{dynamic, property};
use crate::compositor::desc::{MAXIMUM_NUMBER_OF_SHADOW_CASCADES, ShadowMapPassDesc};
use crate::compositor::generation::{SettingsGeneration, SettingsState};
use crate::compositor::passes::shadow_math::{
    MAX_CASCADES, build_cascade_view_projection, cascade_uv_remap, clip_to_uv_matrix,
    compute_cascade_splits, frustum_corners_world, light_space_extents, light_up_vector,
    pad_extents_for_filtering, slice_frustum_corners, stabilize_cascade,
};
use crate::compositor::passes::apply_blueprint_properties;
use crate::compositor::render_queue::RenderQueue;
use crate::compositor::workspace::{InstanceContext, PassContext};
use crate::errors::Result;
use crate::material::{MaterialBlueprintLibrary, MaterialProperties, PropertyValue};
use crate::rhi::{
    Attachment, BindingKind, CommandBuffer, FramebufferDesc, PipelineDesc, PipelineKind,
    RhiDevice, RhiFramebuffer, RhiPipeline, RhiTexture, TextureDesc, TextureFormat,
    TextureUsage, TextureViewDimension,
};
use crate::texture::TextureResourceManager;

// Built-in shader sources; blueprint assets override them when the
// resource pass names one.

const DEPTH_ONLY_WGSL: &str = r"
@vertex
fn vs_main(@builtin(vertex_index) vertex_index : u32) -> @builtin(position) vec4<f32> {
    // Geometry streams are bound by the material system; the built-in
    // fallback emits a degenerate triangle.
    let _unused = vertex_index;
    return vec4<f32>(0.0, 0.0, 0.0, 1.0);
}
";

const EVSM_MULTISAMPLED_WGSL: &str = r"
const NUMBER_OF_MULTISAMPLES : i32 = %NUMBER_OF_MULTISAMPLES%;
const EXPONENT : f32 = 5.54;

struct VertexOutput {
    @builtin(position) position : vec4<f32>,
    @location(0) uv : vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index : u32) -> VertexOutput {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0)
    );
    var output : VertexOutput;
    output.position = vec4<f32>(pos[vertex_index], 0.0, 1.0);
    output.uv = pos[vertex_index] * 0.5 + 0.5;
    return output;
}

@group(0) @binding(1) var t_depth : texture_depth_multisampled_2d;

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    let coords = vec2<i32>(in.position.xy);
    var depth = 0.0;
    for (var s = 0; s < NUMBER_OF_MULTISAMPLES; s = s + 1) {
        depth = depth + textureLoad(t_depth, coords, s);
    }
    depth = depth / f32(NUMBER_OF_MULTISAMPLES);
    let warped = exp(EXPONENT * depth);
    return vec4<f32>(warped, warped * warped, 0.0, 0.0);
}
";

const EVSM_SINGLE_SAMPLE_WGSL: &str = r"
const EXPONENT : f32 = 5.54;

struct VertexOutput {
    @builtin(position) position : vec4<f32>,
    @location(0) uv : vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index : u32) -> VertexOutput {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0)
    );
    var output : VertexOutput;
    output.position = vec4<f32>(pos[vertex_index], 0.0, 1.0);
    output.uv = pos[vertex_index] * 0.5 + 0.5;
    return output;
}

@group(0) @binding(1) var t_depth : texture_depth_2d;

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    let coords = vec2<i32>(in.position.xy);
    let depth = textureLoad(t_depth, coords, 0);
    let warped = exp(EXPONENT * depth);
    return vec4<f32>(warped, warped * warped, 0.0, 0.0);
}
";

const BLUR_WGSL: &str = r"
const VERTICAL_BLUR : bool = %VERTICAL_BLUR%;
const RADIUS : i32 = 4;

struct VertexOutput {
    @builtin(position) position : vec4<f32>,
    @location(0) uv : vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index : u32) -> VertexOutput {
    var pos = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 3.0, -1.0),
        vec2<f32>(-1.0,  3.0)
    );
    var output : VertexOutput;
    output.position = vec4<f32>(pos[vertex_index], 0.0, 1.0);
    output.uv = pos[vertex_index] * 0.5 + 0.5;
    return output;
}

@group(0) @binding(0) var s_color : sampler;
@group(0) @binding(1) var t_color : texture_2d<f32>;

@fragment
fn fs_main(in : VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<f32>(textureDimensions(t_color));
    var step = vec2<f32>(1.0 / size.x, 0.0);
    if (VERTICAL_BLUR) {
        step = vec2<f32>(0.0, 1.0 / size.y);
    }
    var sum = vec4<f32>(0.0);
    for (var i = -RADIUS; i <= RADIUS; i = i + 1) {
        sum = sum + textureSample(t_color, s_color, in.uv + step * f32(i));
    }
    return sum / f32(RADIUS * 2 + 1);
}
";

/// Per-frame shadow output consumed by the shading passes.
#[derive(Debug, Clone)]
pub struct ShadowPassData {
    /// World to cascade-0 shadow-UV.
    pub world_to_shadow_uv: Mat4,
    /// Per-cascade light view-projections (diagnostics and caster
    /// culling; cascade 0's UV matrix is `world_to_shadow_uv`).
    pub cascade_view_projections: [Mat4; MAX_CASCADES],
    /// Cascades >0 re-expressed in cascade 0's UV space.
    pub cascade_scales: [Vec3; MAX_CASCADES],
    pub cascade_offsets: [Vec3; MAX_CASCADES],
    /// View-space far depth of each cascade.
    pub cascade_splits: [f32; MAX_CASCADES],
    pub shadow_map_texel_size: f32,
    /// Active cascade while the render loop runs; 0 afterwards.
    pub current_cascade: u32,
    pub cascade_count: u32,
}

impl Default for ShadowPassData {
    fn default() -> Self {
        Self {
            world_to_shadow_uv: Mat4::IDENTITY,
            cascade_view_projections: [Mat4::IDENTITY; MAX_CASCADES],
            cascade_scales: [Vec3::ONE; MAX_CASCADES],
            cascade_offsets: [Vec3::ZERO; MAX_CASCADES],
            cascade_splits: [0.0; MAX_CASCADES],
            shadow_map_texel_size: 0.0,
            current_cascade: 0,
            cascade_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct ShadowSettings {
    cascade_count: u32,
    multisample_count: u32,
    resolution: u32,
    split_lambda: f32,
    filter_size: f32,
    minimum_depth: f32,
    maximum_depth: f32,
    stabilize_cascades: bool,
    enabled: bool,
}

/// GPU state owned by an enabled pass. Fields are ordered for teardown:
/// pipelines (which hold material-system references) drop before the
/// framebuffers, which reference but do not own the textures.
struct ShadowTargets {
    depth_pipeline: RhiPipeline,
    evsm_pipeline: RhiPipeline,
    blur_horizontal_pipeline: RhiPipeline,
    blur_vertical_pipeline: RhiPipeline,
    depth_framebuffer: RhiFramebuffer,
    variance_framebuffers: SmallVec<[RhiFramebuffer; MAX_CASCADES]>,
    intermediate_framebuffer: RhiFramebuffer,
    depth_texture: RhiTexture,
    variance_texture: RhiTexture,
    intermediate_texture: RhiTexture,
}

/// Cascaded shadow map pass instance.
pub struct ShadowMapPass {
    settings: ShadowSettings,
    generation: SettingsGeneration,
    targets: Option<ShadowTargets>,
    dummy_variance: Option<RhiTexture>,
    depth_blueprint: Option<crate::asset::AssetId>,
    evsm_blueprint: Option<crate::asset::AssetId>,
    blur_blueprint: Option<crate::asset::AssetId>,
    queue: RenderQueue,
}

impl ShadowMapPass {
    pub fn new(desc: &ShadowMapPassDesc, ctx: &mut InstanceContext<'_>) -> Result<Self> {
        let mut pass = Self {
            settings: ShadowSettings {
                cascade_count: desc.cascade_count.clamp(1, MAXIMUM_NUMBER_OF_SHADOW_CASCADES),
                multisample_count: desc.multisample_count.max(1),
                resolution: desc.resolution.max(1),
                split_lambda: desc.split_lambda,
                filter_size: desc.filter_size,
                minimum_depth: desc.minimum_depth,
                maximum_depth: desc.maximum_depth,
                stabilize_cascades: desc.stabilize_cascades,
                enabled: desc.enabled,
            },
            generation: SettingsGeneration::new(),
            targets: None,
            dummy_variance: None,
            depth_blueprint: desc.depth_blueprint,
            evsm_blueprint: desc.evsm_blueprint,
            blur_blueprint: desc.blur_blueprint,
            queue: RenderQueue::new(),
        };
        pass.create_render_targets(ctx.device, ctx.textures, ctx.blueprints)?;
        pass.generation.mark_applied();
        Ok(pass)
    }

    // ========================================================================
    // Settings mutation (deferred; no GPU work at call time)
    // ========================================================================

    /// Sets the cascade count (clamped to the fixed maximum). Only an
    /// actual change bumps the generation counter.
    pub fn set_number_of_shadow_cascades(&mut self, count: u32) {
        let count = count.clamp(1, MAXIMUM_NUMBER_OF_SHADOW_CASCADES);
        if count != self.settings.cascade_count {
            self.settings.cascade_count = count;
            self.generation.bump();
        }
    }

    /// Sets the depth-target multisample count. The value is clamped to
    /// the backend maximum at render-target creation time.
    pub fn set_number_of_shadow_multisamples(&mut self, count: u32) {
        let count = count.max(1);
        if count != self.settings.multisample_count {
            self.settings.multisample_count = count;
            self.generation.bump();
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.settings.enabled {
            self.settings.enabled = enabled;
            self.generation.bump();
        }
    }

    pub fn set_shadow_map_resolution(&mut self, resolution: u32) {
        let resolution = resolution.max(1);
        if resolution != self.settings.resolution {
            self.settings.resolution = resolution;
            self.generation.bump();
        }
    }

    pub fn set_cascade_splits_lambda(&mut self, lambda: f32) {
        self.settings.split_lambda = lambda;
    }

    pub fn set_stabilize_cascades(&mut self, stabilize: bool) {
        self.settings.stabilize_cascades = stabilize;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    #[must_use]
    pub fn number_of_shadow_cascades(&self) -> u32 {
        self.settings.cascade_count
    }

    /// Current settings generation; tests use this to observe that
    /// redundant mutations do not bump it.
    #[must_use]
    pub fn settings_generation(&self) -> u64 {
        self.generation.current()
    }

    // ========================================================================
    // Per-frame execution
    // ========================================================================

    pub fn fill_command_buffer(
        &mut self,
        ctx: &mut PassContext<'_, '_>,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        // Settings changed since the targets were built: tear down and
        // rebuild synchronously, then continue with the new state.
        if self.generation.state() == SettingsState::Stale {
            self.destroy_render_targets(ctx.textures);
            self.create_render_targets(ctx.device, ctx.textures, ctx.blueprints)?;
            self.generation.mark_applied();
        }

        if !self.settings.enabled {
            // The dummy variance texture stays registered; nothing to record.
            return Ok(());
        }
        let Some(light) = ctx.scene.light else {
            debug_assert!(false, "shadow pass without a directional light in the scene");
            log::error!("shadow pass skipped: no directional light");
            return Ok(());
        };
        let Some(targets) = self.targets.take() else {
            return Ok(());
        };

        let caps = ctx.device.capabilities();
        let camera = ctx.scene.camera;
        let resolution = self.settings.resolution;
        let effective_width = if ctx.stereo_instancing {
            (resolution / 2).max(1)
        } else {
            resolution
        };

        let corners =
            frustum_corners_world(camera.view_projection(), caps.depth_clip_zero_to_one);

        let near = camera.near;
        let far = camera.far;
        let range = (far - near).max(1e-4);
        let shadow_near = near + range * self.settings.minimum_depth.clamp(0.0, 1.0);
        let shadow_far = near + range * self.settings.maximum_depth.clamp(0.0, 1.0);
        let splits = compute_cascade_splits(
            self.settings.cascade_count,
            shadow_near.max(1e-4),
            shadow_far,
            self.settings.split_lambda,
        );

        let up = light_up_vector(
            light.direction,
            (!self.settings.stabilize_cascades).then(|| camera.right()),
        );
        let uv_from_clip =
            clip_to_uv_matrix(caps.depth_clip_zero_to_one, caps.upper_left_texture_origin);
        let caster_extension = (shadow_far - shadow_near).max(1.0);

        let aggregates = ctx.scene.renderables.cached_aggregates();

        let mut data = ShadowPassData {
            shadow_map_texel_size: 1.0 / effective_width as f32,
            cascade_count: self.settings.cascade_count,
            ..ShadowPassData::default()
        };

        commands.debug_marker("Shadow Map Pass");
        let mut cascade0_matrix = Mat4::IDENTITY;
        let mut previous_fraction = (shadow_near - near) / range;

        // Cascades run strictly in index order: the UV remap of cascade
        // i>0 reads cascade 0's matrix computed earlier this loop.
        for cascade in 0..self.settings.cascade_count as usize {
            data.current_cascade = cascade as u32;
            let split = splits[cascade];
            let fraction = ((split - near) / range).clamp(0.0, 1.0);
            let sliced = slice_frustum_corners(&corners, previous_fraction, fraction);
            previous_fraction = fraction;

            let (light_view, mut extents) =
                light_space_extents(&sliced, light.direction, up);
            pad_extents_for_filtering(&mut extents, self.settings.filter_size, effective_width);
            let mut view_projection = build_cascade_view_projection(
                light_view,
                &extents,
                caster_extension,
                caps.depth_clip_zero_to_one,
            );
            if self.settings.stabilize_cascades {
                view_projection = stabilize_cascade(view_projection, resolution);
            }
            data.cascade_view_projections[cascade] = view_projection;

            // Depth render: clear, draw every shadow caster in the
            // cached queue range with the cascade's matrices bound.
            commands.begin_render_pass(&targets.depth_framebuffer, None, Some(1.0));
            commands.bind_pipeline(&targets.depth_pipeline);
            self.queue.clear();
            self.queue.add_renderables_from_range(
                ctx.scene,
                aggregates.minimum_render_queue_index,
                aggregates.maximum_render_queue_index,
                true,
            );
            self.queue.sort();
            self.queue.record_draws(commands);
            self.queue.clear();
            commands.end_render_pass();

            // Depth to exponential-variance moments.
            commands.begin_render_pass(
                &targets.variance_framebuffers[cascade],
                Some([0.0, 0.0, 0.0, 0.0]),
                None,
            );
            commands.bind_pipeline(&targets.evsm_pipeline);
            commands.bind_texture(1, &targets.depth_texture);
            commands.draw(3, 1);
            commands.end_render_pass();

            // UV-space shadow matrix; cascades >0 store their UV space
            // relative to cascade 0's.
            let shadow_matrix = uv_from_clip * view_projection;
            let (scale, offset) = if cascade == 0 {
                cascade0_matrix = shadow_matrix;
                data.world_to_shadow_uv = shadow_matrix;
                (Vec3::ONE, Vec3::ZERO)
            } else {
                cascade_uv_remap(cascade0_matrix, shadow_matrix)
            };
            data.cascade_scales[cascade] = scale;
            data.cascade_offsets[cascade] = offset;
            data.cascade_splits[cascade] = split;

            // Blur only when the effective footprint exceeds one texel
            // in either axis; the variance data is filterable as-is
            // otherwise. Deeper cascades cover more world per texel, so
            // their footprint shrinks by the UV scale.
            let footprint = Vec2::new(
                self.settings.filter_size / scale.x.abs().max(1e-4),
                self.settings.filter_size / scale.y.abs().max(1e-4),
            );
            if footprint.x > 1.0 || footprint.y > 1.0 {
                commands.begin_render_pass(&targets.intermediate_framebuffer, None, None);
                commands.bind_pipeline(&targets.blur_horizontal_pipeline);
                commands.bind_texture_layer(1, &targets.variance_texture, cascade as u32);
                commands.draw(3, 1);
                commands.end_render_pass();

                commands.begin_render_pass(&targets.variance_framebuffers[cascade], None, None);
                commands.bind_pipeline(&targets.blur_vertical_pipeline);
                commands.bind_texture(1, &targets.intermediate_texture);
                commands.draw(3, 1);
                commands.end_render_pass();
            }
        }

        data.current_cascade = 0;
        ctx.pass_data.shadow = Some(data);
        self.targets = Some(targets);
        Ok(())
    }

    // ========================================================================
    // Render-target lifecycle
    // ========================================================================

    fn create_render_targets(
        &mut self,
        device: &Arc<dyn RhiDevice>,
        textures: &mut TextureResourceManager,
        blueprints: &MaterialBlueprintLibrary,
    ) -> Result<()> {
        if !self.settings.enabled {
            // Disabled: only the 1×1 dummy variance texture, so
            // downstream bindings stay valid.
            let dummy = device.create_texture(
                &TextureDesc {
                    usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
                    ..TextureDesc::new_2d("ShadowVarianceDummy", 1, 1, TextureFormat::Rg16Float)
                },
                Some(&dummy_variance_texel()),
            )?;
            textures.replace_dynamic_texture(dynamic::SHADOW_VARIANCE_MAP, dummy.clone())?;
            self.dummy_variance = Some(dummy);
            return Ok(());
        }

        let caps = device.capabilities();
        let resolution = self.settings.resolution;
        let multisamples = self
            .settings
            .multisample_count
            .clamp(1, caps.max_multisample_count);

        let depth_texture = device.create_texture(
            &TextureDesc {
                sample_count: multisamples,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
                ..TextureDesc::new_2d(
                    "ShadowDepthMap",
                    resolution,
                    resolution,
                    TextureFormat::Depth32Float,
                )
            },
            None,
        )?;
        let depth_framebuffer = device.create_framebuffer(&FramebufferDesc {
            label: "ShadowDepthFramebuffer".into(),
            color: None,
            depth: Some(Attachment::base(depth_texture.clone())),
        })?;

        let variance_texture = device.create_texture(
            &TextureDesc {
                depth_or_array_layers: MAXIMUM_NUMBER_OF_SHADOW_CASCADES,
                view_dimension: TextureViewDimension::D2Array,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
                ..TextureDesc::new_2d(
                    "ShadowVarianceMap",
                    resolution,
                    resolution,
                    TextureFormat::Rg16Float,
                )
            },
            None,
        )?;
        // One framebuffer view per array slice, shading passes bind the
        // whole array.
        let mut variance_framebuffers = SmallVec::new();
        for slice in 0..MAXIMUM_NUMBER_OF_SHADOW_CASCADES {
            variance_framebuffers.push(device.create_framebuffer(&FramebufferDesc {
                label: format!("ShadowVarianceSlice{slice}"),
                color: Some(Attachment {
                    texture: variance_texture.clone(),
                    mip_level: 0,
                    array_layer: slice,
                }),
                depth: None,
            })?);
        }

        let intermediate_texture = device.create_texture(
            &TextureDesc {
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::SAMPLED,
                ..TextureDesc::new_2d(
                    "ShadowIntermediateMap",
                    resolution,
                    resolution,
                    TextureFormat::Rg16Float,
                )
            },
            None,
        )?;
        let intermediate_framebuffer = device.create_framebuffer(&FramebufferDesc {
            label: "ShadowIntermediateFramebuffer".into(),
            color: Some(Attachment::base(intermediate_texture.clone())),
            depth: None,
        })?;

        let depth_pipeline = self.build_depth_pipeline(device, blueprints, multisamples)?;
        let evsm_pipeline = self.build_evsm_pipeline(device, blueprints, multisamples)?;
        let blur_horizontal_pipeline =
            self.build_blur_pipeline(device, blueprints, false)?;
        let blur_vertical_pipeline = self.build_blur_pipeline(device, blueprints, true)?;

        // Register the chain under fixed dynamic ids so other passes and
        // materials can reference the textures by name.
        textures.replace_dynamic_texture(dynamic::SHADOW_DEPTH_MAP, depth_texture.clone())?;
        textures.replace_dynamic_texture(dynamic::SHADOW_VARIANCE_MAP, variance_texture.clone())?;
        textures
            .replace_dynamic_texture(dynamic::SHADOW_INTERMEDIATE_MAP, intermediate_texture.clone())?;

        self.targets = Some(ShadowTargets {
            depth_pipeline,
            evsm_pipeline,
            blur_horizontal_pipeline,
            blur_vertical_pipeline,
            depth_framebuffer,
            variance_framebuffers,
            intermediate_framebuffer,
            depth_texture,
            variance_texture,
            intermediate_texture,
        });
        Ok(())
    }

    /// Teardown in reverse creation order: sub-pass pipelines first
    /// (they hold references into the material system), then the
    /// framebuffers, then the textures are deregistered and dropped.
    fn destroy_render_targets(&mut self, textures: &mut TextureResourceManager) {
        if let Some(targets) = self.targets.take() {
            let ShadowTargets {
                depth_pipeline,
                evsm_pipeline,
                blur_horizontal_pipeline,
                blur_vertical_pipeline,
                depth_framebuffer,
                variance_framebuffers,
                intermediate_framebuffer,
                depth_texture,
                variance_texture,
                intermediate_texture,
            } = targets;
            drop(blur_vertical_pipeline);
            drop(blur_horizontal_pipeline);
            drop(evsm_pipeline);
            drop(depth_pipeline);
            drop(intermediate_framebuffer);
            drop(variance_framebuffers);
            drop(depth_framebuffer);
            textures.remove_dynamic_texture(dynamic::SHADOW_INTERMEDIATE_MAP);
            textures.remove_dynamic_texture(dynamic::SHADOW_VARIANCE_MAP);
            textures.remove_dynamic_texture(dynamic::SHADOW_DEPTH_MAP);
            drop(intermediate_texture);
            drop(variance_texture);
            drop(depth_texture);
        }
        if self.dummy_variance.take().is_some() {
            textures.remove_dynamic_texture(dynamic::SHADOW_VARIANCE_MAP);
        }
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    fn build_depth_pipeline(
        &self,
        device: &Arc<dyn RhiDevice>,
        blueprints: &MaterialBlueprintLibrary,
        multisamples: u32,
    ) -> Result<RhiPipeline> {
        let (source, bindings) = match self.depth_blueprint.and_then(|id| blueprints.get(id)) {
            Some(blueprint) => (blueprint.source.clone(), blueprint.bindings.clone()),
            None => (DEPTH_ONLY_WGSL.to_string(), Vec::new()),
        };
        device.create_pipeline(&PipelineDesc {
            label: "ShadowDepthPipeline".into(),
            source,
            kind: PipelineKind::Graphics,
            bindings,
            color_format: None,
            depth_format: Some(TextureFormat::Depth32Float),
            sample_count: multisamples,
        })
    }

    fn build_evsm_pipeline(
        &self,
        device: &Arc<dyn RhiDevice>,
        blueprints: &MaterialBlueprintLibrary,
        multisamples: u32,
    ) -> Result<RhiPipeline> {
        let mut properties = MaterialProperties::new();
        properties.set(
            property::NUMBER_OF_MULTISAMPLES,
            PropertyValue::Integer(multisamples as i32),
        );
        properties.set(
            property::DEPTH_MAP,
            PropertyValue::Texture(dynamic::SHADOW_DEPTH_MAP),
        );

        let depth_binding = if multisamples > 1 {
            BindingKind::DepthTextureMultisampled2d
        } else {
            BindingKind::DepthTexture2d
        };
        let (template, bindings) = match self.evsm_blueprint.and_then(|id| blueprints.get(id)) {
            Some(blueprint) => (blueprint.source.clone(), blueprint.bindings.clone()),
            None => {
                let template = if multisamples > 1 {
                    EVSM_MULTISAMPLED_WGSL
                } else {
                    EVSM_SINGLE_SAMPLE_WGSL
                };
                (
                    template.to_string(),
                    vec![BindingKind::Sampler, depth_binding],
                )
            }
        };
        device.create_pipeline(&PipelineDesc {
            label: "ShadowEvsmPipeline".into(),
            source: apply_blueprint_properties(&template, &properties),
            kind: PipelineKind::Graphics,
            bindings,
            color_format: Some(TextureFormat::Rg16Float),
            depth_format: None,
            sample_count: 1,
        })
    }

    fn build_blur_pipeline(
        &self,
        device: &Arc<dyn RhiDevice>,
        blueprints: &MaterialBlueprintLibrary,
        vertical: bool,
    ) -> Result<RhiPipeline> {
        let mut properties = MaterialProperties::new();
        properties.set(property::VERTICAL_BLUR, PropertyValue::Boolean(vertical));
        properties.set(
            property::COLOR_MAP,
            PropertyValue::Texture(dynamic::SHADOW_VARIANCE_MAP),
        );

        let (template, bindings) = match self.blur_blueprint.and_then(|id| blueprints.get(id)) {
            Some(blueprint) => (blueprint.source.clone(), blueprint.bindings.clone()),
            None => (
                BLUR_WGSL.to_string(),
                vec![BindingKind::Sampler, BindingKind::Texture2d],
            ),
        };
        device.create_pipeline(&PipelineDesc {
            label: if vertical {
                "ShadowBlurVerticalPipeline".into()
            } else {
                "ShadowBlurHorizontalPipeline".into()
            },
            source: apply_blueprint_properties(&template, &properties),
            kind: PipelineKind::Graphics,
            bindings,
            color_format: Some(TextureFormat::Rg16Float),
            depth_format: None,
            sample_count: 1,
        })
    }
}

/// `exp(EXPONENT * 1.0)` moments of a fully lit 1×1 map, encoded as two
/// f16 values.
fn dummy_variance_texel() -> [u8; 4] {
    let exponent = 5.54f32;
    let warped = exponent.exp();
    let m1 = half::f16::from_f32(warped);
    let m2 = half::f16::from_f32(warped * warped);
    let mut texel = [0u8; 4];
    texel[0..2].copy_from_slice(&m1.to_le_bytes());
    texel[2..4].copy_from_slice(&m2.to_le_bytes());
    texel
}
