//! Compute Pass
//!
//! Binds a material blueprint (not required to have a material-asset
//! wrapper) and either draws a procedural fullscreen triangle (graphics
//! blueprint) or dispatches workgroups (compute blueprint). The pass
//! owns a small render queue and clears it right after recording so no
//! stale ids into per-frame scene data survive the frame.

use std::sync::Arc;

use crate::compositor::desc::ComputePassDesc;
use crate::compositor::passes::apply_blueprint_properties;
use crate::compositor::render_queue::RenderQueue;
use crate::compositor::workspace::PassContext;
use crate::errors::Result;
use crate::material::{MaterialBlueprint, PropertyValue};
use crate::rhi::{CommandBuffer, PipelineDesc, PipelineKind, RhiPipeline, TextureFormat};

const DISPATCH_GROUP_SIZE: u32 = 8;

pub struct ComputePass {
    desc: ComputePassDesc,
    pipeline: Option<RhiPipeline>,
    queue: RenderQueue,
}

impl ComputePass {
    #[must_use]
    pub fn new(desc: ComputePassDesc) -> Self {
        Self {
            desc,
            pipeline: None,
            queue: RenderQueue::new(),
        }
    }

    fn ensure_pipeline(
        &mut self,
        ctx: &PassContext<'_, '_>,
        blueprint: &Arc<MaterialBlueprint>,
    ) -> Result<RhiPipeline> {
        if let Some(pipeline) = &self.pipeline {
            return Ok(pipeline.clone());
        }
        let color_format = match blueprint.kind {
            PipelineKind::Graphics => Some(
                ctx.target_framebuffer
                    .as_ref()
                    .and_then(|fb| fb.desc().color.as_ref())
                    .map_or(TextureFormat::Rgba16Float, |att| att.texture.desc().format),
            ),
            PipelineKind::Compute => None,
        };
        let pipeline = ctx.device.create_pipeline(&PipelineDesc {
            label: blueprint.label.clone(),
            source: apply_blueprint_properties(&blueprint.source, &self.desc.properties),
            kind: blueprint.kind,
            bindings: blueprint.bindings.clone(),
            color_format,
            depth_format: None,
            sample_count: 1,
        })?;
        self.pipeline = Some(pipeline.clone());
        Ok(pipeline)
    }

    /// Binds texture-valued properties to the pipeline's texture
    /// bindings in declaration order.
    fn bind_property_textures(
        &self,
        ctx: &PassContext<'_, '_>,
        blueprint: &MaterialBlueprint,
        commands: &mut CommandBuffer,
    ) {
        let texture_slots: Vec<u32> = blueprint
            .bindings
            .iter()
            .enumerate()
            .filter(|(_, kind)| !matches!(kind, crate::rhi::BindingKind::Sampler))
            .map(|(i, _)| i as u32)
            .collect();

        let mut next_slot = texture_slots.into_iter();
        for (_, value) in self.desc.properties.iter() {
            let PropertyValue::Texture(asset_id) = value else {
                continue;
            };
            let Some(slot) = next_slot.next() else {
                debug_assert!(false, "more texture properties than pipeline bindings");
                break;
            };
            match ctx.textures.texture_by_asset_id(asset_id) {
                Some(texture) => commands.bind_texture(slot, texture),
                None => {
                    debug_assert!(false, "compute pass texture property did not resolve");
                    log::error!("compute pass texture {asset_id:?} not resolvable");
                }
            }
        }
    }

    pub fn fill_command_buffer(
        &mut self,
        ctx: &mut PassContext<'_, '_>,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        let Some(blueprint) = ctx.blueprints.get(self.desc.blueprint) else {
            debug_assert!(false, "compute pass blueprint is not registered");
            log::error!(
                "compute pass skipped: blueprint {:?} not registered",
                self.desc.blueprint
            );
            return Ok(());
        };
        let pipeline = self.ensure_pipeline(ctx, &blueprint)?;

        match blueprint.kind {
            PipelineKind::Graphics => {
                let Some(framebuffer) = ctx.target_framebuffer.clone() else {
                    log::debug!("compute pass has no target framebuffer this frame");
                    return Ok(());
                };
                commands.begin_render_pass(&framebuffer, None, None);
                commands.bind_pipeline(&pipeline);
                self.bind_property_textures(ctx, &blueprint, commands);
                // Fullscreen triangle, zero vertex buffers.
                commands.draw(3, 1);
                commands.end_render_pass();
            }
            PipelineKind::Compute => {
                commands.bind_pipeline(&pipeline);
                self.bind_property_textures(ctx, &blueprint, commands);
                let (width, height) = ctx
                    .target_framebuffer
                    .as_ref()
                    .map_or((1, 1), crate::rhi::RhiFramebuffer::extent);
                commands.dispatch(
                    width.div_ceil(DISPATCH_GROUP_SIZE).max(1),
                    height.div_ceil(DISPATCH_GROUP_SIZE).max(1),
                    1,
                );
            }
        }

        // The queue holds per-frame ids only; clearing here keeps them
        // from leaking across frames.
        self.queue.clear();
        Ok(())
    }
}
