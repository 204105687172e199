//! Scene Pass
//!
//! Draws the renderables whose cached render-queue index falls inside
//! the pass's configured range, sorted queue-major, into the enclosing
//! target's framebuffer. Per-material pipelines come from the material
//! system outside this core; the pass binds its fallback blueprint when
//! one is configured and otherwise records no draws.

use crate::compositor::desc::ScenePassDesc;
use crate::compositor::render_queue::RenderQueue;
use crate::compositor::workspace::PassContext;
use crate::errors::Result;
use crate::rhi::{CommandBuffer, PipelineDesc, PipelineKind, RhiPipeline};

pub struct ScenePass {
    desc: ScenePassDesc,
    pipeline: Option<RhiPipeline>,
    queue: RenderQueue,
}

impl ScenePass {
    #[must_use]
    pub fn new(desc: ScenePassDesc) -> Self {
        Self {
            desc,
            pipeline: None,
            queue: RenderQueue::new(),
        }
    }

    pub fn fill_command_buffer(
        &mut self,
        ctx: &mut PassContext<'_, '_>,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        let Some(framebuffer) = ctx.target_framebuffer.clone() else {
            log::debug!("scene pass has no target framebuffer this frame");
            return Ok(());
        };

        let pipeline = if let Some(pipeline) = &self.pipeline {
            Some(pipeline.clone())
        } else if let Some(blueprint) = self.desc.blueprint.and_then(|id| ctx.blueprints.get(id))
        {
            let pipeline = ctx.device.create_pipeline(&PipelineDesc {
                label: blueprint.label.clone(),
                source: blueprint.source.clone(),
                kind: PipelineKind::Graphics,
                bindings: blueprint.bindings.clone(),
                color_format: framebuffer
                    .desc()
                    .color
                    .as_ref()
                    .map(|att| att.texture.desc().format),
                depth_format: None,
                sample_count: 1,
            })?;
            self.pipeline = Some(pipeline.clone());
            Some(pipeline)
        } else {
            None
        };

        commands.begin_render_pass(&framebuffer, self.desc.clear_color, None);
        if let Some(pipeline) = &pipeline {
            commands.bind_pipeline(pipeline);
            self.queue.clear();
            self.queue.add_renderables_from_range(
                ctx.scene,
                self.desc.minimum_render_queue_index,
                self.desc.maximum_render_queue_index,
                false,
            );
            self.queue.sort();
            self.queue.record_draws(commands);
            self.queue.clear();
        }
        commands.end_render_pass();
        Ok(())
    }
}
