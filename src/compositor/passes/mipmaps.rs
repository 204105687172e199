//! Generate-Mipmaps Pass
//!
//! Two modes, chosen by the resource pass:
//!
//! - **Hardware**: no blueprint configured; a single generate-mipmaps
//!   command and the backend walks the chain.
//! - **Custom**: a blueprint drives per-level generation (hierarchical
//!   depth and friends). The pass lazily builds one framebuffer per mip
//!   level 1..N, rebuilding only when the source texture's base
//!   dimensions change, and each level's draw samples only the
//!   immediately coarser level.

use crate::compositor::desc::GenerateMipmapsPassDesc;
use crate::compositor::passes::apply_blueprint_properties;
use crate::compositor::workspace::PassContext;
use crate::errors::Result;
use crate::rhi::{
    Attachment, CommandBuffer, FramebufferDesc, PipelineDesc, PipelineKind, RhiFramebuffer,
    RhiPipeline,
};

pub struct GenerateMipmapsPass {
    desc: GenerateMipmapsPassDesc,
    /// Source dimensions the per-mip chain was built against.
    built_for: Option<(u32, u32)>,
    mip_framebuffers: Vec<RhiFramebuffer>,
    pipeline: Option<RhiPipeline>,
}

impl GenerateMipmapsPass {
    #[must_use]
    pub fn new(desc: GenerateMipmapsPassDesc) -> Self {
        Self {
            desc,
            built_for: None,
            mip_framebuffers: Vec::new(),
            pipeline: None,
        }
    }

    pub fn fill_command_buffer(
        &mut self,
        ctx: &mut PassContext<'_, '_>,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        let Some(texture) = ctx.textures.texture_by_asset_id(self.desc.texture).cloned() else {
            debug_assert!(false, "generate-mipmaps pass texture did not resolve");
            log::error!(
                "generate-mipmaps pass skipped: {:?} not resolvable",
                self.desc.texture
            );
            return Ok(());
        };
        if texture.desc().mip_level_count < 2 {
            return Ok(());
        }

        let Some(blueprint_id) = self.desc.blueprint else {
            commands.generate_mipmaps(&texture);
            return Ok(());
        };

        // Custom mode: rebuild the per-level chain only when the source
        // base dimensions changed.
        let base = (texture.desc().width, texture.desc().height);
        if self.built_for != Some(base) {
            self.mip_framebuffers.clear();
            for mip in 1..texture.desc().mip_level_count {
                self.mip_framebuffers.push(ctx.device.create_framebuffer(
                    &FramebufferDesc {
                        label: format!("{:?} mip {mip}", self.desc.texture),
                        color: Some(Attachment {
                            texture: texture.clone(),
                            mip_level: mip,
                            array_layer: 0,
                        }),
                        depth: None,
                    },
                )?);
            }
            self.built_for = Some(base);
        }

        let pipeline = if let Some(pipeline) = &self.pipeline {
            pipeline.clone()
        } else {
            let Some(blueprint) = ctx.blueprints.get(blueprint_id) else {
                debug_assert!(false, "generate-mipmaps blueprint is not registered");
                log::error!(
                    "generate-mipmaps pass skipped: blueprint {blueprint_id:?} not registered"
                );
                return Ok(());
            };
            let pipeline = ctx.device.create_pipeline(&PipelineDesc {
                label: blueprint.label.clone(),
                source: apply_blueprint_properties(
                    &blueprint.source,
                    &crate::material::MaterialProperties::new(),
                ),
                kind: PipelineKind::Graphics,
                bindings: blueprint.bindings.clone(),
                color_format: Some(texture.desc().format),
                depth_format: None,
                sample_count: 1,
            })?;
            self.pipeline = Some(pipeline.clone());
            pipeline
        };

        // Level N samples only level N-1, walking coarser each pass.
        for (index, framebuffer) in self.mip_framebuffers.iter().enumerate() {
            let source_mip = index as u32;
            commands.begin_render_pass(framebuffer, None, None);
            commands.bind_pipeline(&pipeline);
            commands.bind_texture_mip(1, &texture, source_mip);
            commands.draw(3, 1);
            commands.end_render_pass();
        }
        Ok(())
    }
}
