//! Copy Pass
//!
//! Resolves two texture asset ids through the texture manager and issues
//! a single GPU copy. Both resources must already hold a concrete GPU
//! texture; there is no fallback-waiting here, because a copy from a
//! placeholder would publish wrong pixels into the destination.

use crate::compositor::desc::CopyPassDesc;
use crate::compositor::workspace::PassContext;
use crate::errors::Result;
use crate::rhi::CommandBuffer;

pub struct CopyPass {
    desc: CopyPassDesc,
}

impl CopyPass {
    #[must_use]
    pub fn new(desc: CopyPassDesc) -> Self {
        Self { desc }
    }

    pub fn fill_command_buffer(
        &mut self,
        ctx: &mut PassContext<'_, '_>,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        let source = ctx.textures.texture_by_asset_id(self.desc.source);
        let destination = ctx.textures.texture_by_asset_id(self.desc.destination);
        let (Some(source), Some(destination)) = (source, destination) else {
            // Both ids come from the compiled graph, so failing to
            // resolve them is a content error.
            debug_assert!(
                false,
                "copy pass source/destination did not resolve to GPU textures"
            );
            log::error!(
                "copy pass skipped: {:?} -> {:?} not resolvable",
                self.desc.source,
                self.desc.destination
            );
            return Ok(());
        };
        commands.copy_texture(source, destination);
        Ok(())
    }
}
