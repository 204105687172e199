//! Debug GUI Pass
//!
//! Placeholder slot in the pass sequence for the host application's
//! debug overlay. The overlay renderer itself lives with the application
//! shell; the pass only marks where in the frame it draws.

use crate::compositor::workspace::PassContext;
use crate::errors::Result;
use crate::rhi::CommandBuffer;

pub struct DebugGuiPass;

impl DebugGuiPass {
    pub fn fill_command_buffer(
        &mut self,
        _ctx: &mut PassContext<'_, '_>,
        commands: &mut CommandBuffer,
    ) -> Result<()> {
        commands.debug_marker("Debug GUI");
        Ok(())
    }
}
