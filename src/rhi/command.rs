//! Recorded Command Buffer
//!
//! Compositor passes record into a [`CommandBuffer`]; the device backend
//! translates the recording at submit time. Recording is plain data, so a
//! frame can be inspected (draw/dispatch tallies) without any GPU, and the
//! same recording replays on any backend.
//!
//! Resources referenced by commands are reference-counted handles; a
//! recorded buffer keeps everything it touches alive until it is dropped
//! or cleared.

use super::{RhiFramebuffer, RhiPipeline, RhiTexture};

/// One backend-agnostic GPU command.
#[derive(Debug, Clone)]
pub enum Command {
    BeginRenderPass {
        framebuffer: RhiFramebuffer,
        clear_color: Option<[f32; 4]>,
        clear_depth: Option<f32>,
    },
    EndRenderPass,
    BindPipeline(RhiPipeline),
    BindTexture {
        slot: u32,
        texture: RhiTexture,
        /// Restrict sampling to a single mip level. Used by the custom
        /// mipmap-generation pass so each blit only reads the
        /// immediately coarser level.
        mip_level: Option<u32>,
        /// Restrict sampling to a single array layer. Used by the shadow
        /// blur sub-passes to read one cascade slice as a plain 2D view.
        array_layer: Option<u32>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch {
        groups: [u32; 3],
    },
    CopyTexture {
        source: RhiTexture,
        destination: RhiTexture,
    },
    GenerateMipmaps {
        texture: RhiTexture,
    },
    /// Debug marker, translated to a backend debug group where supported.
    DebugMarker(&'static str),
}

/// Append-only recording of [`Command`]s for one frame.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Recording ──────────────────────────────────────────────────────────

    pub fn begin_render_pass(
        &mut self,
        framebuffer: &RhiFramebuffer,
        clear_color: Option<[f32; 4]>,
        clear_depth: Option<f32>,
    ) {
        self.commands.push(Command::BeginRenderPass {
            framebuffer: framebuffer.clone(),
            clear_color,
            clear_depth,
        });
    }

    pub fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    pub fn bind_pipeline(&mut self, pipeline: &RhiPipeline) {
        self.commands.push(Command::BindPipeline(pipeline.clone()));
    }

    pub fn bind_texture(&mut self, slot: u32, texture: &RhiTexture) {
        self.commands.push(Command::BindTexture {
            slot,
            texture: texture.clone(),
            mip_level: None,
            array_layer: None,
        });
    }

    pub fn bind_texture_mip(&mut self, slot: u32, texture: &RhiTexture, mip_level: u32) {
        self.commands.push(Command::BindTexture {
            slot,
            texture: texture.clone(),
            mip_level: Some(mip_level),
            array_layer: None,
        });
    }

    pub fn bind_texture_layer(&mut self, slot: u32, texture: &RhiTexture, array_layer: u32) {
        self.commands.push(Command::BindTexture {
            slot,
            texture: texture.clone(),
            mip_level: None,
            array_layer: Some(array_layer),
        });
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(Command::Dispatch { groups: [x, y, z] });
    }

    pub fn copy_texture(&mut self, source: &RhiTexture, destination: &RhiTexture) {
        self.commands.push(Command::CopyTexture {
            source: source.clone(),
            destination: destination.clone(),
        });
    }

    pub fn generate_mipmaps(&mut self, texture: &RhiTexture) {
        self.commands.push(Command::GenerateMipmaps {
            texture: texture.clone(),
        });
    }

    pub fn debug_marker(&mut self, name: &'static str) {
        self.commands.push(Command::DebugMarker(name));
    }

    // ── Inspection ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. }))
            .count()
    }

    #[must_use]
    pub fn dispatch_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Dispatch { .. }))
            .count()
    }

    /// Drops the recording and every resource reference it held.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}
