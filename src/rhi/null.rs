//! Null Driver
//!
//! Allocates descriptor-only handles and validates/tallies submitted
//! command buffers without touching any GPU. Tests, headless tools and
//! CI run the full compositor and streaming stack against this driver.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    Capabilities, Command, CommandBuffer, FramebufferDesc, PipelineDesc, RhiDevice,
    RhiFramebuffer, RhiPipeline, RhiTexture, TextureDesc,
};
use crate::errors::{EngineError, Result};

/// Marker payloads so handle downcasts can verify provenance.
struct NullTexture;
struct NullFramebuffer;
struct NullPipeline;

/// Running totals of submitted work.
#[derive(Debug, Default, Clone)]
pub struct SubmitStats {
    pub submits: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub copies: u64,
    pub render_passes: u64,
}

/// Descriptor-only device. Cheap to construct per test.
pub struct NullDevice {
    capabilities: Capabilities,
    created_textures: AtomicU64,
    stats: Mutex<SubmitStats>,
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl NullDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::default())
    }

    /// Tests use this to simulate weaker backends (no BC support, no
    /// multithreaded resource creation, GL-style depth range).
    #[must_use]
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            created_textures: AtomicU64::new(0),
            stats: Mutex::new(SubmitStats::default()),
        }
    }

    #[must_use]
    pub fn created_texture_count(&self) -> u64 {
        self.created_textures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> SubmitStats {
        self.stats.lock().clone()
    }

    fn validate_texture_desc(&self, desc: &TextureDesc) -> Result<()> {
        let caps = &self.capabilities;
        if desc.width == 0 || desc.height == 0 || desc.depth_or_array_layers == 0 {
            return Err(EngineError::InvalidTextureDesc {
                label: desc.label.clone(),
                reason: "zero-sized texture".into(),
            });
        }
        if desc.width > caps.max_texture_dimension_2d || desc.height > caps.max_texture_dimension_2d
        {
            return Err(EngineError::InvalidTextureDesc {
                label: desc.label.clone(),
                reason: format!(
                    "dimensions {}x{} exceed backend maximum {}",
                    desc.width, desc.height, caps.max_texture_dimension_2d
                ),
            });
        }
        if desc.mip_level_count == 0 {
            return Err(EngineError::InvalidTextureDesc {
                label: desc.label.clone(),
                reason: "mip_level_count must be at least 1".into(),
            });
        }
        if desc.sample_count > caps.max_multisample_count {
            return Err(EngineError::InvalidTextureDesc {
                label: desc.label.clone(),
                reason: format!(
                    "sample count {} exceeds backend maximum {}",
                    desc.sample_count, caps.max_multisample_count
                ),
            });
        }
        Ok(())
    }
}

impl RhiDevice for NullDevice {
    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn create_texture(&self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<RhiTexture> {
        self.validate_texture_desc(desc)?;
        if let Some(data) = data {
            let expected = desc.data_byte_size();
            if data.len() != expected {
                return Err(EngineError::InvalidTextureDesc {
                    label: desc.label.clone(),
                    reason: format!(
                        "initial data is {} bytes, layout requires {expected}",
                        data.len()
                    ),
                });
            }
        }
        self.created_textures.fetch_add(1, Ordering::Relaxed);
        Ok(RhiTexture::from_backend(desc.clone(), Box::new(NullTexture)))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<RhiFramebuffer> {
        if desc.color.is_none() && desc.depth.is_none() {
            return Err(EngineError::InvalidFramebufferDesc(format!(
                "'{}' has no attachments",
                desc.label
            )));
        }
        for att in desc.color.iter().chain(desc.depth.iter()) {
            if att.texture.backend::<NullTexture>().is_none() {
                return Err(EngineError::ForeignBackendResource("framebuffer attachment"));
            }
            let tex_desc = att.texture.desc();
            if att.mip_level >= tex_desc.mip_level_count
                || att.array_layer >= tex_desc.depth_or_array_layers
            {
                return Err(EngineError::InvalidFramebufferDesc(format!(
                    "'{}' attachment subresource out of range",
                    desc.label
                )));
            }
        }
        Ok(RhiFramebuffer::from_backend(
            desc.clone(),
            Box::new(NullFramebuffer),
        ))
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<RhiPipeline> {
        if desc.source.trim().is_empty() {
            return Err(EngineError::PipelineCreateFailed {
                label: desc.label.clone(),
                reason: "empty shader source".into(),
            });
        }
        Ok(RhiPipeline::from_backend(
            desc.label.clone(),
            desc.kind,
            Box::new(NullPipeline),
        ))
    }

    fn submit(&self, commands: &CommandBuffer) -> Result<()> {
        let mut stats = self.stats.lock();
        stats.submits += 1;

        let mut in_render_pass = false;
        for command in commands.commands() {
            match command {
                Command::BeginRenderPass { framebuffer, .. } => {
                    if framebuffer.backend::<NullFramebuffer>().is_none() {
                        return Err(EngineError::ForeignBackendResource("framebuffer"));
                    }
                    in_render_pass = true;
                    stats.render_passes += 1;
                }
                Command::EndRenderPass => {
                    in_render_pass = false;
                }
                Command::Draw { .. } => {
                    debug_assert!(in_render_pass, "draw outside a render pass");
                    stats.draws += 1;
                }
                Command::Dispatch { .. } => {
                    debug_assert!(!in_render_pass, "dispatch inside a render pass");
                    stats.dispatches += 1;
                }
                Command::CopyTexture {
                    source,
                    destination,
                } => {
                    if source.backend::<NullTexture>().is_none()
                        || destination.backend::<NullTexture>().is_none()
                    {
                        return Err(EngineError::ForeignBackendResource("copy operand"));
                    }
                    stats.copies += 1;
                }
                Command::BindPipeline(_)
                | Command::BindTexture { .. }
                | Command::GenerateMipmaps { .. }
                | Command::DebugMarker(_) => {}
            }
        }
        Ok(())
    }
}
