//! Render Hardware Interface
//!
//! Backend-agnostic surface the engine core consumes: device-independent
//! handles for textures, framebuffers and pipelines, a recorded command
//! buffer, and capability queries. Backends are swappable drivers behind
//! [`RhiDevice`]; the orchestration layers above never see backend types.
//!
//! Two drivers live in-tree: [`null::NullDevice`], which allocates
//! descriptor-only handles and tallies submitted work (used by tests and
//! headless tools), and [`wgpu_device::WgpuDevice`], which maps the same
//! surface onto a `wgpu` device.

pub mod command;
pub mod null;
pub mod wgpu_device;

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::errors::Result;

pub use command::{Command, CommandBuffer};
pub use null::NullDevice;
pub use wgpu_device::WgpuDevice;

// ============================================================================
// Capabilities
// ============================================================================

/// Capability queries the core consults before allocating resources or
/// recording commands.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Maximum sample count for multisampled render targets.
    pub max_multisample_count: u32,
    /// Maximum width/height of a 2D texture.
    pub max_texture_dimension_2d: u32,
    /// `true` when clip-space depth is `[0, 1]`, `false` for `[-1, 1]`.
    pub depth_clip_zero_to_one: bool,
    /// `true` when texture coordinates originate at the upper-left corner.
    pub upper_left_texture_origin: bool,
    /// `true` when GPU resources may be created from worker threads.
    pub native_multithreading: bool,
    /// `true` when BC block-compressed formats can be sampled directly.
    pub supports_bc_compression: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_multisample_count: 4,
            max_texture_dimension_2d: 8192,
            depth_clip_zero_to_one: true,
            upper_left_texture_origin: true,
            native_multithreading: true,
            supports_bc_compression: true,
        }
    }
}

// ============================================================================
// Texture Types
// ============================================================================

/// Physical texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

/// How a texture is addressed by samplers and attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewDimension {
    D1,
    D2,
    D2Array,
    Cube,
    D3,
}

/// Closed set of pixel formats the core allocates or decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rg16Float,
    Rgba16Float,
    Depth32Float,
    Bc1RgbaUnorm,
    Bc1RgbaUnormSrgb,
    Bc3RgbaUnorm,
    Bc3RgbaUnormSrgb,
    Bc5RgUnorm,
}

impl TextureFormat {
    /// Block footprint in texels (1×1 for uncompressed formats).
    #[must_use]
    pub fn block_dimensions(self) -> (u32, u32) {
        if self.is_compressed() { (4, 4) } else { (1, 1) }
    }

    /// Bytes per block (per texel for uncompressed formats).
    #[must_use]
    pub fn bytes_per_block(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Rg16Float => 4,
            Self::Rgba16Float => 8,
            Self::Depth32Float => 4,
            Self::Bc1RgbaUnorm | Self::Bc1RgbaUnormSrgb => 8,
            Self::Bc3RgbaUnorm | Self::Bc3RgbaUnormSrgb | Self::Bc5RgUnorm => 16,
        }
    }

    #[must_use]
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Self::Bc1RgbaUnorm
                | Self::Bc1RgbaUnormSrgb
                | Self::Bc3RgbaUnorm
                | Self::Bc3RgbaUnormSrgb
                | Self::Bc5RgUnorm
        )
    }

    #[must_use]
    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            Self::Rgba8UnormSrgb | Self::Bc1RgbaUnormSrgb | Self::Bc3RgbaUnormSrgb
        )
    }

    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    /// Byte size of one mip level with `layers` array layers.
    #[must_use]
    pub fn mip_byte_size(self, width: u32, height: u32, layers: u32) -> usize {
        let (bw, bh) = self.block_dimensions();
        let blocks_x = width.max(1).div_ceil(bw);
        let blocks_y = height.max(1).div_ceil(bh);
        blocks_x as usize * blocks_y as usize * self.bytes_per_block() as usize * layers as usize
    }
}

bitflags! {
    /// How a texture may be used once created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED           = 1 << 0;
        const RENDER_ATTACHMENT = 1 << 1;
        const COPY_SRC          = 1 << 2;
        const COPY_DST          = 1 << 3;
        const STORAGE           = 1 << 4;
    }
}

/// Description of a texture allocation.
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
    pub dimension: TextureDimension,
    pub view_dimension: TextureViewDimension,
    pub format: TextureFormat,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Convenience constructor for a sampled 2D texture.
    #[must_use]
    pub fn new_2d(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            depth_or_array_layers: 1,
            dimension: TextureDimension::D2,
            view_dimension: TextureViewDimension::D2,
            format,
            mip_level_count: 1,
            sample_count: 1,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        }
    }

    /// Total byte size of the packed mip chain this desc describes.
    #[must_use]
    pub fn data_byte_size(&self) -> usize {
        let mut total = 0;
        for mip in 0..self.mip_level_count {
            let w = (self.width >> mip).max(1);
            let h = (self.height >> mip).max(1);
            let layers = if self.dimension == TextureDimension::D3 {
                (self.depth_or_array_layers >> mip).max(1)
            } else {
                self.depth_or_array_layers
            };
            total += self.format.mip_byte_size(w, h, layers);
        }
        total
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Reference-counted texture handle. Equality is allocation identity.
#[derive(Clone)]
pub struct RhiTexture {
    inner: Arc<TextureInner>,
}

struct TextureInner {
    desc: TextureDesc,
    backend: Box<dyn Any + Send + Sync>,
}

impl RhiTexture {
    /// Backends call this to wrap their native object.
    #[must_use]
    pub fn from_backend(desc: TextureDesc, backend: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(TextureInner { desc, backend }),
        }
    }

    #[must_use]
    pub fn desc(&self) -> &TextureDesc {
        &self.inner.desc
    }

    /// Backend payload downcast; `None` for a foreign backend's handle.
    #[must_use]
    pub fn backend<T: 'static>(&self) -> Option<&T> {
        self.inner.backend.downcast_ref()
    }

    #[must_use]
    pub fn same_allocation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for RhiTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhiTexture")
            .field("label", &self.inner.desc.label)
            .field("format", &self.inner.desc.format)
            .finish_non_exhaustive()
    }
}

/// One framebuffer attachment: a texture restricted to a single mip level
/// and array layer. Framebuffers reference but do not own their textures.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub texture: RhiTexture,
    pub mip_level: u32,
    pub array_layer: u32,
}

impl Attachment {
    #[must_use]
    pub fn base(texture: RhiTexture) -> Self {
        Self {
            texture,
            mip_level: 0,
            array_layer: 0,
        }
    }
}

/// Description of a framebuffer.
#[derive(Debug, Clone)]
pub struct FramebufferDesc {
    pub label: String,
    pub color: Option<Attachment>,
    pub depth: Option<Attachment>,
}

/// Reference-counted framebuffer handle.
#[derive(Clone)]
pub struct RhiFramebuffer {
    inner: Arc<FramebufferInner>,
}

struct FramebufferInner {
    desc: FramebufferDesc,
    backend: Box<dyn Any + Send + Sync>,
}

impl RhiFramebuffer {
    #[must_use]
    pub fn from_backend(desc: FramebufferDesc, backend: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(FramebufferInner { desc, backend }),
        }
    }

    #[must_use]
    pub fn desc(&self) -> &FramebufferDesc {
        &self.inner.desc
    }

    #[must_use]
    pub fn backend<T: 'static>(&self) -> Option<&T> {
        self.inner.backend.downcast_ref()
    }

    /// Render area in texels, taken from the first attachment's mip level.
    #[must_use]
    pub fn extent(&self) -> (u32, u32) {
        let att = self.inner.desc.color.as_ref().or(self.inner.desc.depth.as_ref());
        att.map_or((0, 0), |a| {
            let d = a.texture.desc();
            (
                (d.width >> a.mip_level).max(1),
                (d.height >> a.mip_level).max(1),
            )
        })
    }
}

impl std::fmt::Debug for RhiFramebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhiFramebuffer")
            .field("label", &self.inner.desc.label)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Pipelines
// ============================================================================

/// Whether a pipeline rasterizes a fullscreen triangle or dispatches
/// compute work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

/// What a pipeline expects at one `@group(0)` binding index.
///
/// Sampler bindings are satisfied by the backend's shared linear-clamp
/// sampler; texture bindings are satisfied by the texture bound at the
/// matching [`Command::BindTexture`](command::Command::BindTexture) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Sampler,
    Texture2d,
    Texture2dArray,
    DepthTexture2d,
    DepthTextureMultisampled2d,
}

/// Description of a pipeline built from WGSL source.
///
/// Graphics pipelines use the `vs_main`/`fs_main` entry points and draw
/// without vertex buffers (fullscreen triangle); compute pipelines use
/// `cs_main`. Scene geometry pipelines are owned by the material system,
/// which sits outside this interface.
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    pub label: String,
    pub source: String,
    pub kind: PipelineKind,
    /// `@group(0)` layout, by binding index.
    pub bindings: Vec<BindingKind>,
    pub color_format: Option<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    /// Sample count of the attachments this pipeline renders into.
    pub sample_count: u32,
}

/// Reference-counted pipeline handle.
#[derive(Clone)]
pub struct RhiPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    label: String,
    kind: PipelineKind,
    backend: Box<dyn Any + Send + Sync>,
}

impl RhiPipeline {
    #[must_use]
    pub fn from_backend(
        label: String,
        kind: PipelineKind,
        backend: Box<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                label,
                kind,
                backend,
            }),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    #[must_use]
    pub fn kind(&self) -> PipelineKind {
        self.inner.kind
    }

    #[must_use]
    pub fn backend<T: 'static>(&self) -> Option<&T> {
        self.inner.backend.downcast_ref()
    }
}

impl std::fmt::Debug for RhiPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhiPipeline")
            .field("label", &self.inner.label)
            .field("kind", &self.inner.kind)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Device Trait
// ============================================================================

/// The driver seam. All methods take `&self`; implementations are
/// internally synchronized so worker threads may create resources when
/// [`Capabilities::native_multithreading`] says so.
pub trait RhiDevice: Send + Sync {
    fn capabilities(&self) -> &Capabilities;

    /// Creates a texture, optionally uploading a packed mip chain
    /// (mip-major, then layer-major, tightly packed rows).
    fn create_texture(&self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<RhiTexture>;

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<RhiFramebuffer>;

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<RhiPipeline>;

    /// Translates and executes a recorded command buffer.
    fn submit(&self, commands: &CommandBuffer) -> Result<()>;
}
