//! Texture Loader Framework
//!
//! A loader is associated 1:1 with a target resource for the duration of
//! one load. Its work is split into two phases:
//!
//! 1. **decode** (any thread): parse and transcode the asset bytes into an
//!    immutable [`DecodedTexture`] blob.
//! 2. **upload** (GPU-owning thread, or a worker when the backend reports
//!    [`native_multithreading`](crate::rhi::Capabilities::native_multithreading)):
//!    consume the blob exactly once and build the GPU texture.
//!
//! The split keeps decode-heavy formats (block-compression transcoding)
//! off the GPU-owning thread when the backend allows concurrent resource
//! creation; backends without that capability get the same interface with
//! the upload folded into the per-frame dispatch.

use crate::asset::{AssetId, AssetProvider};
use crate::errors::Result;
use crate::rhi::{
    Capabilities, RhiDevice, RhiTexture, TextureDesc, TextureDimension, TextureFormat,
    TextureUsage, TextureViewDimension,
};

/// Which decoder handles an asset, detected from the virtual filename
/// extension when not requested explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    /// Standard images (`.png`, `.jpg`, `.jpeg`), decoded to RGBA8.
    Image,
    /// Engine block-compressed container (`.btx`).
    BlockTexture,
    /// Array texture assembled from independently compressed slice files
    /// (`.bta` manifest).
    BlockTextureArray,
}

impl LoaderKind {
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            "btx" => Some(Self::BlockTexture),
            "bta" => Some(Self::BlockTextureArray),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = filename.rsplit('.').next()?;
        Self::from_extension(extension)
    }
}

/// Everything a decoder needs besides the asset bytes.
pub struct LoadContext<'a> {
    pub asset_id: AssetId,
    pub srgb: bool,
    /// Global top-mipmap-stripping policy, already set on the manager.
    pub top_mips_to_remove: u32,
    pub capabilities: &'a Capabilities,
    /// Array loaders read their slice files through this.
    pub provider: &'a dyn AssetProvider,
}

/// Immutable CPU-side result of the decode phase.
///
/// `data` is tightly packed mip-major, then layer-major, matching the
/// GPU array-texture upload convention.
#[derive(Debug, Clone)]
pub struct DecodedTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
    pub dimension: TextureDimension,
    pub view_dimension: TextureViewDimension,
    pub format: TextureFormat,
    pub mip_level_count: u32,
    pub data: Vec<u8>,
}

impl DecodedTexture {
    #[must_use]
    pub fn texture_desc(&self) -> TextureDesc {
        TextureDesc {
            label: self.label.clone(),
            width: self.width,
            height: self.height,
            depth_or_array_layers: self.depth_or_array_layers,
            dimension: self.dimension,
            view_dimension: self.view_dimension,
            format: self.format,
            mip_level_count: self.mip_level_count,
            sample_count: 1,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
        }
    }
}

/// Format-specific decoder. One instance serves one load.
pub trait TextureLoader: Send {
    fn kind(&self) -> LoaderKind;

    /// Parses `bytes` into the final CPU pixel layout.
    fn decode(&mut self, bytes: &[u8], ctx: &LoadContext<'_>) -> Result<DecodedTexture>;
}

/// Instantiates the decoder for `kind`.
#[must_use]
pub fn make_loader(kind: LoaderKind) -> Box<dyn TextureLoader> {
    match kind {
        LoaderKind::Image => Box::new(super::loaders::image::ImageLoader),
        LoaderKind::BlockTexture => Box::new(super::loaders::block::BlockTextureLoader),
        LoaderKind::BlockTextureArray => {
            Box::new(super::loaders::block_array::BlockArrayLoader::default())
        }
    }
}

/// Upload phase: consumes a decoded blob and builds the GPU texture.
pub fn create_gpu_texture(device: &dyn RhiDevice, decoded: &DecodedTexture) -> Result<RhiTexture> {
    device.create_texture(&decoded.texture_desc(), Some(&decoded.data))
}

/// Snaps a requested top-mipmap-removal count downward until the
/// resulting base level is at least 4×4 and evenly divisible by 4, so
/// 4×4 block constraints hold for every remaining level. Returns 0 when
/// no level below the original base qualifies.
#[must_use]
pub fn clamp_top_mipmap_removal(requested: u32, width: u32, height: u32) -> u32 {
    let mut removal = requested;
    while removal > 0 {
        let w = (width >> removal).max(1);
        let h = (height >> removal).max(1);
        if w >= 4 && h >= 4 && w % 4 == 0 && h % 4 == 0 {
            return removal;
        }
        removal -= 1;
    }
    0
}
