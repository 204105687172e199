//! Standard Image Decoder
//!
//! Decodes `.png`/`.jpg` assets to RGBA8 through the `image` crate.
//! Single mip; mipmap generation for these assets is the compositor's
//! job (hardware generate-mipmaps pass) rather than the decoder's.

use crate::errors::Result;
use crate::rhi::{TextureDimension, TextureFormat, TextureViewDimension};
use crate::texture::loader::{DecodedTexture, LoadContext, LoaderKind, TextureLoader};

pub struct ImageLoader;

impl TextureLoader for ImageLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Image
    }

    fn decode(&mut self, bytes: &[u8], ctx: &LoadContext<'_>) -> Result<DecodedTexture> {
        let decoded = image::load_from_memory(bytes)?;
        let width = decoded.width();
        let height = decoded.height();
        let rgba = decoded.to_rgba8();

        Ok(DecodedTexture {
            label: format!("{:?}", ctx.asset_id),
            width,
            height,
            depth_or_array_layers: 1,
            dimension: TextureDimension::D2,
            view_dimension: TextureViewDimension::D2,
            format: if ctx.srgb {
                TextureFormat::Rgba8UnormSrgb
            } else {
                TextureFormat::Rgba8Unorm
            },
            mip_level_count: 1,
            data: rgba.into_vec(),
        })
    }
}
