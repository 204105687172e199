//! Block-Compressed Texture Decoder
//!
//! Engine-native `.btx` container: a fixed little-endian header followed
//! by the packed BC mip chain. When the backend samples BC formats
//! natively the payload passes through untouched; otherwise each mip is
//! transcoded to RGBA8 through the block decompressor.
//!
//! # Container layout
//!
//! | offset | size | field                        |
//! |--------|------|------------------------------|
//! | 0      | 4    | magic `EBTX`                 |
//! | 4      | 1    | format tag (0=BC1 1=BC3 2=BC5) |
//! | 5      | 3    | reserved, zero               |
//! | 8      | 4    | width (u32)                  |
//! | 12     | 4    | height (u32)                 |
//! | 16     | 4    | mip level count (u32)        |
//! | 20     | ...  | mip 0 blocks, mip 1 blocks…  |

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

use crate::errors::{EngineError, Result};
use crate::rhi::{Capabilities, TextureDimension, TextureFormat, TextureViewDimension};
use crate::texture::loader::{
    DecodedTexture, LoadContext, LoaderKind, TextureLoader, clamp_top_mipmap_removal,
};

pub(crate) const BTX_MAGIC: &[u8; 4] = b"EBTX";

/// Parsed `.btx` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BtxHeader {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
}

impl BtxHeader {
    /// Byte size of the payload this header describes.
    pub fn payload_size(&self) -> usize {
        (0..self.mip_level_count)
            .map(|mip| {
                self.format
                    .mip_byte_size((self.width >> mip).max(1), (self.height >> mip).max(1), 1)
            })
            .sum()
    }
}

pub(crate) fn read_btx_header(reader: &mut impl Read) -> std::result::Result<BtxHeader, String> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| format!("truncated header: {e}"))?;
    if &magic != BTX_MAGIC {
        return Err("bad magic, not a block texture container".to_string());
    }

    let format_tag = reader.read_u8().map_err(|e| e.to_string())?;
    let mut reserved = [0u8; 3];
    reader.read_exact(&mut reserved).map_err(|e| e.to_string())?;
    let width = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| e.to_string())?;
    let height = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| e.to_string())?;
    let mip_level_count = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| e.to_string())?;

    let format = match format_tag {
        0 => TextureFormat::Bc1RgbaUnorm,
        1 => TextureFormat::Bc3RgbaUnorm,
        2 => TextureFormat::Bc5RgUnorm,
        other => return Err(format!("unknown format tag {other}")),
    };
    if width == 0 || height == 0 || mip_level_count == 0 {
        return Err("zero-sized texture".to_string());
    }
    let max_mips = 32 - width.max(height).leading_zeros();
    if mip_level_count > max_mips {
        return Err(format!(
            "{mip_level_count} mip levels do not fit {width}x{height}"
        ));
    }

    Ok(BtxHeader {
        format,
        width,
        height,
        mip_level_count,
    })
}

/// Applies the sRGB request to a stored BC format. BC5 carries
/// two-channel linear data and has no sRGB variant.
pub(crate) fn apply_srgb(format: TextureFormat, srgb: bool) -> TextureFormat {
    if !srgb {
        return format;
    }
    match format {
        TextureFormat::Bc1RgbaUnorm => TextureFormat::Bc1RgbaUnormSrgb,
        TextureFormat::Bc3RgbaUnorm => TextureFormat::Bc3RgbaUnormSrgb,
        other => other,
    }
}

/// Effective mip-removal for this header under the global policy.
pub(crate) fn effective_removal(header: &BtxHeader, requested: u32) -> u32 {
    let capped = requested.min(header.mip_level_count.saturating_sub(1));
    clamp_top_mipmap_removal(capped, header.width, header.height)
}

/// The texpresso format behind a BC layout, when one exists.
pub(crate) fn transcoder_format(format: TextureFormat) -> Option<texpresso::Format> {
    match format {
        TextureFormat::Bc1RgbaUnorm | TextureFormat::Bc1RgbaUnormSrgb => {
            Some(texpresso::Format::Bc1)
        }
        TextureFormat::Bc3RgbaUnorm | TextureFormat::Bc3RgbaUnormSrgb => {
            Some(texpresso::Format::Bc3)
        }
        _ => None,
    }
}

/// Whether decode must transcode to RGBA8 on this backend.
pub(crate) fn needs_transcode(capabilities: &Capabilities, format: TextureFormat) -> bool {
    format.is_compressed() && !capabilities.supports_bc_compression
}

/// Decompresses one BC mip level to tightly packed RGBA8.
pub(crate) fn transcode_mip(
    format: TextureFormat,
    blocks: &[u8],
    width: u32,
    height: u32,
) -> std::result::Result<Vec<u8>, String> {
    let Some(transcoder) = transcoder_format(format) else {
        return Err(format!(
            "no RGBA transcoder for {format:?} on this backend"
        ));
    };
    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    transcoder.decompress(blocks, width as usize, height as usize, &mut rgba);
    Ok(rgba)
}

pub struct BlockTextureLoader;

impl TextureLoader for BlockTextureLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::BlockTexture
    }

    fn decode(&mut self, bytes: &[u8], ctx: &LoadContext<'_>) -> Result<DecodedTexture> {
        let mut cursor = std::io::Cursor::new(bytes);
        let header = read_btx_header(&mut cursor).map_err(|reason| {
            EngineError::TextureDecode {
                asset_id: ctx.asset_id,
                reason,
            }
        })?;

        let payload = &bytes[cursor.position() as usize..];
        if payload.len() < header.payload_size() {
            return Err(EngineError::TextureDecode {
                asset_id: ctx.asset_id,
                reason: format!(
                    "payload is {} bytes, header requires {}",
                    payload.len(),
                    header.payload_size()
                ),
            });
        }

        let removal = effective_removal(&header, ctx.top_mips_to_remove);
        let base_width = (header.width >> removal).max(1);
        let base_height = (header.height >> removal).max(1);
        let mip_count = header.mip_level_count - removal;

        let skip: usize = (0..removal)
            .map(|mip| {
                header.format.mip_byte_size(
                    (header.width >> mip).max(1),
                    (header.height >> mip).max(1),
                    1,
                )
            })
            .sum();

        let stored_format = apply_srgb(header.format, ctx.srgb);

        if needs_transcode(ctx.capabilities, stored_format) {
            let mut data = Vec::new();
            let mut offset = skip;
            for mip in 0..mip_count {
                let w = (base_width >> mip).max(1);
                let h = (base_height >> mip).max(1);
                let block_bytes = header.format.mip_byte_size(w, h, 1);
                let rgba = transcode_mip(header.format, &payload[offset..offset + block_bytes], w, h)
                    .map_err(|reason| EngineError::TextureDecode {
                        asset_id: ctx.asset_id,
                        reason,
                    })?;
                data.extend_from_slice(&rgba);
                offset += block_bytes;
            }
            return Ok(DecodedTexture {
                label: format!("{:?}", ctx.asset_id),
                width: base_width,
                height: base_height,
                depth_or_array_layers: 1,
                dimension: TextureDimension::D2,
                view_dimension: TextureViewDimension::D2,
                format: if ctx.srgb {
                    TextureFormat::Rgba8UnormSrgb
                } else {
                    TextureFormat::Rgba8Unorm
                },
                mip_level_count: mip_count,
                data,
            });
        }

        let kept: usize = (0..mip_count)
            .map(|mip| {
                stored_format
                    .mip_byte_size((base_width >> mip).max(1), (base_height >> mip).max(1), 1)
            })
            .sum();

        Ok(DecodedTexture {
            label: format!("{:?}", ctx.asset_id),
            width: base_width,
            height: base_height,
            depth_or_array_layers: 1,
            dimension: TextureDimension::D2,
            view_dimension: TextureViewDimension::D2,
            format: stored_format,
            mip_level_count: mip_count,
            data: payload[skip..skip + kept].to_vec(),
        })
    }
}
