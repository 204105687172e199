//! Block-Compressed Array Texture Decoder
//!
//! A `.bta` asset is a manifest naming N independently compressed `.btx`
//! slice files that share one logical array texture. The first slice is
//! the master: it fixes format, dimensions and mip count for the whole
//! array, and every later slice's header must match it.
//!
//! Slice files are read through the asset provider into one shared
//! scratch buffer, pre-sized from the slice sizes resolved up front, and
//! decoded into a mip-major, then slice-major layout so the result
//! uploads as a packed 2D-array mip chain.
//!
//! # Manifest layout
//!
//! | offset | size | field                              |
//! |--------|------|------------------------------------|
//! | 0      | 4    | magic `EBTA`                       |
//! | 4      | 1    | array kind (0=2D array, 1=cube array) |
//! | 5      | 3    | reserved, zero                     |
//! | 8      | 4    | slice count (u32)                  |
//! | 12     | 8×N  | slice asset ids (u64)              |

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

use crate::asset::AssetId;
use crate::errors::{EngineError, Result};
use crate::rhi::{TextureDimension, TextureFormat, TextureViewDimension};
use crate::texture::loader::{DecodedTexture, LoadContext, LoaderKind, TextureLoader};
use crate::texture::loaders::block::{
    BtxHeader, apply_srgb, effective_removal, needs_transcode, read_btx_header, transcode_mip,
};

const BTA_MAGIC: &[u8; 4] = b"EBTA";

#[derive(Default)]
pub struct BlockArrayLoader {
    /// Shared scratch for slice file contents, reused across slices.
    scratch: Vec<u8>,
}

struct Manifest {
    slice_ids: Vec<AssetId>,
}

fn read_manifest(bytes: &[u8]) -> std::result::Result<Manifest, String> {
    let mut reader = std::io::Cursor::new(bytes);
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| format!("truncated manifest: {e}"))?;
    if &magic != BTA_MAGIC {
        return Err("bad magic, not an array texture manifest".to_string());
    }

    let array_kind = reader.read_u8().map_err(|e| e.to_string())?;
    let mut reserved = [0u8; 3];
    reader.read_exact(&mut reserved).map_err(|e| e.to_string())?;
    match array_kind {
        0 => {}
        1 => return Err("cube array textures are not supported".to_string()),
        other => return Err(format!("unknown array kind {other}")),
    }

    let slice_count = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| e.to_string())?;
    if slice_count == 0 {
        return Err("manifest names zero slices".to_string());
    }

    let mut slice_ids = Vec::with_capacity(slice_count as usize);
    for _ in 0..slice_count {
        let raw = reader
            .read_u64::<LittleEndian>()
            .map_err(|e| e.to_string())?;
        let id = AssetId(raw);
        if !id.is_valid() {
            return Err("manifest contains an invalid slice id".to_string());
        }
        slice_ids.push(id);
    }

    Ok(Manifest { slice_ids })
}

impl TextureLoader for BlockArrayLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::BlockTextureArray
    }

    fn decode(&mut self, bytes: &[u8], ctx: &LoadContext<'_>) -> Result<DecodedTexture> {
        let decode_err = |reason: String| EngineError::TextureDecode {
            asset_id: ctx.asset_id,
            reason,
        };

        let manifest = read_manifest(bytes).map_err(decode_err)?;
        let slice_count = manifest.slice_ids.len() as u32;

        // Resolve every slice's file size up front so the scratch buffer
        // is allocated once.
        let mut largest = 0u64;
        for &slice_id in &manifest.slice_ids {
            let size = ctx
                .provider
                .size(slice_id)
                .ok_or(EngineError::AssetNotFound(slice_id))?;
            largest = largest.max(size);
        }
        self.scratch.clear();
        self.scratch.reserve(largest as usize);

        // Slice 0 is the master: it decides format and dimensions for
        // the whole array.
        ctx.provider
            .read_into(manifest.slice_ids[0], &mut self.scratch)?;
        let master = parse_slice_header(&self.scratch).map_err(decode_err)?;

        let removal = effective_removal(&master, ctx.top_mips_to_remove);
        let base_width = (master.width >> removal).max(1);
        let base_height = (master.height >> removal).max(1);
        let mip_count = master.mip_level_count - removal;

        let stored_format = apply_srgb(master.format, ctx.srgb);
        let transcode = needs_transcode(ctx.capabilities, stored_format);
        let output_format = if transcode {
            if ctx.srgb {
                TextureFormat::Rgba8UnormSrgb
            } else {
                TextureFormat::Rgba8Unorm
            }
        } else {
            stored_format
        };

        // Mip-major, then slice-major: all slices of mip 0, then all
        // slices of mip 1, and so on.
        let mip_offsets: Vec<usize> = {
            let mut offsets = Vec::with_capacity(mip_count as usize);
            let mut acc = 0usize;
            for mip in 0..mip_count {
                offsets.push(acc);
                acc += output_format.mip_byte_size(
                    (base_width >> mip).max(1),
                    (base_height >> mip).max(1),
                    slice_count,
                );
            }
            offsets
        };
        let total_size: usize = (0..mip_count)
            .map(|mip| {
                output_format.mip_byte_size(
                    (base_width >> mip).max(1),
                    (base_height >> mip).max(1),
                    slice_count,
                )
            })
            .sum();
        let mut data = vec![0u8; total_size];

        for (slice_index, &slice_id) in manifest.slice_ids.iter().enumerate() {
            if slice_index != 0 {
                ctx.provider.read_into(slice_id, &mut self.scratch)?;
            }
            let header = parse_slice_header(&self.scratch).map_err(decode_err)?;
            debug_assert_eq!(
                header, master,
                "array slice {slice_index} disagrees with the master slice"
            );
            if header != master {
                return Err(decode_err(format!(
                    "slice {slice_index} header {header:?} does not match master {master:?}"
                )));
            }

            let payload = &self.scratch[BTX_HEADER_SIZE..];
            if payload.len() < header.payload_size() {
                return Err(decode_err(format!(
                    "slice {slice_index} payload is {} bytes, header requires {}",
                    payload.len(),
                    header.payload_size()
                )));
            }

            let mut src_offset: usize = (0..removal)
                .map(|mip| {
                    master.format.mip_byte_size(
                        (master.width >> mip).max(1),
                        (master.height >> mip).max(1),
                        1,
                    )
                })
                .sum();

            for mip in 0..mip_count {
                let w = (base_width >> mip).max(1);
                let h = (base_height >> mip).max(1);
                let src_size = master.format.mip_byte_size(w, h, 1);
                let dst_size = output_format.mip_byte_size(w, h, 1);
                let dst_offset = mip_offsets[mip as usize] + slice_index * dst_size;

                if transcode {
                    let rgba =
                        transcode_mip(master.format, &payload[src_offset..src_offset + src_size], w, h)
                            .map_err(decode_err)?;
                    data[dst_offset..dst_offset + dst_size].copy_from_slice(&rgba);
                } else {
                    data[dst_offset..dst_offset + dst_size]
                        .copy_from_slice(&payload[src_offset..src_offset + src_size]);
                }
                src_offset += src_size;
            }
        }

        Ok(DecodedTexture {
            label: format!("{:?}", ctx.asset_id),
            width: base_width,
            height: base_height,
            depth_or_array_layers: slice_count,
            dimension: TextureDimension::D2,
            view_dimension: TextureViewDimension::D2Array,
            format: output_format,
            mip_level_count: mip_count,
            data,
        })
    }
}

const BTX_HEADER_SIZE: usize = 20;

fn parse_slice_header(bytes: &[u8]) -> std::result::Result<BtxHeader, String> {
    let mut cursor = std::io::Cursor::new(bytes);
    read_btx_header(&mut cursor)
}
