//! Compositor Resource Graph
//!
//! Immutable descriptors for nodes, targets and passes, plus the binary
//! deserializer for the offline compiler's output. The pass set is closed;
//! the instance layer dispatches over it with an exhaustive match.
//!
//! # Wire format
//!
//! All integers little-endian. The blob starts with a fixed header,
//! followed by nodes, each a fixed node header and its targets; each
//! target a fixed header and its passes; each pass a fixed record
//! (`type fourcc`, `payload size`) followed by a type-specific payload.
//! The compute pass payload ends in `number_of_material_properties`
//! fixed-size property records.
//!
//! ```text
//! workspace := magic "EBCW" (u32) | version (u32) | node_count (u32)
//! node      := node_id (u64) | target_count (u32)
//! target    := render_target_asset_id (u64, 0 = none) | pass_count (u32)
//! pass      := type fourcc (u32) | payload_size (u32) | payload
//! property  := property_id (u64) | kind (u8) | reserved ([u8; 7]) | value (u64)
//! ```

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;
use std::sync::Arc;

use crate::asset::{AssetId, PropertyId};
use crate::errors::{EngineError, Result};
use crate::material::{MaterialProperties, PropertyValue};

const WORKSPACE_MAGIC: u32 = u32::from_le_bytes(*b"EBCW");
const WORKSPACE_VERSION: u32 = 1;

const PASS_SCENE: u32 = u32::from_le_bytes(*b"SCEN");
const PASS_SHADOW: u32 = u32::from_le_bytes(*b"SHDW");
const PASS_COMPUTE: u32 = u32::from_le_bytes(*b"COMP");
const PASS_COPY: u32 = u32::from_le_bytes(*b"COPY");
const PASS_MIPMAPS: u32 = u32::from_le_bytes(*b"MIPS");
const PASS_DEBUG_GUI: u32 = u32::from_le_bytes(*b"DGUI");

/// Hard ceiling on directional-light shadow cascades.
pub const MAXIMUM_NUMBER_OF_SHADOW_CASCADES: u32 = 4;

// ============================================================================
// Descriptors
// ============================================================================

/// Whole-workspace resource graph. Nodes execute in sequence order,
/// baked in at graph-build time.
#[derive(Debug, Clone)]
pub struct CompositorWorkspaceDesc {
    pub nodes: Vec<Arc<CompositorNodeDesc>>,
}

#[derive(Debug, Clone)]
pub struct CompositorNodeDesc {
    /// Hashed node name, for diagnostics and cross-node references.
    pub node_id: u64,
    pub targets: Vec<CompositorTargetDesc>,
}

#[derive(Debug, Clone)]
pub struct CompositorTargetDesc {
    /// Texture the target's passes render into; `None` renders into
    /// pass-owned targets only (e.g. the shadow pass).
    pub render_target: Option<AssetId>,
    pub passes: Vec<CompositorPassDesc>,
}

/// Closed set of pass kinds.
#[derive(Debug, Clone)]
pub enum CompositorPassDesc {
    Scene(ScenePassDesc),
    ShadowMap(ShadowMapPassDesc),
    Compute(ComputePassDesc),
    Copy(CopyPassDesc),
    GenerateMipmaps(GenerateMipmapsPassDesc),
    DebugGui,
}

#[derive(Debug, Clone)]
pub struct ScenePassDesc {
    pub minimum_render_queue_index: u8,
    pub maximum_render_queue_index: u8,
    pub clear_color: Option<[f32; 4]>,
    /// Fallback pipeline blueprint; the material system supplies real
    /// per-material pipelines outside this core.
    pub blueprint: Option<AssetId>,
}

#[derive(Debug, Clone)]
pub struct ShadowMapPassDesc {
    pub cascade_count: u32,
    pub multisample_count: u32,
    pub resolution: u32,
    /// Log/uniform split blend; 1.0 is fully logarithmic.
    pub split_lambda: f32,
    /// Blur filter footprint in texels.
    pub filter_size: f32,
    /// Normalized depth range the cascades cover.
    pub minimum_depth: f32,
    pub maximum_depth: f32,
    pub stabilize_cascades: bool,
    pub enabled: bool,
    /// Blueprint overrides; zeroed ids select the built-in shaders.
    pub depth_blueprint: Option<AssetId>,
    pub evsm_blueprint: Option<AssetId>,
    pub blur_blueprint: Option<AssetId>,
}

impl Default for ShadowMapPassDesc {
    fn default() -> Self {
        Self {
            cascade_count: MAXIMUM_NUMBER_OF_SHADOW_CASCADES,
            multisample_count: 4,
            resolution: 1024,
            split_lambda: 0.99,
            filter_size: 8.0,
            minimum_depth: 0.0,
            maximum_depth: 1.0,
            stabilize_cascades: false,
            enabled: true,
            depth_blueprint: None,
            evsm_blueprint: None,
            blur_blueprint: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComputePassDesc {
    pub blueprint: AssetId,
    pub properties: MaterialProperties,
}

#[derive(Debug, Clone)]
pub struct CopyPassDesc {
    pub destination: AssetId,
    pub source: AssetId,
}

#[derive(Debug, Clone)]
pub struct GenerateMipmapsPassDesc {
    pub texture: AssetId,
    /// `None` selects single-call hardware generation; a blueprint
    /// switches to per-mip custom generation (e.g. hierarchical depth).
    pub blueprint: Option<AssetId>,
}

// ============================================================================
// Deserialization
// ============================================================================

impl CompositorWorkspaceDesc {
    /// Parses the offline compiler's binary workspace blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = std::io::Cursor::new(bytes);
        let parse = |reason: String| EngineError::GraphDeserialization(reason);

        let magic = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| parse(e.to_string()))?;
        if magic != WORKSPACE_MAGIC {
            return Err(parse("bad workspace magic".into()));
        }
        let version = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| parse(e.to_string()))?;
        if version != WORKSPACE_VERSION {
            return Err(parse(format!("unsupported workspace version {version}")));
        }

        let node_count = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| parse(e.to_string()))?;
        let mut nodes = Vec::with_capacity(node_count as usize);
        for _ in 0..node_count {
            nodes.push(Arc::new(read_node(&mut reader)?));
        }
        Ok(Self { nodes })
    }
}

fn read_node(reader: &mut impl Read) -> Result<CompositorNodeDesc> {
    let parse = |reason: String| EngineError::GraphDeserialization(reason);

    let node_id = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| parse(e.to_string()))?;
    let target_count = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| parse(e.to_string()))?;
    let mut targets = Vec::with_capacity(target_count as usize);
    for _ in 0..target_count {
        targets.push(read_target(reader)?);
    }
    Ok(CompositorNodeDesc { node_id, targets })
}

fn read_target(reader: &mut impl Read) -> Result<CompositorTargetDesc> {
    let parse = |reason: String| EngineError::GraphDeserialization(reason);

    let raw_target = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| parse(e.to_string()))?;
    let pass_count = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| parse(e.to_string()))?;
    let mut passes = Vec::with_capacity(pass_count as usize);
    for _ in 0..pass_count {
        passes.push(read_pass(reader)?);
    }
    Ok(CompositorTargetDesc {
        render_target: asset_or_none(raw_target),
        passes,
    })
}

fn read_pass(reader: &mut impl Read) -> Result<CompositorPassDesc> {
    let parse = |reason: String| EngineError::GraphDeserialization(reason);

    let type_tag = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| parse(e.to_string()))?;
    let payload_size = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| parse(e.to_string()))?;
    let mut payload = vec![0u8; payload_size as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| parse(format!("truncated pass payload: {e}")))?;
    let mut payload = std::io::Cursor::new(payload);

    match type_tag {
        PASS_SCENE => read_scene_pass(&mut payload),
        PASS_SHADOW => read_shadow_pass(&mut payload),
        PASS_COMPUTE => read_compute_pass(&mut payload),
        PASS_COPY => read_copy_pass(&mut payload),
        PASS_MIPMAPS => read_mipmaps_pass(&mut payload),
        PASS_DEBUG_GUI => Ok(CompositorPassDesc::DebugGui),
        other => Err(parse(format!("unknown pass type tag {other:#010x}"))),
    }
}

fn read_scene_pass(reader: &mut impl Read) -> Result<CompositorPassDesc> {
    let parse = |e: std::io::Error| EngineError::GraphDeserialization(e.to_string());

    let minimum = reader.read_u8().map_err(parse)?;
    let maximum = reader.read_u8().map_err(parse)?;
    let has_clear = reader.read_u8().map_err(parse)? != 0;
    let _reserved = reader.read_u8().map_err(parse)?;
    let mut clear = [0.0f32; 4];
    for c in &mut clear {
        *c = reader.read_f32::<LittleEndian>().map_err(parse)?;
    }
    let blueprint = reader.read_u64::<LittleEndian>().map_err(parse)?;

    Ok(CompositorPassDesc::Scene(ScenePassDesc {
        minimum_render_queue_index: minimum,
        maximum_render_queue_index: maximum,
        clear_color: has_clear.then_some(clear),
        blueprint: asset_or_none(blueprint),
    }))
}

fn read_shadow_pass(reader: &mut impl Read) -> Result<CompositorPassDesc> {
    let parse = |e: std::io::Error| EngineError::GraphDeserialization(e.to_string());

    let cascade_count = reader.read_u8().map_err(parse)?;
    let multisample_count = reader.read_u8().map_err(parse)?;
    let stabilize = reader.read_u8().map_err(parse)? != 0;
    let enabled = reader.read_u8().map_err(parse)? != 0;
    let resolution = reader.read_u32::<LittleEndian>().map_err(parse)?;
    let split_lambda = reader.read_f32::<LittleEndian>().map_err(parse)?;
    let filter_size = reader.read_f32::<LittleEndian>().map_err(parse)?;
    let minimum_depth = reader.read_f32::<LittleEndian>().map_err(parse)?;
    let maximum_depth = reader.read_f32::<LittleEndian>().map_err(parse)?;
    let depth_blueprint = reader.read_u64::<LittleEndian>().map_err(parse)?;
    let evsm_blueprint = reader.read_u64::<LittleEndian>().map_err(parse)?;
    let blur_blueprint = reader.read_u64::<LittleEndian>().map_err(parse)?;

    if u32::from(cascade_count) > MAXIMUM_NUMBER_OF_SHADOW_CASCADES || cascade_count == 0 {
        return Err(EngineError::GraphDeserialization(format!(
            "shadow pass declares {cascade_count} cascades"
        )));
    }

    Ok(CompositorPassDesc::ShadowMap(ShadowMapPassDesc {
        cascade_count: u32::from(cascade_count),
        multisample_count: u32::from(multisample_count.max(1)),
        resolution,
        split_lambda,
        filter_size,
        minimum_depth,
        maximum_depth,
        stabilize_cascades: stabilize,
        enabled,
        depth_blueprint: asset_or_none(depth_blueprint),
        evsm_blueprint: asset_or_none(evsm_blueprint),
        blur_blueprint: asset_or_none(blur_blueprint),
    }))
}

fn read_compute_pass(reader: &mut impl Read) -> Result<CompositorPassDesc> {
    let parse = |e: std::io::Error| EngineError::GraphDeserialization(e.to_string());

    let blueprint = reader.read_u64::<LittleEndian>().map_err(parse)?;
    let property_count = reader.read_u32::<LittleEndian>().map_err(parse)?;
    let _reserved = reader.read_u32::<LittleEndian>().map_err(parse)?;

    let mut properties = MaterialProperties::new();
    for _ in 0..property_count {
        let key = reader.read_u64::<LittleEndian>().map_err(parse)?;
        let kind = reader.read_u8().map_err(parse)?;
        let mut reserved = [0u8; 7];
        reader.read_exact(&mut reserved).map_err(parse)?;
        let raw = reader.read_u64::<LittleEndian>().map_err(parse)?;
        let value = match kind {
            0 => PropertyValue::Integer(raw as u32 as i32),
            1 => PropertyValue::Float(f32::from_bits(raw as u32)),
            2 => PropertyValue::Boolean(raw != 0),
            3 => PropertyValue::Texture(AssetId(raw)),
            other => {
                return Err(EngineError::GraphDeserialization(format!(
                    "unknown property value kind {other}"
                )));
            }
        };
        properties.set(PropertyId(key), value);
    }

    if !blueprint_is_set(blueprint) {
        return Err(EngineError::GraphDeserialization(
            "compute pass without a blueprint".into(),
        ));
    }
    Ok(CompositorPassDesc::Compute(ComputePassDesc {
        blueprint: AssetId(blueprint),
        properties,
    }))
}

fn read_copy_pass(reader: &mut impl Read) -> Result<CompositorPassDesc> {
    let parse = |e: std::io::Error| EngineError::GraphDeserialization(e.to_string());

    let destination = reader.read_u64::<LittleEndian>().map_err(parse)?;
    let source = reader.read_u64::<LittleEndian>().map_err(parse)?;
    if !blueprint_is_set(destination) || !blueprint_is_set(source) {
        return Err(EngineError::GraphDeserialization(
            "copy pass requires both source and destination".into(),
        ));
    }
    Ok(CompositorPassDesc::Copy(CopyPassDesc {
        destination: AssetId(destination),
        source: AssetId(source),
    }))
}

fn read_mipmaps_pass(reader: &mut impl Read) -> Result<CompositorPassDesc> {
    let parse = |e: std::io::Error| EngineError::GraphDeserialization(e.to_string());

    let texture = reader.read_u64::<LittleEndian>().map_err(parse)?;
    let blueprint = reader.read_u64::<LittleEndian>().map_err(parse)?;
    if !blueprint_is_set(texture) {
        return Err(EngineError::GraphDeserialization(
            "generate-mipmaps pass without a texture".into(),
        ));
    }
    Ok(CompositorPassDesc::GenerateMipmaps(GenerateMipmapsPassDesc {
        texture: AssetId(texture),
        blueprint: asset_or_none(blueprint),
    }))
}

fn asset_or_none(raw: u64) -> Option<AssetId> {
    (raw != 0).then_some(AssetId(raw))
}

fn blueprint_is_set(raw: u64) -> bool {
    raw != 0
}
