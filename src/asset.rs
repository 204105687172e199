//! Asset Identity & Provider Seam
//!
//! Assets are addressed by [`AssetId`], a 64-bit xxh3 hash of the asset's
//! virtual path. Hashing is `const`, so well-known ids (the dynamic
//! textures created by code rather than loaded from content) are
//! compile-time constants that content and code can agree on.
//!
//! The file-manager/package layer is an external collaborator; the engine
//! core only consumes the [`AssetProvider`] trait. Tests and tools register
//! in-memory assets through [`MemoryAssetProvider`].

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use xxhash_rust::const_xxh3::xxh3_64;

use crate::errors::{EngineError, Result};

/// Hashed virtual asset path.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u64);

impl AssetId {
    /// An id no asset can have; used to mean "not set" in wire formats.
    pub const INVALID: AssetId = AssetId(0);

    /// Hashes a virtual asset path. Usable in `const` context.
    #[must_use]
    pub const fn from_path(path: &str) -> Self {
        Self(xxh3_64(path.as_bytes()))
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Debug for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AssetId({:#018x})", self.0)
    }
}

/// Hashed material property key.
///
/// Property names are an authoring contract shared with material
/// blueprints; the hash input must match the blueprint's declaration
/// byte for byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PropertyId(pub u64);

impl PropertyId {
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        Self(xxh3_64(name.as_bytes()))
    }
}

/// Property keys consumed by the built-in compositor sub-passes.
pub mod property {
    use super::PropertyId;

    pub const DEPTH_MAP: PropertyId = PropertyId::from_name("DepthMap");
    pub const COLOR_MAP: PropertyId = PropertyId::from_name("ColorMap");
    pub const NUMBER_OF_MULTISAMPLES: PropertyId =
        PropertyId::from_name("NumberOfMultisamples");
    pub const VERTICAL_BLUR: PropertyId = PropertyId::from_name("VerticalBlur");
}

/// Well-known ids for the dynamic textures the texture resource manager
/// creates by code. Content can reference these paths before any package
/// is mounted and always resolve to a valid texture.
pub mod dynamic {
    use super::AssetId;

    macro_rules! dynamic_id {
        ($name:ident, $path:literal) => {
            pub const $name: AssetId =
                AssetId::from_path(concat!("Ember/Texture/DynamicByCode/", $path));
        };
    }

    dynamic_id!(WHITE_MAP_1D, "WhiteMap1D");
    dynamic_id!(WHITE_MAP_2D, "WhiteMap2D");
    dynamic_id!(WHITE_MAP_CUBE, "WhiteMapCube");
    dynamic_id!(WHITE_MAP_3D, "WhiteMap3D");
    dynamic_id!(BLACK_MAP_1D, "BlackMap1D");
    dynamic_id!(BLACK_MAP_2D, "BlackMap2D");
    dynamic_id!(BLACK_MAP_CUBE, "BlackMapCube");
    dynamic_id!(BLACK_MAP_3D, "BlackMap3D");
    dynamic_id!(IDENTITY_ALBEDO_MAP_2D, "IdentityAlbedoMap2D");
    dynamic_id!(IDENTITY_ALPHA_MAP_2D, "IdentityAlphaMap2D");
    dynamic_id!(IDENTITY_NORMAL_MAP_2D, "IdentityNormalMap2D");
    dynamic_id!(IDENTITY_ROUGHNESS_MAP_2D, "IdentityRoughnessMap2D");
    dynamic_id!(DIELECTRIC_METALLIC_MAP_2D, "DielectricMetallicMap2D");
    dynamic_id!(IDENTITY_EMISSIVE_MAP_2D, "IdentityEmissiveMap2D");
    dynamic_id!(IDENTITY_ARGB_NXA_2D, "Identity_argb_nxa2D");
    dynamic_id!(IDENTITY_HR_RG_MB_NYA_2D, "Identity_hr_rg_mb_nya2D");

    // Shadow pass render targets, registered so materials and dependent
    // passes can bind them by name.
    dynamic_id!(SHADOW_DEPTH_MAP, "ShadowDepthMap");
    dynamic_id!(SHADOW_VARIANCE_MAP, "ShadowVarianceMap");
    dynamic_id!(SHADOW_INTERMEDIATE_MAP, "ShadowIntermediateMap");
}

// ============================================================================
// Asset Provider
// ============================================================================

/// Read access to asset bytes by id.
///
/// Implementations must be callable from the streamer's worker threads.
pub trait AssetProvider: Send + Sync {
    /// The virtual filename the id was hashed from, if known. Used for
    /// loader-kind auto-detection by extension.
    fn virtual_filename(&self, id: AssetId) -> Option<String>;

    /// Size in bytes, if cheaply available. Loaders use this to pre-size
    /// scratch buffers before reading several files.
    fn size(&self, id: AssetId) -> Option<u64>;

    /// Reads the full asset content.
    fn read(&self, id: AssetId) -> Result<Vec<u8>>;

    /// Reads the full asset content into `buf`, reusing its capacity.
    fn read_into(&self, id: AssetId, buf: &mut Vec<u8>) -> Result<()> {
        let bytes = self.read(id)?;
        buf.clear();
        buf.extend_from_slice(&bytes);
        Ok(())
    }
}

/// In-memory asset provider keyed by virtual path.
#[derive(Default)]
pub struct MemoryAssetProvider {
    entries: RwLock<FxHashMap<AssetId, MemoryAsset>>,
}

struct MemoryAsset {
    filename: String,
    bytes: Vec<u8>,
}

impl MemoryAssetProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` under `path` and returns the hashed id.
    pub fn insert(&self, path: &str, bytes: Vec<u8>) -> AssetId {
        let id = AssetId::from_path(path);
        self.entries.write().insert(
            id,
            MemoryAsset {
                filename: path.to_string(),
                bytes,
            },
        );
        id
    }
}

impl AssetProvider for MemoryAssetProvider {
    fn virtual_filename(&self, id: AssetId) -> Option<String> {
        self.entries.read().get(&id).map(|a| a.filename.clone())
    }

    fn size(&self, id: AssetId) -> Option<u64> {
        self.entries.read().get(&id).map(|a| a.bytes.len() as u64)
    }

    fn read(&self, id: AssetId) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(&id)
            .map(|a| a.bytes.clone())
            .ok_or(EngineError::AssetNotFound(id))
    }
}
