//! Material Resources & Blueprints
//!
//! Two material-shaped things live here:
//!
//! - [`MaterialResource`]: the gameplay-facing material a renderable
//!   attaches to. It carries the three values renderables cache at attach
//!   time (render-queue index, cast-shadows, uses-alpha-map) and the dense
//!   list of currently attached renderables.
//! - [`MaterialBlueprint`]: a pipeline recipe (WGSL source plus binding
//!   layout) the compositor's compute/fullscreen sub-passes instantiate.
//!   Blueprint compilation and authoring live outside the core; the
//!   [`MaterialBlueprintLibrary`] is the lookup seam.

use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::asset::{AssetId, PropertyId};
use crate::rhi::{BindingKind, PipelineKind};

new_key_type! {
    /// Generation-checked handle into the material resource pool.
    pub struct MaterialResourceId;
}

/// Key type for renderables; defined here to avoid a circular module
/// dependency (the attachment list stores these).
new_key_type! {
    pub struct RenderableKey;
}

/// Gameplay-facing material resource.
pub struct MaterialResource {
    asset_id: AssetId,
    render_queue_index: u8,
    cast_shadows: bool,
    uses_alpha_map: bool,
    /// Dense attachment list; detach is swap-remove with back-index
    /// fix-up, so order is not preserved.
    pub(crate) attached_renderables: Vec<RenderableKey>,
}

impl MaterialResource {
    #[must_use]
    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    #[must_use]
    pub fn render_queue_index(&self) -> u8 {
        self.render_queue_index
    }

    #[must_use]
    pub fn cast_shadows(&self) -> bool {
        self.cast_shadows
    }

    #[must_use]
    pub fn uses_alpha_map(&self) -> bool {
        self.uses_alpha_map
    }

    #[must_use]
    pub fn attached_renderables(&self) -> &[RenderableKey] {
        &self.attached_renderables
    }
}

/// Pool owner for material resources.
#[derive(Default)]
pub struct MaterialResourceManager {
    pool: SlotMap<MaterialResourceId, MaterialResource>,
    lookup: FxHashMap<AssetId, MaterialResourceId>,
}

impl MaterialResourceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_material(
        &mut self,
        asset_id: AssetId,
        render_queue_index: u8,
        cast_shadows: bool,
        uses_alpha_map: bool,
    ) -> MaterialResourceId {
        let id = self.pool.insert(MaterialResource {
            asset_id,
            render_queue_index,
            cast_shadows,
            uses_alpha_map,
            attached_renderables: Vec::new(),
        });
        self.lookup.insert(asset_id, id);
        id
    }

    #[must_use]
    pub fn get(&self, id: MaterialResourceId) -> Option<&MaterialResource> {
        self.pool.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: MaterialResourceId) -> Option<&mut MaterialResource> {
        self.pool.get_mut(id)
    }

    #[must_use]
    pub fn id_by_asset_id(&self, asset_id: AssetId) -> Option<MaterialResourceId> {
        self.lookup.get(&asset_id).copied()
    }

    /// Incremental update path: mutates a material property and pushes
    /// the new value into every attached renderable's cache. This is the
    /// only way attach-time caches are refreshed after the fact.
    pub fn set_render_queue_index(
        &mut self,
        id: MaterialResourceId,
        value: u8,
        renderables: &mut crate::renderable::RenderableManager,
    ) {
        let Some(material) = self.pool.get_mut(id) else {
            debug_assert!(false, "stale material id");
            return;
        };
        material.render_queue_index = value;
        for &key in &material.attached_renderables {
            renderables.refresh_material_caches(
                key,
                material.render_queue_index,
                material.cast_shadows,
                material.uses_alpha_map,
            );
        }
    }

    /// Incremental update path for the cast-shadows flag.
    pub fn set_cast_shadows(
        &mut self,
        id: MaterialResourceId,
        value: bool,
        renderables: &mut crate::renderable::RenderableManager,
    ) {
        let Some(material) = self.pool.get_mut(id) else {
            debug_assert!(false, "stale material id");
            return;
        };
        material.cast_shadows = value;
        for &key in &material.attached_renderables {
            renderables.refresh_material_caches(
                key,
                material.render_queue_index,
                material.cast_shadows,
                material.uses_alpha_map,
            );
        }
    }
}

// ============================================================================
// Blueprints
// ============================================================================

/// A value assignable to a blueprint property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Integer(i32),
    Float(f32),
    Boolean(bool),
    /// References a texture resource by asset id.
    Texture(AssetId),
}

/// Small ordered property set, keyed by hashed name.
#[derive(Debug, Clone, Default)]
pub struct MaterialProperties {
    entries: SmallVec<[(PropertyId, PropertyValue); 8]>,
}

impl MaterialProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: PropertyId, value: PropertyValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn get(&self, key: PropertyId) -> Option<PropertyValue> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }

    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, PropertyValue)> + '_ {
        self.entries.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pipeline recipe referenced by compositor passes.
#[derive(Debug, Clone)]
pub struct MaterialBlueprint {
    pub label: String,
    /// WGSL with `//:` define lines substituted from properties at
    /// pipeline build time.
    pub source: String,
    pub kind: PipelineKind,
    pub bindings: Vec<BindingKind>,
}

/// Lookup seam between compositor passes and blueprint authoring.
#[derive(Default)]
pub struct MaterialBlueprintLibrary {
    blueprints: FxHashMap<AssetId, Arc<MaterialBlueprint>>,
}

impl MaterialBlueprintLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, asset_id: AssetId, blueprint: MaterialBlueprint) {
        self.blueprints.insert(asset_id, Arc::new(blueprint));
    }

    #[must_use]
    pub fn get(&self, asset_id: AssetId) -> Option<Arc<MaterialBlueprint>> {
        self.blueprints.get(&asset_id).cloned()
    }
}
