//! Renderables
//!
//! A renderable is one drawable unit: a vertex range plus a weak
//! reference (pooled id) to its material and an optional skeleton. The
//! manager is the arena: it owns the slot pool and an explicit LOD-major
//! ordering, so renderables refer to each other and to materials by
//! generation-checked ids instead of pointers.
//!
//! Attach/detach against a material is atomic (detach old, then attach
//! new) and snapshots three material-derived values into the renderable:
//! render-queue index, cast-shadows and uses-alpha-map. Those caches are
//! refreshed only through the material's incremental update path.

use slotmap::SlotMap;
use std::ops::Range;

use crate::errors::{EngineError, Result};
use crate::material::{MaterialResourceId, MaterialResourceManager, RenderableKey};

const NO_ATTACHMENT: usize = usize::MAX;

/// One drawable unit.
pub struct Renderable {
    draw_range: Range<u32>,
    skeleton_id: Option<u32>,
    material: Option<MaterialResourceId>,
    /// This renderable's index in its material's attachment list; kept
    /// in sync by the swap-remove fix-up on detach.
    attachment_index: usize,
    cached_render_queue_index: u8,
    cached_cast_shadows: bool,
    cached_uses_alpha_map: bool,
}

impl Renderable {
    #[must_use]
    pub fn draw_range(&self) -> Range<u32> {
        self.draw_range.clone()
    }

    #[must_use]
    pub fn skeleton_id(&self) -> Option<u32> {
        self.skeleton_id
    }

    #[must_use]
    pub fn material(&self) -> Option<MaterialResourceId> {
        self.material
    }

    /// Render-queue bucket cached at attach time, 0–255.
    #[must_use]
    pub fn render_queue_index(&self) -> u8 {
        self.cached_render_queue_index
    }

    /// Cast-shadows flag cached at attach time.
    #[must_use]
    pub fn casts_shadows(&self) -> bool {
        self.cached_cast_shadows
    }

    /// Uses-alpha-map flag cached at attach time.
    #[must_use]
    pub fn uses_alpha_map(&self) -> bool {
        self.cached_uses_alpha_map
    }
}

/// Aggregates cached across the manager's renderable sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderableAggregates {
    pub minimum_render_queue_index: u8,
    pub maximum_render_queue_index: u8,
    pub any_casts_shadows: bool,
}

impl Default for RenderableAggregates {
    fn default() -> Self {
        Self {
            minimum_render_queue_index: 0,
            maximum_render_queue_index: 0,
            any_casts_shadows: false,
        }
    }
}

/// Arena and LOD-major ordering for renderables.
///
/// Aggregates are invalidated by structural changes and recomputed only
/// by an explicit [`update_cached_aggregates`](Self::update_cached_aggregates)
/// call; there is no observer machinery.
#[derive(Default)]
pub struct RenderableManager {
    pool: SlotMap<RenderableKey, Renderable>,
    /// LOD-major execution order.
    order: Vec<RenderableKey>,
    aggregates: RenderableAggregates,
    aggregates_dirty: bool,
}

impl RenderableManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    pub fn create_renderable(
        &mut self,
        draw_range: Range<u32>,
        skeleton_id: Option<u32>,
    ) -> RenderableKey {
        let key = self.pool.insert(Renderable {
            draw_range,
            skeleton_id,
            material: None,
            attachment_index: NO_ATTACHMENT,
            cached_render_queue_index: 0,
            cached_cast_shadows: false,
            cached_uses_alpha_map: false,
        });
        self.order.push(key);
        self.aggregates_dirty = true;
        key
    }

    /// Destroys a renderable, detaching it from its material first so
    /// the attachment list stays dense.
    pub fn destroy_renderable(
        &mut self,
        key: RenderableKey,
        materials: &mut MaterialResourceManager,
    ) -> Result<()> {
        if !self.pool.contains_key(key) {
            return Err(EngineError::StaleHandle);
        }
        self.unset_material(key, materials);
        self.pool.remove(key);
        self.order.retain(|&k| k != key);
        self.aggregates_dirty = true;
        Ok(())
    }

    // ── Material attachment ────────────────────────────────────────────────

    /// Attaches `key` to `material_id`, detaching from any previous
    /// material first, and snapshots the material-derived caches.
    pub fn set_material(
        &mut self,
        key: RenderableKey,
        material_id: MaterialResourceId,
        materials: &mut MaterialResourceManager,
    ) -> Result<()> {
        self.unset_material(key, materials);

        let Some(material) = materials.get(material_id) else {
            debug_assert!(false, "attaching to a stale material id");
            return Err(EngineError::StaleHandle);
        };
        let queue_index = material.render_queue_index();
        let cast_shadows = material.cast_shadows();
        let uses_alpha_map = material.uses_alpha_map();

        let renderable = self.pool.get_mut(key).ok_or(EngineError::StaleHandle)?;
        renderable.material = Some(material_id);
        renderable.cached_render_queue_index = queue_index;
        renderable.cached_cast_shadows = cast_shadows;
        renderable.cached_uses_alpha_map = uses_alpha_map;

        let Some(material) = materials.get_mut(material_id) else {
            return Err(EngineError::StaleHandle);
        };
        renderable.attachment_index = material.attached_renderables.len();
        material.attached_renderables.push(key);

        self.aggregates_dirty = true;
        Ok(())
    }

    /// Detaches `key` from its material with a swap-remove, fixing up
    /// the moved entry's cached attachment index.
    pub fn unset_material(&mut self, key: RenderableKey, materials: &mut MaterialResourceManager) {
        let Some(renderable) = self.pool.get_mut(key) else {
            return;
        };
        let Some(material_id) = renderable.material.take() else {
            return;
        };
        let index = renderable.attachment_index;
        renderable.attachment_index = NO_ATTACHMENT;
        renderable.cached_render_queue_index = 0;
        renderable.cached_cast_shadows = false;
        renderable.cached_uses_alpha_map = false;

        let Some(material) = materials.get_mut(material_id) else {
            debug_assert!(false, "renderable attached to a destroyed material");
            return;
        };
        debug_assert_eq!(
            material.attached_renderables.get(index),
            Some(&key),
            "attachment list out of sync"
        );
        material.attached_renderables.swap_remove(index);
        // Order is not preserved; the entry moved into `index` must have
        // its back-index updated.
        if let Some(&moved) = material.attached_renderables.get(index) {
            if let Some(moved_renderable) = self.pool.get_mut(moved) {
                moved_renderable.attachment_index = index;
            }
        }

        self.aggregates_dirty = true;
    }

    /// Cache refresh hook for the material incremental update path.
    pub(crate) fn refresh_material_caches(
        &mut self,
        key: RenderableKey,
        render_queue_index: u8,
        cast_shadows: bool,
        uses_alpha_map: bool,
    ) {
        if let Some(renderable) = self.pool.get_mut(key) {
            renderable.cached_render_queue_index = render_queue_index;
            renderable.cached_cast_shadows = cast_shadows;
            renderable.cached_uses_alpha_map = uses_alpha_map;
            self.aggregates_dirty = true;
        }
    }

    // ── Aggregates ─────────────────────────────────────────────────────────

    /// Recomputes the cached min/max render-queue indices and the
    /// any-casts-shadows flag. The owner calls this after structural
    /// changes; nothing recomputes automatically.
    pub fn update_cached_aggregates(&mut self) {
        let mut aggregates = RenderableAggregates {
            minimum_render_queue_index: u8::MAX,
            maximum_render_queue_index: 0,
            any_casts_shadows: false,
        };
        let mut any = false;
        for &key in &self.order {
            let renderable = &self.pool[key];
            any = true;
            aggregates.minimum_render_queue_index = aggregates
                .minimum_render_queue_index
                .min(renderable.cached_render_queue_index);
            aggregates.maximum_render_queue_index = aggregates
                .maximum_render_queue_index
                .max(renderable.cached_render_queue_index);
            aggregates.any_casts_shadows |= renderable.cached_cast_shadows;
        }
        self.aggregates = if any {
            aggregates
        } else {
            RenderableAggregates::default()
        };
        self.aggregates_dirty = false;
    }

    /// Last recomputed aggregates. Stale after structural changes until
    /// [`update_cached_aggregates`](Self::update_cached_aggregates) runs.
    #[must_use]
    pub fn cached_aggregates(&self) -> RenderableAggregates {
        debug_assert!(
            !self.aggregates_dirty,
            "aggregates read while dirty; call update_cached_aggregates first"
        );
        self.aggregates
    }

    #[must_use]
    pub fn aggregates_dirty(&self) -> bool {
        self.aggregates_dirty
    }

    // ── Queries ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn get(&self, key: RenderableKey) -> Option<&Renderable> {
        self.pool.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Renderables in LOD-major order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (RenderableKey, &Renderable)> + '_ {
        self.order.iter().map(move |&key| (key, &self.pool[key]))
    }

    /// Renderables whose cached queue index falls inside `min..=max`.
    pub fn iter_queue_range(
        &self,
        min: u8,
        max: u8,
    ) -> impl Iterator<Item = (RenderableKey, &Renderable)> + '_ {
        self.iter_ordered().filter(move |(_, r)| {
            r.cached_render_queue_index >= min && r.cached_render_queue_index <= max
        })
    }
}
