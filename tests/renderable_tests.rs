//! Renderable / Material Attachment Tests
//!
//! Tests for:
//! - Attach/detach symmetry: a renderable appears in its material's
//!   attachment list exactly 0 or 1 times after any call sequence
//! - Swap-remove detach keeps the list dense and back-indices correct
//! - Attach-time caching of material-derived values
//! - Manager aggregates with explicit recomputation

use ember::asset::AssetId;
use ember::material::MaterialResourceManager;
use ember::renderable::RenderableManager;

fn setup() -> (RenderableManager, MaterialResourceManager) {
    (RenderableManager::new(), MaterialResourceManager::new())
}

#[test]
fn attach_appears_exactly_once() {
    let (mut renderables, mut materials) = setup();
    let material = materials.create_material(AssetId::from_path("M/A"), 10, true, false);
    let key = renderables.create_renderable(0..36, None);

    renderables.set_material(key, material, &mut materials).unwrap();
    let attached = materials.get(material).unwrap().attached_renderables();
    assert_eq!(attached.iter().filter(|&&k| k == key).count(), 1);
}

#[test]
fn reattach_to_same_material_does_not_duplicate() {
    let (mut renderables, mut materials) = setup();
    let material = materials.create_material(AssetId::from_path("M/A"), 10, true, false);
    let key = renderables.create_renderable(0..36, None);

    renderables.set_material(key, material, &mut materials).unwrap();
    renderables.set_material(key, material, &mut materials).unwrap();
    let attached = materials.get(material).unwrap().attached_renderables();
    assert_eq!(attached.iter().filter(|&&k| k == key).count(), 1);
    assert_eq!(attached.len(), 1);
}

#[test]
fn detach_middle_keeps_list_dense_with_fixed_up_indices() {
    let (mut renderables, mut materials) = setup();
    let material = materials.create_material(AssetId::from_path("M/A"), 10, true, false);

    let keys: Vec<_> = (0..5)
        .map(|i| renderables.create_renderable(i * 36..(i + 1) * 36, None))
        .collect();
    for &key in &keys {
        renderables.set_material(key, material, &mut materials).unwrap();
    }

    // Detach #2 (index 2 of 5).
    renderables.unset_material(keys[2], &mut materials);

    let attached: Vec<_> = materials
        .get(material)
        .unwrap()
        .attached_renderables()
        .to_vec();
    assert_eq!(attached.len(), 4, "list must stay dense");
    assert!(!attached.contains(&keys[2]), "detached entry still present");
    for &key in keys.iter().filter(|&&k| k != keys[2]) {
        assert_eq!(
            attached.iter().filter(|&&k| k == key).count(),
            1,
            "remaining renderables must appear exactly once"
        );
    }
    assert_eq!(renderables.get(keys[2]).unwrap().material(), None);
}

#[test]
fn detach_then_detach_again_is_a_no_op() {
    let (mut renderables, mut materials) = setup();
    let material = materials.create_material(AssetId::from_path("M/A"), 10, true, false);
    let key = renderables.create_renderable(0..3, None);

    renderables.set_material(key, material, &mut materials).unwrap();
    renderables.unset_material(key, &mut materials);
    renderables.unset_material(key, &mut materials);
    assert!(materials.get(material).unwrap().attached_renderables().is_empty());
}

#[test]
fn attach_swaps_material_atomically() {
    let (mut renderables, mut materials) = setup();
    let material_a = materials.create_material(AssetId::from_path("M/A"), 10, true, false);
    let material_b = materials.create_material(AssetId::from_path("M/B"), 200, false, true);
    let key = renderables.create_renderable(0..3, None);

    renderables.set_material(key, material_a, &mut materials).unwrap();
    renderables.set_material(key, material_b, &mut materials).unwrap();

    assert!(materials.get(material_a).unwrap().attached_renderables().is_empty());
    assert_eq!(
        materials.get(material_b).unwrap().attached_renderables(),
        &[key]
    );

    // Caches snapshot the new material.
    let renderable = renderables.get(key).unwrap();
    assert_eq!(renderable.render_queue_index(), 200);
    assert!(!renderable.casts_shadows());
    assert!(renderable.uses_alpha_map());
}

#[test]
fn destroy_renderable_detaches_first() {
    let (mut renderables, mut materials) = setup();
    let material = materials.create_material(AssetId::from_path("M/A"), 10, true, false);
    let a = renderables.create_renderable(0..3, None);
    let b = renderables.create_renderable(3..6, None);
    renderables.set_material(a, material, &mut materials).unwrap();
    renderables.set_material(b, material, &mut materials).unwrap();

    renderables.destroy_renderable(a, &mut materials).unwrap();
    assert_eq!(
        materials.get(material).unwrap().attached_renderables(),
        &[b]
    );
    assert_eq!(renderables.len(), 1);
}

#[test]
fn incremental_update_refreshes_caches() {
    let (mut renderables, mut materials) = setup();
    let material = materials.create_material(AssetId::from_path("M/A"), 10, false, false);
    let key = renderables.create_renderable(0..3, None);
    renderables.set_material(key, material, &mut materials).unwrap();
    assert!(!renderables.get(key).unwrap().casts_shadows());

    materials.set_cast_shadows(material, true, &mut renderables);
    assert!(renderables.get(key).unwrap().casts_shadows());
}

// ============================================================================
// Aggregate Tests
// ============================================================================

#[test]
fn aggregates_require_explicit_recompute() {
    let (mut renderables, mut materials) = setup();
    let low = materials.create_material(AssetId::from_path("M/Low"), 5, false, false);
    let high = materials.create_material(AssetId::from_path("M/High"), 250, true, false);

    let a = renderables.create_renderable(0..3, None);
    let b = renderables.create_renderable(3..6, None);
    renderables.set_material(a, low, &mut materials).unwrap();
    renderables.set_material(b, high, &mut materials).unwrap();

    assert!(renderables.aggregates_dirty());
    renderables.update_cached_aggregates();
    assert!(!renderables.aggregates_dirty());

    let aggregates = renderables.cached_aggregates();
    assert_eq!(aggregates.minimum_render_queue_index, 5);
    assert_eq!(aggregates.maximum_render_queue_index, 250);
    assert!(aggregates.any_casts_shadows);
}

#[test]
fn aggregates_empty_manager_is_defaulted() {
    let (mut renderables, _materials) = setup();
    renderables.update_cached_aggregates();
    let aggregates = renderables.cached_aggregates();
    assert_eq!(aggregates.minimum_render_queue_index, 0);
    assert_eq!(aggregates.maximum_render_queue_index, 0);
    assert!(!aggregates.any_casts_shadows);
}

#[test]
fn queue_range_query_filters_by_cached_index() {
    let (mut renderables, mut materials) = setup();
    let low = materials.create_material(AssetId::from_path("M/Low"), 5, false, false);
    let high = materials.create_material(AssetId::from_path("M/High"), 250, true, false);

    let a = renderables.create_renderable(0..3, None);
    let b = renderables.create_renderable(3..6, None);
    renderables.set_material(a, low, &mut materials).unwrap();
    renderables.set_material(b, high, &mut materials).unwrap();

    let in_low_range: Vec<_> = renderables.iter_queue_range(0, 100).map(|(k, _)| k).collect();
    assert_eq!(in_low_range, vec![a]);
}
