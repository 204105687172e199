//! Shadow Algorithm Tests
//!
//! Tests for:
//! - Cascade split computation (log/uniform blend)
//! - Frustum corner extraction from an inverted view-projection
//! - Cascade matrix construction and UV containment
//! - Cascade >0 scale/offset remapping against cascade 0 (round-trip law)
//! - Texel-snap stabilization

use glam::{Mat4, Vec3, Vec4};

use ember::compositor::passes::shadow_math::*;

const EPSILON: f32 = 1e-3;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn make_view_projection(near: f32, far: f32) -> Mat4 {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    let projection = Mat4::perspective_rh(60f32.to_radians(), 1.0, near, far);
    projection * view
}

// ============================================================================
// compute_cascade_splits Tests
// ============================================================================

#[test]
fn cascade_splits_last_equals_far() {
    let splits = compute_cascade_splits(4, 0.1, 100.0, 0.99);
    assert!(
        approx(splits[3], 100.0),
        "Last split should equal the far plane, got {}",
        splits[3]
    );
}

#[test]
fn cascade_splits_monotonically_increasing() {
    let splits = compute_cascade_splits(4, 0.1, 100.0, 0.99);
    for i in 1..4 {
        assert!(
            splits[i] > splits[i - 1],
            "splits[{}]={} <= splits[{}]={}",
            i,
            splits[i],
            i - 1,
            splits[i - 1]
        );
    }
}

#[test]
fn cascade_splits_lambda_zero_is_uniform() {
    let splits = compute_cascade_splits(4, 1.0, 100.0, 0.0);
    let expected = [25.75, 50.5, 75.25, 100.0];
    for i in 0..4 {
        assert!(
            approx(splits[i], expected[i]),
            "splits[{i}]: expected {}, got {}",
            expected[i],
            splits[i]
        );
    }
}

#[test]
fn cascade_splits_lambda_one_is_logarithmic() {
    let splits = compute_cascade_splits(4, 1.0, 100.0, 1.0);
    assert!((splits[0] - 3.162).abs() < 0.01, "got {}", splits[0]);
    assert!(approx(splits[1], 10.0), "got {}", splits[1]);
    assert!((splits[2] - 31.62).abs() < 0.1, "got {}", splits[2]);
    assert!(approx(splits[3], 100.0), "got {}", splits[3]);
}

#[test]
fn cascade_splits_single_cascade_covers_range() {
    let splits = compute_cascade_splits(1, 0.1, 50.0, 0.5);
    assert!(approx(splits[0], 50.0), "got {}", splits[0]);
}

#[test]
fn cascade_splits_count_clamped_to_max() {
    let splits = compute_cascade_splits(10, 0.1, 100.0, 0.5);
    assert!(approx(splits[3], 100.0), "got {}", splits[3]);
}

// ============================================================================
// frustum_corners_world Tests
// ============================================================================

#[test]
fn frustum_corners_near_face_first() {
    let vp = make_view_projection(0.5, 50.0);
    let corners = frustum_corners_world(vp, true);

    // Near-face corners sit closer to the camera than far-face corners.
    let camera = Vec3::new(0.0, 2.0, 5.0);
    for i in 0..4 {
        assert!(
            corners[i].distance(camera) < corners[i + 4].distance(camera),
            "corner {i} should be nearer than corner {}",
            i + 4
        );
    }
}

#[test]
fn frustum_corners_project_back_to_clip_cube() {
    let vp = make_view_projection(0.5, 50.0);
    let corners = frustum_corners_world(vp, true);

    for (i, corner) in corners.iter().enumerate() {
        let clip = vp * Vec4::new(corner.x, corner.y, corner.z, 1.0);
        let ndc = clip / clip.w;
        assert!(
            ndc.x.abs() <= 1.0 + EPSILON && ndc.y.abs() <= 1.0 + EPSILON,
            "corner {i} should project back to the clip cube, got {ndc:?}"
        );
        assert!(
            (-EPSILON..=1.0 + EPSILON).contains(&ndc.z),
            "corner {i} ndc z out of range: {}",
            ndc.z
        );
    }
}

#[test]
fn frustum_corners_gl_depth_range() {
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    let projection = Mat4::perspective_rh_gl(60f32.to_radians(), 1.0, 1.0, 10.0);
    let corners = frustum_corners_world(projection * view, false);

    for i in 0..4 {
        assert!(
            approx(corners[i].z, -1.0),
            "near corner {i} should sit at z=-1, got {}",
            corners[i].z
        );
    }
    for i in 4..8 {
        assert!(
            (corners[i].z + 10.0).abs() < 0.05,
            "far corner {i} should sit at z=-10, got {}",
            corners[i].z
        );
    }
}

#[test]
fn slice_frustum_corners_interpolates_edges() {
    let near = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE];
    let far = [
        Vec3::new(0.0, 0.0, -10.0),
        Vec3::new(1.0, 0.0, -10.0),
        Vec3::new(0.0, 1.0, -10.0),
        Vec3::new(1.0, 1.0, -10.0),
    ];
    let mut corners = [Vec3::ZERO; 8];
    corners[..4].copy_from_slice(&near);
    corners[4..].copy_from_slice(&far);

    let sliced = slice_frustum_corners(&corners, 0.25, 0.75);
    for i in 0..4 {
        assert!(approx(sliced[i].z, near[i].z + (far[i].z - near[i].z) * 0.25));
        assert!(approx(sliced[i + 4].z, near[i].z + (far[i].z - near[i].z) * 0.75));
    }
}

// ============================================================================
// Cascade Matrix Tests
// ============================================================================

fn build_test_cascade(
    corners: &[Vec3; 8],
    previous_fraction: f32,
    fraction: f32,
    up: Vec3,
    light_direction: Vec3,
) -> Mat4 {
    let sliced = slice_frustum_corners(corners, previous_fraction, fraction);
    let (light_view, mut extents) = light_space_extents(&sliced, light_direction, up);
    pad_extents_for_filtering(&mut extents, 8.0, 1024);
    build_cascade_view_projection(light_view, &extents, 50.0, true)
}

#[test]
fn cascade_matrix_is_invertible() {
    let vp = make_view_projection(0.1, 100.0);
    let corners = frustum_corners_world(vp, true);
    let light_direction = Vec3::new(0.3, -1.0, 0.2).normalize();
    let up = light_up_vector(light_direction, None);

    let cascade_vp = build_test_cascade(&corners, 0.0, 0.25, up, light_direction);
    assert!(
        cascade_vp.determinant().abs() > 1e-10,
        "cascade VP should be invertible"
    );
}

#[test]
fn cascade_zero_uv_containment() {
    // The cascade's own slice corners must land inside [0,1]^3 of its
    // shadow-UV space.
    let vp = make_view_projection(0.1, 100.0);
    let corners = frustum_corners_world(vp, true);
    let light_direction = Vec3::new(0.2, -1.0, 0.1).normalize();
    let up = light_up_vector(light_direction, None);

    let sliced = slice_frustum_corners(&corners, 0.0, 0.25);
    let (light_view, mut extents) = light_space_extents(&sliced, light_direction, up);
    pad_extents_for_filtering(&mut extents, 8.0, 1024);
    let cascade_vp = build_cascade_view_projection(light_view, &extents, 50.0, true);
    let shadow_matrix = clip_to_uv_matrix(true, true) * cascade_vp;

    for (i, corner) in sliced.iter().enumerate() {
        let uv = shadow_matrix.project_point3(*corner);
        assert!(
            (-EPSILON..=1.0 + EPSILON).contains(&uv.x)
                && (-EPSILON..=1.0 + EPSILON).contains(&uv.y)
                && (-EPSILON..=1.0 + EPSILON).contains(&uv.z),
            "slice corner {i} maps outside [0,1]^3: {uv:?}"
        );
    }
}

#[test]
fn cascade_uv_remap_round_trip() {
    // Cascade i's own corners, pushed through cascade 0's matrix and the
    // derived scale/offset, must land back in cascade i's [0,1]^3.
    let vp = make_view_projection(0.1, 100.0);
    let corners = frustum_corners_world(vp, true);
    let light_direction = Vec3::new(0.25, -0.9, 0.3).normalize();
    let up = light_up_vector(light_direction, None);
    let uv_from_clip = clip_to_uv_matrix(true, true);

    let cascade0 = uv_from_clip * build_test_cascade(&corners, 0.0, 0.2, up, light_direction);
    let cascade2 = uv_from_clip * build_test_cascade(&corners, 0.5, 0.8, up, light_direction);
    let (scale, offset) = cascade_uv_remap(cascade0, cascade2);

    let sliced = slice_frustum_corners(&corners, 0.5, 0.8);
    for (i, corner) in sliced.iter().enumerate() {
        let direct = cascade2.project_point3(*corner);
        let via_cascade0 = (cascade0.project_point3(*corner) - offset) / scale;
        assert!(
            direct.distance(via_cascade0) < 1e-2,
            "corner {i}: direct {direct:?} vs remapped {via_cascade0:?}"
        );
        assert!(
            (-0.01..=1.01).contains(&via_cascade0.x) && (-0.01..=1.01).contains(&via_cascade0.y),
            "corner {i} reconstructs outside the unit square: {via_cascade0:?}"
        );
    }
}

#[test]
fn stabilized_cascade_origin_lands_on_texel_grid() {
    let vp = make_view_projection(0.1, 100.0);
    let corners = frustum_corners_world(vp, true);
    let light_direction = Vec3::new(0.1, -1.0, 0.0).normalize();
    let up = light_up_vector(light_direction, None);

    let resolution = 2048u32;
    let cascade_vp = build_test_cascade(&corners, 0.0, 0.3, up, light_direction);
    let stabilized = stabilize_cascade(cascade_vp, resolution);

    let origin = stabilized * Vec4::new(0.0, 0.0, 0.0, 1.0);
    let texel = Vec3::new(origin.x, origin.y, 0.0) * (resolution as f32 / 2.0);
    // Matrix round-trips cost a little precision at texel scale.
    assert!(
        (texel.x - texel.x.round()).abs() < 1e-2 && (texel.y - texel.y.round()).abs() < 1e-2,
        "projected origin should sit on the texel grid, got {texel:?}"
    );
}

#[test]
fn stabilization_preserves_depth() {
    let vp = make_view_projection(0.1, 100.0);
    let corners = frustum_corners_world(vp, true);
    let light_direction = Vec3::new(0.0, -1.0, 0.1).normalize();
    let up = light_up_vector(light_direction, None);

    let cascade_vp = build_test_cascade(&corners, 0.0, 0.3, up, light_direction);
    let stabilized = stabilize_cascade(cascade_vp, 1024);

    let probe = Vec3::new(1.0, 2.0, 3.0);
    let before = cascade_vp.project_point3(probe);
    let after = stabilized.project_point3(probe);
    assert!(
        approx(before.z, after.z),
        "stabilization must only offset XY, depth {} became {}",
        before.z,
        after.z
    );
}

// ============================================================================
// light_up_vector Tests
// ============================================================================

#[test]
fn light_up_vector_fixed_axis_for_stabilized_mode() {
    let up = light_up_vector(Vec3::new(0.2, -1.0, 0.1).normalize(), None);
    assert!(up.length() > 0.9);

    // Near-vertical light falls back to the X axis.
    let up_vertical = light_up_vector(Vec3::NEG_Y, None);
    assert_eq!(up_vertical, Vec3::X);
}

#[test]
fn light_up_vector_follows_camera_right() {
    let light_direction = Vec3::new(0.0, -1.0, 0.0);
    let camera_right = Vec3::X;
    let up = light_up_vector(light_direction, Some(camera_right));
    // up = right × direction, orthogonal to both.
    assert!(up.dot(light_direction).abs() < EPSILON);
    assert!(up.dot(camera_right).abs() < EPSILON);
}

#[test]
fn pad_extents_is_symmetric_in_both_axes() {
    let mut extents = LightSpaceExtents {
        minimum: Vec3::new(-10.0, -20.0, -5.0),
        maximum: Vec3::new(10.0, 20.0, 5.0),
    };
    pad_extents_for_filtering(&mut extents, 8.0, 1024);

    let border_x_low = -10.0 - extents.minimum.x;
    let border_x_high = extents.maximum.x - 10.0;
    let border_y_low = -20.0 - extents.minimum.y;
    let border_y_high = extents.maximum.y - 20.0;
    assert!(approx(border_x_low, border_x_high), "X padding asymmetric");
    assert!(approx(border_y_low, border_y_high), "Y padding asymmetric");
    assert!(border_x_low > 0.0 && border_y_low > 0.0);
    // Y border scales with the Y extent, not the X extent.
    assert!(approx(border_y_low, border_x_low * 2.0));
}
