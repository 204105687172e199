//! Shadow Math
//!
//! Pure functions behind the cascaded shadow map pass, kept free of GPU
//! state for reuse and testability.
//!
//! # Provided Functions
//!
//! - Cascade split computation (log/uniform blend)
//! - View-frustum corner extraction from an inverted view-projection
//! - Light-space extents and orthographic cascade matrices
//! - Texel-snap stabilization
//! - Clip-space to shadow-UV conversion and cascade UV remapping

use glam::{Mat4, Vec3, Vec4};

use crate::compositor::desc::MAXIMUM_NUMBER_OF_SHADOW_CASCADES;

pub const MAX_CASCADES: usize = MAXIMUM_NUMBER_OF_SHADOW_CASCADES as usize;

// ============================================================================
// Cascade Split Computation
// ============================================================================

/// Computes cascade split distances in view space.
///
/// `lambda` blends between uniform (`0.0`) and logarithmic (`1.0`)
/// distribution. Returns the far distance of each cascade; the last
/// entry always reaches `far`.
#[must_use]
pub fn compute_cascade_splits(
    cascade_count: u32,
    near: f32,
    far: f32,
    lambda: f32,
) -> [f32; MAX_CASCADES] {
    let mut splits = [0.0f32; MAX_CASCADES];
    let n = (cascade_count as usize).clamp(1, MAX_CASCADES);
    let lambda = lambda.clamp(0.0, 1.0);

    for (i, split) in splits.iter_mut().enumerate().take(n) {
        let p = (i + 1) as f32 / n as f32;
        let log_split = near * (far / near).powf(p);
        let uniform_split = near + (far - near) * p;
        *split = lambda * log_split + (1.0 - lambda) * uniform_split;
    }
    splits[n - 1] = far;
    splits
}

// ============================================================================
// Frustum Corners
// ============================================================================

/// Computes the camera frustum's 8 corners in world space by pushing the
/// canonical clip-space cube through the inverted view-projection.
///
/// `depth_clip_zero_to_one` selects the backend's near-plane convention
/// (`z = 0` versus `z = -1`). The first four corners are the near face,
/// the last four the far face, in matching winding order.
#[must_use]
pub fn frustum_corners_world(
    view_projection: Mat4,
    depth_clip_zero_to_one: bool,
) -> [Vec3; 8] {
    let inverse = view_projection.inverse();
    let near_z = if depth_clip_zero_to_one { 0.0 } else { -1.0 };

    let mut corners = [Vec3::ZERO; 8];
    let xy = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    for (face, z) in [near_z, 1.0].into_iter().enumerate() {
        for (i, (x, y)) in xy.into_iter().enumerate() {
            let clip = Vec4::new(x, y, z, 1.0);
            let world = inverse * clip;
            corners[face * 4 + i] = world.truncate() / world.w;
        }
    }
    corners
}

/// Slices the frustum to one cascade by lerping each near→far edge
/// between the previous and current split fractions.
#[must_use]
pub fn slice_frustum_corners(
    corners: &[Vec3; 8],
    previous_fraction: f32,
    fraction: f32,
) -> [Vec3; 8] {
    let mut sliced = [Vec3::ZERO; 8];
    for i in 0..4 {
        let near = corners[i];
        let far = corners[i + 4];
        sliced[i] = near.lerp(far, previous_fraction);
        sliced[i + 4] = near.lerp(far, fraction);
    }
    sliced
}

/// Centroid of a corner set.
#[must_use]
pub fn corners_centroid(corners: &[Vec3; 8]) -> Vec3 {
    corners.iter().copied().sum::<Vec3>() / 8.0
}

// ============================================================================
// Cascade Matrices
// ============================================================================

/// Axis-aligned extents of a corner set in some view space.
#[derive(Debug, Clone, Copy)]
pub struct LightSpaceExtents {
    pub minimum: Vec3,
    pub maximum: Vec3,
}

/// Picks the light-facing view's up vector.
///
/// Unstabilized mode (the default) derives it from the camera's current
/// right vector, trading rotation shimmer for a fixed light axis; the
/// stabilized option uses a world axis instead.
#[must_use]
pub fn light_up_vector(light_direction: Vec3, camera_right: Option<Vec3>) -> Vec3 {
    let direction = safe_normalize(light_direction);
    match camera_right {
        Some(right) => {
            let up = right.cross(direction);
            if up.length_squared() > 1e-6 {
                up.normalize()
            } else {
                fixed_up(direction)
            }
        }
        None => fixed_up(direction),
    }
}

fn fixed_up(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 { Vec3::X } else { Vec3::Y }
}

fn safe_normalize(v: Vec3) -> Vec3 {
    if v.length_squared() > 1e-6 {
        v.normalize()
    } else {
        -Vec3::Z
    }
}

/// Builds the light-facing view at the slice centroid and the extents of
/// the slice corners in that space.
#[must_use]
pub fn light_space_extents(
    corners: &[Vec3; 8],
    light_direction: Vec3,
    up: Vec3,
) -> (Mat4, LightSpaceExtents) {
    let direction = safe_normalize(light_direction);
    let center = corners_centroid(corners);
    let view = Mat4::look_at_rh(center - direction, center, up);

    let mut minimum = Vec3::splat(f32::MAX);
    let mut maximum = Vec3::splat(f32::MIN);
    for corner in corners {
        let ls = view.transform_point3(*corner);
        minimum = minimum.min(ls);
        maximum = maximum.max(ls);
    }
    (view, LightSpaceExtents { minimum, maximum })
}

/// Reserves border texels for the blur filter by widening the X and Y
/// extents by a filter-size-relative factor. Applied symmetrically to
/// both axes.
pub fn pad_extents_for_filtering(
    extents: &mut LightSpaceExtents,
    filter_size: f32,
    resolution: u32,
) {
    if resolution == 0 {
        return;
    }
    let factor = filter_size / resolution as f32;
    let border_x = (extents.maximum.x - extents.minimum.x) * factor;
    let border_y = (extents.maximum.y - extents.minimum.y) * factor;
    extents.minimum.x -= border_x;
    extents.maximum.x += border_x;
    extents.minimum.y -= border_y;
    extents.maximum.y += border_y;
}

/// Builds the cascade's orthographic view-projection from the padded
/// light-space extents.
///
/// The Z range is stretched toward the light by `caster_extension` so
/// casters outside the slice still land in the map.
#[must_use]
pub fn build_cascade_view_projection(
    light_view: Mat4,
    extents: &LightSpaceExtents,
    caster_extension: f32,
    depth_clip_zero_to_one: bool,
) -> Mat4 {
    let mut minimum = extents.minimum;
    let mut maximum = extents.maximum;

    // In the RH light view the +z side faces the light.
    let depth_range = (maximum.z - minimum.z).max(1.0);
    maximum.z += caster_extension.max(depth_range);
    minimum.z -= depth_range;

    let projection = if depth_clip_zero_to_one {
        Mat4::orthographic_rh(
            minimum.x, maximum.x, minimum.y, maximum.y, -maximum.z, -minimum.z,
        )
    } else {
        Mat4::orthographic_rh_gl(
            minimum.x, maximum.x, minimum.y, maximum.y, -maximum.z, -minimum.z,
        )
    };
    projection * light_view
}

/// Snaps the cascade's translation to whole shadow-map texels.
///
/// Projects the world origin, rounds it to the texel grid and feeds the
/// fractional remainder back as a projection offset, suppressing
/// sub-texel shimmer while the camera translates.
#[must_use]
pub fn stabilize_cascade(view_projection: Mat4, resolution: u32) -> Mat4 {
    if resolution == 0 {
        return view_projection;
    }
    let half_resolution = resolution as f32 / 2.0;

    let origin = view_projection * Vec4::new(0.0, 0.0, 0.0, 1.0);
    let texel_pos = Vec3::new(origin.x, origin.y, 0.0) * half_resolution;
    let rounded = texel_pos.round();
    let offset = (rounded - texel_pos) / half_resolution;

    Mat4::from_translation(Vec3::new(offset.x, offset.y, 0.0)) * view_projection
}

// ============================================================================
// Shadow UV Conversion
// ============================================================================

/// Clip-space to `[0, 1]` shadow-UV transform honoring the backend's
/// texture-origin and depth-range conventions.
#[must_use]
pub fn clip_to_uv_matrix(depth_clip_zero_to_one: bool, upper_left_texture_origin: bool) -> Mat4 {
    let y_scale = if upper_left_texture_origin { -0.5 } else { 0.5 };
    let (z_scale, z_bias) = if depth_clip_zero_to_one {
        (1.0, 0.0)
    } else {
        (0.5, 0.5)
    };
    Mat4::from_cols(
        Vec4::new(0.5, 0.0, 0.0, 0.0),
        Vec4::new(0.0, y_scale, 0.0, 0.0),
        Vec4::new(0.0, 0.0, z_scale, 0.0),
        Vec4::new(0.5, 0.5, z_bias, 1.0),
    )
}

/// Re-expresses cascade `i`'s UV space relative to cascade 0's.
///
/// Transforms the unit-cube corner and far corner of cascade `i`'s UV
/// space into world space and back through cascade 0's shadow matrix,
/// then solves for the per-axis affine mapping. The lighting shader
/// reconstructs cascade `i` coordinates as `(uv0 - offset) / scale`.
#[must_use]
pub fn cascade_uv_remap(cascade0_matrix: Mat4, cascade_matrix: Mat4) -> (Vec3, Vec3) {
    let inverse = cascade_matrix.inverse();
    let world_origin = inverse.project_point3(Vec3::ZERO);
    let world_far = inverse.project_point3(Vec3::ONE);

    let uv0_origin = cascade0_matrix.project_point3(world_origin);
    let uv0_far = cascade0_matrix.project_point3(world_far);

    let scale = uv0_far - uv0_origin;
    let offset = uv0_origin;
    (scale, offset)
}
