//! Scene Items
//!
//! The minimal camera/light surface the compositor consumes. Scene
//! management proper (nodes, transforms, culling) is an external
//! collaborator; passes only need the matrices and directions below.

use glam::{Mat4, Vec3};

use crate::material::MaterialResourceManager;
use crate::renderable::RenderableManager;

/// Camera state for one frame.
#[derive(Debug, Clone)]
pub struct CameraItem {
    pub view_matrix: Mat4,
    pub projection_matrix: Mat4,
    pub near: f32,
    pub far: f32,
}

impl CameraItem {
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    /// The camera's world-space right vector (first row of the view
    /// rotation).
    #[must_use]
    pub fn right(&self) -> Vec3 {
        Vec3::new(
            self.view_matrix.x_axis.x,
            self.view_matrix.y_axis.x,
            self.view_matrix.z_axis.x,
        )
        .normalize_or_zero()
    }
}

/// The primary directional light.
#[derive(Debug, Clone)]
pub struct DirectionalLightItem {
    /// World-space direction the light shines along. Callers need not
    /// normalize; consumers re-normalize before use.
    pub direction: Vec3,
}

/// Per-frame scene view handed to the compositor.
pub struct FrameScene<'a> {
    pub camera: &'a CameraItem,
    /// Absent when the scene has no directional light; passes that
    /// require one treat absence as a content error.
    pub light: Option<&'a DirectionalLightItem>,
    pub renderables: &'a RenderableManager,
    pub materials: &'a MaterialResourceManager,
}
