use bevy::{
    math::Vec3A,
    prelude::*,
    render::camera::{CameraProjection, SubCameraView},
};

use super::clip_plane::ClipPlane;

const EPSILON: f32 = 1e-6;

/// Rewrites the depth row of a reverse-Z perspective projection so the near
/// plane (depth 1) lies on `plane`.
///
/// Points with `plane.distance(p) + clip_bias >= 0` stay in front of the new
/// near plane. The scale `a` is picked so every kept point within `far` of
/// the camera still lands at depth `>= 0`. When the plane is entirely
/// behind the frustum `a` falls back to 1.
pub fn oblique_clip_from_view(
    source: &PerspectiveProjection,
    world_from_view: &Mat4,
    plane: &ClipPlane,
    clip_bias: f32,
) -> Mat4 {
    let clip_from_view = source.get_clip_from_view();
    let mut clip = plane.to_view(world_from_view);
    clip.w += clip_bias;

    let normal = clip.truncate();
    let tan_half = (source.fov * 0.5).tan();
    // Kept points closest to the depth = 0 limit sit at the near distance
    // when the camera is on the kept side, at the far distance otherwise.
    let distance = if clip.w > 0.0 {
        source.near
    } else {
        source.far
    };

    let mut steepest = f32::MIN;
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            let direction = Vec3::new(sx * tan_half * source.aspect_ratio, sy * tan_half, -1.0);
            steepest = steepest.max(normal.dot(direction) + clip.w / distance);
        }
    }
    let scale = if steepest > EPSILON {
        1.0 / steepest
    } else {
        1.0
    };

    let mut rows = clip_from_view.transpose();
    rows.z_axis = rows.w_axis - scale * clip;
    rows.transpose()
}

/// Projection of a refraction view. Holds an owned copy of the real
/// camera's perspective plus the oblique matrix derived from it this frame.
#[derive(Clone, Debug)]
pub struct ObliqueProjection {
    pub source: PerspectiveProjection,
    pub clip_from_view: Mat4,
}

impl ObliqueProjection {
    pub fn new(source: PerspectiveProjection) -> Self {
        Self {
            clip_from_view: source.get_clip_from_view(),
            source,
        }
    }
}

impl Default for ObliqueProjection {
    fn default() -> Self {
        Self::new(PerspectiveProjection::default())
    }
}

impl CameraProjection for ObliqueProjection {
    fn get_clip_from_view(&self) -> Mat4 {
        self.clip_from_view
    }

    fn get_clip_from_view_for_sub(&self, sub_view: &SubCameraView) -> Mat4 {
        self.source.get_clip_from_view_for_sub(sub_view)
    }

    // The aspect ratio is the real camera's, not the target's. The texture
    // matrix projects with the real camera, so both must agree.
    fn update(&mut self, _width: f32, _height: f32) {}

    fn far(&self) -> f32 {
        self.source.far
    }

    fn get_frustum_corners(&self, z_near: f32, z_far: f32) -> [Vec3A; 8] {
        self.source.get_frustum_corners(z_near, z_far)
    }
}
