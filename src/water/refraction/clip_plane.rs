use bevy::prelude::*;

/// Plane `normal . p + constant = 0`. Points with a positive distance are
/// kept by the refraction view that uses it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipPlane {
    pub normal: Vec3,
    pub constant: f32,
}

impl ClipPlane {
    /// Plane through the surface's origin, perpendicular to its local up.
    ///
    /// With `inverse == false` the normal points down and the view keeps
    /// what is under the water. `inverse == true` keeps what is above.
    pub fn from_surface(world_from_local: &GlobalTransform, inverse: bool) -> Self {
        let (_, rotation, translation) = world_from_local.to_scale_rotation_translation();
        let mut normal = (rotation * Vec3::Y).normalize_or(Vec3::Y);
        if !inverse {
            normal = -normal;
        }
        Self {
            normal,
            constant: -normal.dot(translation),
        }
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.constant
    }

    pub fn to_vec4(&self) -> Vec4 {
        self.normal.extend(self.constant)
    }

    /// The same plane in view space. Planes transform with the inverse
    /// transpose, and the inverse of `view_from_world` is the camera's
    /// world transform.
    pub fn to_view(&self, world_from_view: &Mat4) -> Vec4 {
        world_from_view.transpose() * self.to_vec4()
    }
}
