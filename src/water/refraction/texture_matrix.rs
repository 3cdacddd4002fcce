use bevy::prelude::*;

/// NDC to texture space. wgpu textures have v pointing down, hence the
/// negative y scale.
pub const TEXTURE_BIAS: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, -0.5, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.5, 0.5, 0.0, 1.0,
]);

/// Maps a point in the surface's local space to the refraction texture.
/// Divide `xy` by `w` in the shader.
pub fn texture_matrix(clip_from_view: Mat4, view_from_world: Mat4, world_from_local: Mat4) -> Mat4 {
    TEXTURE_BIAS * clip_from_view * view_from_world * world_from_local
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::camera::CameraProjection;

    fn project(matrix: &Mat4, point: Vec3) -> Vec2 {
        let clip = *matrix * point.extend(1.0);
        clip.xy() / clip.w
    }

    #[test]
    fn test_bias_maps_ndc_corners() {
        assert_eq!(project(&TEXTURE_BIAS, Vec3::new(-1.0, 1.0, 0.0)), Vec2::ZERO);
        assert_eq!(project(&TEXTURE_BIAS, Vec3::new(1.0, -1.0, 0.0)), Vec2::ONE);
        assert_eq!(project(&TEXTURE_BIAS, Vec3::ZERO), Vec2::splat(0.5));
    }

    #[test]
    fn test_look_target_lands_in_texture_center() {
        let projection = PerspectiveProjection {
            aspect_ratio: 16.0 / 9.0,
            ..default()
        };
        let camera = Transform::from_xyz(-10.26, 2.92, -2.86).looking_at(Vec3::ZERO, Vec3::Y);
        let surface = Transform::from_xyz(0.0, 0.0, 0.0).with_scale(Vec3::splat(6.6));
        let matrix = texture_matrix(
            projection.get_clip_from_view(),
            camera.compute_matrix().inverse(),
            surface.compute_matrix(),
        );
        let uv = project(&matrix, Vec3::ZERO);
        assert!((uv - Vec2::splat(0.5)).length() < 1e-5, "uv {uv}");
    }

    #[test]
    fn test_right_and_up_map_to_texture_axes() {
        let projection = PerspectiveProjection::default();
        let camera = Transform::from_xyz(0.0, 0.0, 5.0);
        let matrix = texture_matrix(
            projection.get_clip_from_view(),
            camera.compute_matrix().inverse(),
            Mat4::IDENTITY,
        );
        let right = project(&matrix, Vec3::new(1.0, 0.0, 0.0));
        let up = project(&matrix, Vec3::new(0.0, 1.0, 0.0));
        assert!(right.x > 0.5);
        assert!(up.y < 0.5, "up in the world is towards v = 0");
    }
}
