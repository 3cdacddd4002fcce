use bevy::{prelude::*, render::view::RenderLayers};
use bevy_blendy_cameras::OrbitCameraController;

use crate::water::config::WaterConfig;
use crate::water::refraction::WaterViewer;
use crate::water::surface::{SCENE_LAYER, WATER_LAYER};

pub const CAMERA_POSITION: Vec3 = Vec3::new(-10.26, 2.92, -2.86);

pub fn spawn_camera(mut commands: Commands, config: Res<WaterConfig>) {
    // Starts inside the sphere, looking at the water
    commands.spawn((
        Name::new("Main Camera"),
        Camera3d::default(),
        Projection::from(PerspectiveProjection {
            fov: 75.0_f32.to_radians(),
            near: 0.01,
            far: 120.0,
            ..default()
        }),
        Transform::from_translation(CAMERA_POSITION).looking_at(config.center, Vec3::Y),
        OrbitCameraController {
            focus: config.center,
            ..default()
        },
        WaterViewer,
        RenderLayers::from_layers(&[SCENE_LAYER, WATER_LAYER]),
    ));
}
