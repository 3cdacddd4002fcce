use bevy::{prelude::*, window::PrimaryWindow};

use crate::water::config::WaterConfig;
use crate::water::level::WaterLevel;
use crate::water::refraction::WaterViewer;
use crate::water::simulation::{Disturbance, disturbance::AddDisturbance};
use crate::water::ui::WaterUiState;

/// Where a view ray meets the water, if it meets it inside the sphere's
/// cross-section at the current level.
pub fn surface_hit(ray: Ray3d, config: &WaterConfig, level: &WaterLevel) -> Option<Vec3> {
    let origin = level.surface_translation(config);
    let distance = ray.intersect_plane(origin, InfinitePlane3d::new(Vec3::Y))?;
    let point = ray.get_point(distance);
    let k = level.simulation_scale(config);
    ((point - origin).xz().length() <= k).then_some(point)
}

/// Drops water under the cursor while it moves or while the left button is held.
#[allow(clippy::too_many_arguments)]
pub fn cursor_drops(
    config: Res<WaterConfig>,
    level: Res<WaterLevel>,
    ui_state: Option<Res<WaterUiState>>,
    mut cursor_moved: EventReader<CursorMoved>,
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform), With<WaterViewer>>,
    mut disturbances: EventWriter<AddDisturbance>,
) {
    let moved = cursor_moved.read().count() > 0;
    if !config.cursor_drops || ui_state.is_some_and(|state| state.pointer_over_ui) {
        return;
    }
    if !moved && !buttons.pressed(MouseButton::Left) {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };
    let Ok(ray) = camera.viewport_to_world(camera_transform, cursor) else {
        return;
    };

    if let Some(point) = surface_hit(ray, &config, &level) {
        disturbances.write(AddDisturbance(Disturbance::at_world_point(
            point,
            &config,
            config.cursor_radius,
            config.cursor_strength,
        )));
    }
}
