//! The demo scene around the water: an orbit camera, the glass sphere and
//! a rock sitting half in the water.

pub mod camera;
pub mod enclosure;
pub mod input;

use bevy::prelude::*;

use crate::water::WaterSet;
use crate::water::level::WaterLevel;

/// Needs `WaterPlugin` first. With an invalid water config nothing is spawned.
pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Startup,
            (
                camera::spawn_camera,
                enclosure::spawn_enclosure,
                enclosure::spawn_lights,
            )
                .run_if(resource_exists::<WaterLevel>),
        )
        .add_systems(
            Update,
            input::cursor_drops
                .in_set(WaterSet::Disturb)
                .run_if(resource_exists::<WaterLevel>),
        );
    }
}
