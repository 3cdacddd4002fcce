mod scene;
mod water;

use bevy::prelude::*;
use bevy_blendy_cameras::BlendyCamerasPlugin;
use bevy_inspector_egui::bevy_egui::EguiPlugin;
use bevy_inspector_egui::quick::WorldInspectorPlugin;
use scene::ScenePlugin;
use water::WaterPlugin;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Water Globe".into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin { enable_multipass_for_primary_context: true, ..Default::default() })
        .add_plugins(WorldInspectorPlugin::new())
        .add_plugins(BlendyCamerasPlugin)
        .add_plugins(WaterPlugin::default())
        .add_plugins(ScenePlugin)
        .run();
}
