//! Water inside a glass sphere: a height-field simulation, the caustics it
//! throws on the sphere wall and a two-sided surface that refracts whatever
//! sits above or below it.

pub mod capture;
pub mod caustics;
pub mod config;
pub mod error;
pub mod level;
pub mod material;
pub mod ping_pong;
pub mod pipeline_status;
pub mod refraction;
pub mod simulation;
pub mod surface;
pub mod ui;

use bevy::{
    prelude::*,
    render::{RenderApp, camera::CameraUpdateSystem},
    transform::TransformSystem,
};

use capture::CapturePlugin;
use caustics::CausticsPlugin;
use config::WaterConfig;
use error::WaterError;
use material::WaterMaterialPlugin;
use refraction::RefractionPlugin;
use simulation::SimulationPlugin;
use surface::SurfacePlugin;
use ui::WaterUiPlugin;

/// Main-world frame order for the water.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum WaterSet {
    Level,
    Disturb,
    Plan,
    Simulate,
}

/// Runs after transforms are final, so refraction views see this frame's
/// camera and surface.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum WaterRenderSet {
    Refraction,
    Materials,
}

/// Fatal water error. The app logs it and exits.
#[derive(Event, Debug)]
pub struct WaterFailure(pub WaterError);

/// Everything water. `with_ui` adds the egui control window, which needs
/// `EguiPlugin` to be present.
pub struct WaterPlugin {
    pub config: WaterConfig,
    pub with_ui: bool,
}

impl Default for WaterPlugin {
    fn default() -> Self {
        Self {
            config: WaterConfig::default(),
            with_ui: true,
        }
    }
}

impl Plugin for WaterPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.config.clone())
            .register_type::<WaterConfig>()
            .add_event::<WaterFailure>()
            .configure_sets(
                PostUpdate,
                (WaterRenderSet::Refraction, WaterRenderSet::Materials)
                    .chain()
                    .after(TransformSystem::TransformPropagate),
            )
            .configure_sets(
                PostUpdate,
                WaterRenderSet::Refraction.before(CameraUpdateSystem),
            )
            .add_systems(Last, exit_on_failure);

        if let Err(error) = self.config.validate() {
            app.world_mut().send_event(WaterFailure(error));
            return;
        }

        app.add_plugins((SimulationPlugin, CausticsPlugin, CapturePlugin));

        // Meshes, materials and cameras only exist with a renderer. Headless
        // apps keep the simulation and the level on the CPU.
        if app.get_sub_app(RenderApp).is_none() {
            return;
        }
        app.add_plugins((SurfacePlugin, RefractionPlugin, WaterMaterialPlugin));

        if self.with_ui {
            app.add_plugins(WaterUiPlugin);
        }
    }
}

fn exit_on_failure(mut failures: EventReader<WaterFailure>, mut exit: EventWriter<AppExit>) {
    let mut failed = false;
    for failure in failures.read() {
        error!("Water failure: {}", failure.0);
        failed = true;
    }
    if failed {
        exit.write(AppExit::error());
    }
}
