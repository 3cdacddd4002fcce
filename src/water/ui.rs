use bevy::prelude::*;
use bevy_egui::{EguiContexts, EguiPrimaryContextPass, egui};

use super::capture::{CaptureKind, CaptureQueue, request_capture};
use super::caustics::CausticsTarget;
use super::config::WaterConfig;
use super::level::WaterLevel;
use super::pipeline_status::SimulationStatus;
use super::simulation::{Disturbance, HeightFieldTextures, disturbance::AddDisturbance};

/// Whether egui had the pointer last frame. Cursor drops skip those frames.
#[derive(Resource, Default)]
pub struct WaterUiState {
    pub pointer_over_ui: bool,
}

pub struct WaterUiPlugin;

impl Plugin for WaterUiPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WaterUiState>()
            .add_systems(EguiPrimaryContextPass, water_ui_system);
    }
}

#[allow(clippy::too_many_arguments)]
fn water_ui_system(
    mut contexts: EguiContexts,
    mut config: ResMut<WaterConfig>,
    mut ui_state: ResMut<WaterUiState>,
    level: Res<WaterLevel>,
    status: Res<SimulationStatus>,
    textures: Res<HeightFieldTextures>,
    caustics: Res<CausticsTarget>,
    mut captures: ResMut<CaptureQueue>,
    mut disturbances: EventWriter<AddDisturbance>,
) -> Result {
    let ctx = contexts.ctx_mut()?;

    egui::Window::new("Water Controls")
        .default_width(300.0)
        .show(ctx, |ui| {
            ui.heading("Level");
            ui.checkbox(&mut config.level_paused, "Pause level");
            ui.add(
                egui::Slider::new(&mut config.level_speed, 0.0..=1.0)
                    .text("Level speed")
                    .step_by(0.005),
            );

            ui.separator();
            ui.heading("Drops");
            ui.checkbox(&mut config.ambient_drops, "Ambient drops");
            ui.checkbox(
                &mut config.ambient_sign_follows_level,
                "Ambient sign follows level",
            );
            ui.add(
                egui::Slider::new(&mut config.ambient_interval, 1..=240)
                    .text("Ambient interval (frames)"),
            );
            ui.checkbox(&mut config.cursor_drops, "Cursor drops");
            ui.add(
                egui::Slider::new(&mut config.cursor_radius, 0.005..=0.1)
                    .text("Cursor radius")
                    .step_by(0.001),
            );
            ui.add(
                egui::Slider::new(&mut config.cursor_strength, -0.1..=0.1)
                    .text("Cursor strength")
                    .step_by(0.001),
            );
            if ui.button("Drop at center").clicked() {
                disturbances.write(AddDisturbance(Disturbance::new(
                    0.0,
                    0.0,
                    config.cursor_radius,
                    config.cursor_strength,
                )));
            }

            ui.separator();
            ui.heading("Capture");
            ui.horizontal(|ui| {
                for (label, kind) in [
                    ("Capture height field", CaptureKind::HeightField),
                    ("Capture caustics", CaptureKind::Caustics),
                ] {
                    let busy = captures.is_pending(kind);
                    if ui.add_enabled(!busy, egui::Button::new(label)).clicked() {
                        request_capture(&mut captures, kind, &textures, &caustics);
                    }
                }
            });

            ui.separator();
            ui.collapsing("Debug Info", |ui| {
                ui.label(format!("Simulation: {:?}", *status));
                ui.label(format!("biasHeight: {:.3}", level.bias_height));
                ui.label(format!(
                    "Active radius k: {:.3}",
                    level.simulation_scale(&config)
                ));
                ui.label(format!("Current slot: {}", textures.slots.current_index()));
            });
        });

    ui_state.pointer_over_ui = ctx.wants_pointer_input() || ctx.is_pointer_over_area();
    Ok(())
}
