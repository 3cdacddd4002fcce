//! Height-field water simulation.
//!
//! Two `Rgba16Float` textures take turns as source and target. Every frame
//! the main world turns pending drops into a [`SimulationPlan`], which the
//! render world replays as compute passes (`gpu`), or which `height_field`
//! replays on the CPU when the app has no renderer.

pub mod disturbance;
pub mod gpu;
pub mod height_field;
pub mod schedule;

use bevy::{
    prelude::*,
    render::{
        RenderApp,
        extract_resource::{ExtractResource, ExtractResourcePlugin},
        render_asset::RenderAssetUsages,
        render_resource::{Extent3d, TextureDimension, TextureFormat, TextureUsages},
    },
};

use super::config::{WaterConfig, check_extent};
use super::error::WaterError;
use super::level::{WaterLevel, advance_water_level, position_water_surface};
use super::ping_pong::PingPong;
use super::pipeline_status::{PipelineStatusPlugin, SimulationStatus, poll_pipeline_status};
use super::{WaterFailure, WaterSet};
use disturbance::{AddDisturbance, queue_ambient_disturbances};
use height_field::{CpuHeightField, run_plan_on_cpu};
use schedule::{Domain, SimulationPlan};

pub use disturbance::Disturbance;

/// The two simulation textures. `slots.current()` is what materials sample.
#[derive(Resource, Clone, Default, ExtractResource)]
pub struct HeightFieldTextures {
    pub slots: PingPong<Handle<Image>>,
    pub size: u32,
}

impl HeightFieldTextures {
    pub fn current(&self) -> &Handle<Image> {
        self.slots.current()
    }
}

pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WaterConfig>()
            .init_resource::<WaterLevel>()
            .init_resource::<SimulationPlan>()
            .init_resource::<HeightFieldTextures>()
            .init_resource::<SimulationStatus>()
            .register_type::<WaterLevel>()
            .add_event::<AddDisturbance>()
            .add_event::<WaterFailure>()
            .configure_sets(
                Update,
                (
                    WaterSet::Level,
                    WaterSet::Disturb,
                    WaterSet::Plan,
                    WaterSet::Simulate,
                )
                    .chain(),
            )
            .add_systems(Startup, allocate_height_field)
            .add_systems(
                Update,
                (
                    (advance_water_level, position_water_surface)
                        .chain()
                        .in_set(WaterSet::Level),
                    queue_ambient_disturbances.in_set(WaterSet::Disturb),
                    (poll_pipeline_status, plan_simulation_frame)
                        .chain()
                        .in_set(WaterSet::Plan),
                ),
            );

        if app.get_sub_app(RenderApp).is_some() {
            app.add_plugins((
                ExtractResourcePlugin::<SimulationPlan>::default(),
                ExtractResourcePlugin::<HeightFieldTextures>::default(),
                PipelineStatusPlugin,
                gpu::GpuSimulationPlugin,
            ));
        } else {
            // Headless: the CPU kernels stand in for the compute shader.
            let size = app.world().resource::<WaterConfig>().simulation_size as usize;
            app.insert_resource(CpuHeightField::new(size))
                .insert_resource(SimulationStatus::Ready)
                .add_systems(Update, run_plan_on_cpu.in_set(WaterSet::Simulate));
        }
    }
}

/* -------------------------- Texture Allocation ------------------------ */

pub fn create_height_field_image(size: u32) -> Result<Image, WaterError> {
    check_extent("height field", size, size)?;
    let mut image = Image::new_fill(
        Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0; 8],
        TextureFormat::Rgba16Float,
        RenderAssetUsages::RENDER_WORLD,
    );
    image.texture_descriptor.usage = TextureUsages::STORAGE_BINDING
        | TextureUsages::TEXTURE_BINDING
        | TextureUsages::COPY_SRC
        | TextureUsages::COPY_DST;
    Ok(image)
}

fn allocate_height_field(
    config: Res<WaterConfig>,
    images: Option<ResMut<Assets<Image>>>,
    mut textures: ResMut<HeightFieldTextures>,
    mut failures: EventWriter<WaterFailure>,
) {
    let Some(mut images) = images else {
        return;
    };
    let size = config.simulation_size;
    let allocated = create_height_field_image(size)
        .and_then(|first| Ok((first, create_height_field_image(size)?)));
    match allocated {
        Ok((first, second)) => {
            *textures = HeightFieldTextures {
                slots: PingPong::new(images.add(first), images.add(second)),
                size,
            };
            info!("Created height field textures ({}x{}).", size, size);
        }
        Err(error) => {
            failures.write(WaterFailure(error));
        }
    }
}

/* ---------------------------- Frame Planning -------------------------- */

pub fn plan_simulation_frame(
    config: Res<WaterConfig>,
    level: Res<WaterLevel>,
    status: Res<SimulationStatus>,
    mut requests: EventReader<AddDisturbance>,
    mut textures: ResMut<HeightFieldTextures>,
    mut plan: ResMut<SimulationPlan>,
) {
    let disturbances: Vec<Disturbance> = requests.read().map(|request| request.0).collect();

    if !status.is_ready() {
        if !disturbances.is_empty() {
            debug!(
                "Simulation not ready, discarding {} disturbance(s)",
                disturbances.len()
            );
        }
        *plan = SimulationPlan {
            passes: Vec::new(),
            final_slot: textures.slots.current_index(),
        };
        return;
    }

    let domain = Domain {
        active_radius: level.active_radius(&config),
        damping: config.damping,
        texel_delta: config.texel_delta(),
    };
    *plan = SimulationPlan::build(&mut textures.slots, disturbances, domain);
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedule::PassKind;

    fn headless_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins).add_plugins(SimulationPlugin);
        app.insert_resource(WaterConfig {
            ambient_drops: false,
            simulation_size: 64,
            ..default()
        });
        app.insert_resource(CpuHeightField::new(64));
        app
    }

    #[test]
    fn test_headless_frame_runs_drop_then_step_then_normals() {
        let mut app = headless_app();
        app.world_mut()
            .send_event(AddDisturbance(Disturbance::new(0.0, 0.0, 0.1, 0.04)));
        app.update();

        let plan = app.world().resource::<SimulationPlan>();
        let kinds: Vec<_> = plan.passes.iter().map(|p| p.kind).collect();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(kinds[0], PassKind::Drop(_)));
        assert_eq!(kinds[1], PassKind::Propagate);
        assert_eq!(kinds[2], PassKind::Normals);

        let field = app.world().resource::<CpuHeightField>();
        assert_eq!(field.0.current_index(), plan.final_slot);
        assert!(field.0.current().height(32, 32) > 0.0);
    }

    #[test]
    fn test_degenerate_disturbance_is_a_no_op() {
        let mut app = headless_app();
        app.world_mut()
            .send_event(AddDisturbance(Disturbance::new(0.0, 0.0, 0.0, 0.04)));
        app.update();

        let plan = app.world().resource::<SimulationPlan>();
        assert_eq!(plan.passes.len(), 2);
        let field = app.world().resource::<CpuHeightField>();
        assert!(field.0.current().texels().iter().all(|t| t.x == 0.0));
    }

    #[test]
    fn test_textures_follow_plan_slot() {
        let mut app = headless_app();
        for i in 0..3 {
            for _ in 0..i {
                app.world_mut()
                    .send_event(AddDisturbance(Disturbance::new(0.0, 0.0, 0.05, 0.01)));
            }
            app.update();
            let plan = app.world().resource::<SimulationPlan>();
            let textures = app.world().resource::<HeightFieldTextures>();
            assert_eq!(textures.slots.current_index(), plan.final_slot);
        }
    }

    #[test]
    fn test_domain_recovers_after_level_excursion() {
        let mut app = headless_app();
        app.world_mut().resource_mut::<WaterConfig>().level_paused = true;
        let config = app.world().resource::<WaterConfig>().clone();
        let quarter_radius = 0.25_f32.asin() / config.level_speed;

        let steps = 10;
        let mut active = Vec::new();
        for i in (0..=steps).chain((0..steps).rev()) {
            app.world_mut().resource_mut::<WaterLevel>().elapsed =
                quarter_radius * i as f32 / steps as f32;
            app.update();
            let plan = app.world().resource::<SimulationPlan>();
            active.push(plan.passes[0].params.domain.x);
        }

        let peak = (1.0_f32 - 0.0625).sqrt();
        assert!((active[steps] - peak).abs() < 1e-4, "k/R at 0.25R was {}", active[steps]);
        let level = app.world().resource::<WaterLevel>();
        assert!(level.bias_height.abs() < 1e-6);
        assert!((level.simulation_scale(&config) - config.radius).abs() < 1e-5);
        assert!((active[active.len() - 1] - 1.0).abs() < 1e-6);
    }
}
