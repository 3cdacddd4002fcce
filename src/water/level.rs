use bevy::prelude::*;

use super::config::WaterConfig;

/// Current height of the water inside the sphere.
///
/// `bias_height` is how far the reference plane sits *below* the sphere
/// center. It swings between `-R` and `R`.
#[derive(Resource, Clone, Debug, Default, Reflect)]
#[reflect(Resource)]
pub struct WaterLevel {
    pub elapsed: f32,
    pub bias_height: f32,
}

impl WaterLevel {
    pub fn advance(&mut self, delta: f32, config: &WaterConfig) {
        if !config.level_paused {
            self.elapsed += delta;
        }
        self.bias_height = bias_height_at(self.elapsed, config.level_speed, config.radius);
    }

    /// True while the bias grows, i.e. while the water surface sinks.
    pub fn bias_increasing(&self, config: &WaterConfig) -> bool {
        (self.elapsed * config.level_speed).cos() > 0.0
    }

    pub fn simulation_scale(&self, config: &WaterConfig) -> f32 {
        simulation_scale(config.radius, self.bias_height)
    }

    /// Fraction of the texture's half-width covered by water this frame.
    pub fn active_radius(&self, config: &WaterConfig) -> f32 {
        active_radius(config.radius, self.bias_height)
    }

    pub fn surface_translation(&self, config: &WaterConfig) -> Vec3 {
        config.center - Vec3::Y * self.bias_height
    }
}

pub fn bias_height_at(elapsed: f32, speed: f32, radius: f32) -> f32 {
    (elapsed * speed).sin() * radius
}

/// Radius of the sphere's cross-section at the current water level,
/// `k = sqrt(R² - b²)`. Collapses to zero instead of NaN once `|b| >= R`.
pub fn simulation_scale(radius: f32, bias_height: f32) -> f32 {
    (radius * radius - bias_height * bias_height).max(0.0).sqrt()
}

pub fn active_radius(radius: f32, bias_height: f32) -> f32 {
    if radius <= 0.0 {
        return 0.0;
    }
    simulation_scale(radius, bias_height) / radius
}

/// Marker for the two water mesh entities that follow the level.
#[derive(Component)]
pub struct FollowsWaterLevel;

pub fn advance_water_level(
    time: Res<Time>,
    config: Res<WaterConfig>,
    mut level: ResMut<WaterLevel>,
) {
    level.advance(time.delta_secs(), &config);
}

pub fn position_water_surface(
    config: Res<WaterConfig>,
    level: Res<WaterLevel>,
    mut surfaces: Query<&mut Transform, With<FollowsWaterLevel>>,
) {
    let translation = level.surface_translation(&config);
    for mut transform in surfaces.iter_mut() {
        transform.translation = translation;
        transform.scale = Vec3::splat(config.radius);
    }
}
