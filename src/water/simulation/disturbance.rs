use bevy::prelude::*;
use rand::Rng;

use crate::water::config::WaterConfig;
use crate::water::level::WaterLevel;

/// A radial bump (positive strength) or dip (negative) in the height field.
///
/// `center` is in normalized surface space, `[-1, 1]` on both axes, with
/// `y` running along world Z. `radius` is in texture units, so `0.03`
/// covers about 8 texels of a 256 wide field.
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct Disturbance {
    pub center: Vec2,
    pub radius: f32,
    pub strength: f32,
}

impl Disturbance {
    pub fn new(x: f32, y: f32, radius: f32, strength: f32) -> Self {
        Self {
            center: Vec2::new(x, y),
            radius,
            strength,
        }
    }

    /// A drop with no footprint or with NaN anywhere would either do nothing
    /// or poison the whole field, so it is never scheduled.
    pub fn is_valid(&self) -> bool {
        self.radius > 0.0
            && self.radius.is_finite()
            && self.strength.is_finite()
            && self.center.is_finite()
    }

    /// Maps a world-space point on the water plane into surface space.
    pub fn at_world_point(
        point: Vec3,
        config: &WaterConfig,
        radius: f32,
        strength: f32,
    ) -> Self {
        let local = (point - config.center) / config.radius;
        Self::new(local.x, local.z, radius, strength)
    }
}

/// Asks the simulator to inject a disturbance this frame.
#[derive(Event, Clone, Copy, Debug)]
pub struct AddDisturbance(pub Disturbance);

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from * (1.0 - t) + to * t
}

/// The drop that keeps the surface alive while nobody touches it.
///
/// Drops shrink and weaken as the level moves away from the equator of the
/// sphere and stop entirely near the bottom. They push down while the level
/// sinks and up while it rises, or always up with
/// `ambient_sign_follows_level` off.
pub fn ambient_disturbance(
    level: &WaterLevel,
    config: &WaterConfig,
    rng: &mut impl Rng,
) -> Option<Disturbance> {
    if level.bias_height <= -0.8 * config.radius {
        return None;
    }
    let t = (level.bias_height / config.radius).abs().min(1.0);
    let mut strength = lerp(0.01, 0.001, t);
    if config.ambient_sign_follows_level && level.bias_increasing(config) {
        strength = -strength;
    }
    Some(Disturbance::new(
        rng.random::<f32>() * 0.1,
        rng.random::<f32>() * 0.1,
        lerp(0.03, 0.005, t),
        strength,
    ))
}

pub fn queue_ambient_disturbances(
    mut frame: Local<u32>,
    config: Res<WaterConfig>,
    level: Res<WaterLevel>,
    mut disturbances: EventWriter<AddDisturbance>,
) {
    let due = *frame % config.ambient_interval.max(1) == 0;
    *frame = frame.wrapping_add(1);
    if !due || !config.ambient_drops {
        return;
    }
    let mut rng = rand::rng();
    if let Some(disturbance) = ambient_disturbance(&level, &config, &mut rng) {
        disturbances.write(AddDisturbance(disturbance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn level_at(bias_height: f32, elapsed: f32) -> WaterLevel {
        WaterLevel {
            elapsed,
            bias_height,
        }
    }

    #[test]
    fn test_validity() {
        assert!(Disturbance::new(0.0, 0.0, 0.03, 0.04).is_valid());
        assert!(Disturbance::new(0.0, 0.0, 0.03, -0.04).is_valid());
        assert!(!Disturbance::new(0.0, 0.0, 0.0, 0.04).is_valid());
        assert!(!Disturbance::new(0.0, 0.0, -0.1, 0.04).is_valid());
        assert!(!Disturbance::new(f32::NAN, 0.0, 0.03, 0.04).is_valid());
        assert!(!Disturbance::new(0.0, 0.0, 0.03, f32::INFINITY).is_valid());
    }

    #[test]
    fn test_world_point_mapping() {
        let config = WaterConfig::default();
        let point = config.center + Vec3::new(config.radius * 0.5, 0.0, -config.radius);
        let d = Disturbance::at_world_point(point, &config, 0.03, 0.04);
        assert!((d.center - Vec2::new(0.5, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_ambient_drop_at_equator() {
        let config = WaterConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let d = ambient_disturbance(&level_at(0.0, 0.0), &config, &mut rng)
            .expect("equator drops are never suppressed");
        assert!((d.radius - 0.03).abs() < 1e-6);
        assert!((d.strength.abs() - 0.01).abs() < 1e-6);
        assert!((0.0..=0.1).contains(&d.center.x));
        assert!((0.0..=0.1).contains(&d.center.y));
    }

    #[test]
    fn test_ambient_drop_shrinks_with_level() {
        let config = WaterConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let d = ambient_disturbance(&level_at(0.5 * config.radius, 0.0), &config, &mut rng)
            .expect("drop expected");
        assert!((d.radius - 0.0175).abs() < 1e-6);
        assert!((d.strength.abs() - 0.0055).abs() < 1e-6);
    }

    #[test]
    fn test_ambient_drop_suppressed_near_bottom() {
        let config = WaterConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let level = level_at(-0.8 * config.radius, 0.0);
        assert!(ambient_disturbance(&level, &config, &mut rng).is_none());
    }

    #[test]
    fn test_ambient_sign_follows_level_direction() {
        let config = WaterConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        let sinking = level_at(0.0, 0.0);
        let rising = level_at(0.0, std::f32::consts::PI / config.level_speed);
        let down = ambient_disturbance(&sinking, &config, &mut rng).expect("drop expected");
        let up = ambient_disturbance(&rising, &config, &mut rng).expect("drop expected");
        assert!(down.strength < 0.0);
        assert!(up.strength > 0.0);
    }

    #[test]
    fn test_ambient_sign_can_stay_positive() {
        let config = WaterConfig {
            ambient_sign_follows_level: false,
            ..default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let sinking = level_at(0.0, 0.0);
        assert!(config.level_speed > 0.0 && sinking.bias_increasing(&config));
        let d = ambient_disturbance(&sinking, &config, &mut rng).expect("drop expected");
        assert!(d.strength > 0.0);
    }
}
