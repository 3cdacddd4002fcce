use bevy::prelude::*;

use super::error::WaterError;

/// Radius of the sphere the water lives in, in world units.
pub const WATER_RADIUS: f32 = 6.6;
pub const WATER_CENTER: Vec3 = Vec3::new(-6.6, -0.3, 0.081273);

pub const SIMULATION_SIZE: u32 = 256;
pub const REFRACTION_SIZE: u32 = 512;
pub const CAUSTICS_SIZE: u32 = 1024;

/// Air to water index of refraction ratio.
pub const IOR_RATIO: f32 = 1.0 / 1.333;
pub const WATER_COLOR: Vec3 = Vec3::new(0.53, 0.72, 0.85);
/// Light used when shading surfaces that receive caustics.
pub const LIGHT_DIRECTION: Vec3 = Vec3::new(0.0, 1.0, 0.1);
/// Light the caustics projection refracts through the surface.
pub const CAUSTICS_LIGHT: Vec3 = Vec3::new(0.0, 1.0, 0.0);
pub const REFRACTION_CLEAR: Color = Color::srgb_u8(0x82, 0xbf, 0xda);

pub const CLIP_BIAS: f32 = 0.011;
pub const DAMPING: f32 = 0.995;

/// Compute workgroups are 8x8, resolutions must divide evenly.
pub const WORKGROUP_SIZE: u32 = 8;
/// Largest 2D texture every wgpu backend guarantees.
pub const MAX_TEXTURE_SIZE: u32 = 8192;

#[derive(Resource, Clone, Debug, Reflect)]
#[reflect(Resource)]
pub struct WaterConfig {
    pub center: Vec3,
    pub radius: f32,

    pub simulation_size: u32,
    pub refraction_size: u32,
    pub caustics_size: u32,

    pub damping: f32,
    pub clip_bias: f32,
    pub ior_ratio: f32,
    pub water_color: Vec3,
    pub light_direction: Vec3,
    pub caustics_light: Vec3,

    /// Water level oscillation, radians per second fed to `sin`.
    pub level_speed: f32,
    pub level_paused: bool,

    pub ambient_drops: bool,
    /// An ambient drop lands every this many frames.
    pub ambient_interval: u32,
    /// Ambient drops push down while the surface sinks. Off, they always
    /// push up.
    pub ambient_sign_follows_level: bool,

    pub cursor_drops: bool,
    pub cursor_radius: f32,
    pub cursor_strength: f32,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            center: WATER_CENTER,
            radius: WATER_RADIUS,
            simulation_size: SIMULATION_SIZE,
            refraction_size: REFRACTION_SIZE,
            caustics_size: CAUSTICS_SIZE,
            damping: DAMPING,
            clip_bias: CLIP_BIAS,
            ior_ratio: IOR_RATIO,
            water_color: WATER_COLOR,
            light_direction: LIGHT_DIRECTION,
            caustics_light: CAUSTICS_LIGHT,
            level_speed: 0.25 * 0.75,
            level_paused: false,
            ambient_drops: true,
            ambient_interval: 60,
            ambient_sign_follows_level: true,
            cursor_drops: true,
            cursor_radius: 0.03,
            cursor_strength: 0.04,
        }
    }
}

impl WaterConfig {
    /// Checked once when the water plugin is built. Anything rejected here
    /// would otherwise show up as NaN geometry or an unusable texture.
    pub fn validate(&self) -> Result<(), WaterError> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(WaterError::InvalidConfig(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        if !self.center.is_finite() {
            return Err(WaterError::InvalidConfig("center must be finite".into()));
        }
        if self.simulation_size % WORKGROUP_SIZE != 0 {
            return Err(WaterError::InvalidConfig(format!(
                "simulation size {} is not a multiple of {WORKGROUP_SIZE}",
                self.simulation_size
            )));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(WaterError::InvalidConfig(format!(
                "damping {} outside [0, 1]",
                self.damping
            )));
        }
        if !(self.ior_ratio > 0.0 && self.ior_ratio <= 1.0) {
            return Err(WaterError::InvalidConfig(format!(
                "ior ratio {} outside (0, 1]",
                self.ior_ratio
            )));
        }
        if self.light_direction.length_squared() == 0.0
            || self.caustics_light.length_squared() == 0.0
        {
            return Err(WaterError::InvalidConfig("light direction is zero".into()));
        }
        if self.ambient_interval == 0 {
            return Err(WaterError::InvalidConfig(
                "ambient interval must be at least one frame".into(),
            ));
        }
        Ok(())
    }

    /// Size of one simulation texel in normalized surface units.
    pub fn texel_delta(&self) -> f32 {
        1.0 / self.simulation_size.max(1) as f32
    }
}

/// Sizes are checked at allocation time, a zero or oversized target is an
/// allocation failure rather than a config typo.
pub fn check_extent(what: &'static str, width: u32, height: u32) -> Result<(), WaterError> {
    if width == 0 || height == 0 || width > MAX_TEXTURE_SIZE || height > MAX_TEXTURE_SIZE {
        return Err(WaterError::Allocation {
            what,
            width,
            height,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(WaterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_level_speed() {
        let config = WaterConfig::default();
        assert!((config.level_speed - 0.1875).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let config = WaterConfig {
            radius: 0.0,
            ..default()
        };
        assert!(matches!(
            config.validate(),
            Err(WaterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_unaligned_simulation_size() {
        let config = WaterConfig {
            simulation_size: 250,
            ..default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extent_limits() {
        assert!(check_extent("caustics", 1024, 1024).is_ok());
        assert!(matches!(
            check_extent("caustics", 0, 1024),
            Err(WaterError::Allocation { width: 0, .. })
        ));
        assert!(check_extent("caustics", MAX_TEXTURE_SIZE + 1, 8).is_err());
    }
}
