use bevy::{
    prelude::*,
    render::{mesh::VertexAttributeValues, render_resource::Face},
};
use noise::{Fbm, MultiFractal, NoiseFn, OpenSimplex};

use crate::water::config::WaterConfig;
use crate::water::error::WaterError;
use crate::water::material::{CausticReceiverMaterial, caustic_receiver};

#[derive(Clone, Debug)]
pub struct RockSettings {
    pub seed: u32,
    pub radius: f32,
    /// Fraction of the radius the noise may push a vertex in or out.
    pub roughness: f32,
    pub frequency: f64,
    pub octaves: usize,
    pub subdivisions: u32,
}

impl Default for RockSettings {
    fn default() -> Self {
        Self {
            seed: 7,
            radius: 2.8,
            roughness: 0.18,
            frequency: 0.9,
            octaves: 4,
            subdivisions: 5,
        }
    }
}

/// Icosphere pushed in and out along its normals by fractal noise.
pub fn displaced_rock_mesh(settings: &RockSettings) -> Result<Mesh, WaterError> {
    let mut mesh = Sphere::new(1.0)
        .mesh()
        .ico(settings.subdivisions)
        .map_err(|e| WaterError::Mesh(e.to_string()))?;

    let noise = Fbm::<OpenSimplex>::new(settings.seed)
        .set_frequency(settings.frequency)
        .set_persistence(0.5)
        .set_octaves(settings.octaves);

    let Some(VertexAttributeValues::Float32x3(positions)) =
        mesh.attribute_mut(Mesh::ATTRIBUTE_POSITION)
    else {
        return Err(WaterError::Mesh("icosphere has no float3 positions".into()));
    };
    for position in positions.iter_mut() {
        let direction = Vec3::from(*position).normalize_or(Vec3::Y);
        let sample = noise.get([
            direction.x as f64,
            direction.y as f64,
            direction.z as f64,
        ]) as f32;
        let scale = settings.radius * (1.0 + settings.roughness * sample.clamp(-1.0, 1.0));
        *position = (direction * scale).to_array();
    }
    mesh.compute_smooth_normals();
    Ok(mesh)
}

pub fn spawn_enclosure(
    mut commands: Commands,
    config: Res<WaterConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<CausticReceiverMaterial>>,
) {
    // Seen from inside: cull the outer faces, light the inner ones.
    let glass = materials.add(caustic_receiver(StandardMaterial {
        base_color: Color::srgb(0.92, 0.9, 0.84),
        perceptual_roughness: 0.85,
        cull_mode: Some(Face::Front),
        double_sided: true,
        ..default()
    }));
    commands.spawn((
        Name::new("Enclosure"),
        Mesh3d(meshes.add(Sphere::new(config.radius).mesh().uv(64, 32))),
        MeshMaterial3d(glass),
        Transform::from_translation(config.center),
    ));

    let settings = RockSettings::default();
    match displaced_rock_mesh(&settings) {
        Ok(mesh) => {
            let stone = materials.add(caustic_receiver(StandardMaterial {
                base_color: Color::srgb(0.45, 0.42, 0.38),
                perceptual_roughness: 0.95,
                ..default()
            }));
            commands.spawn((
                Name::new("Rock"),
                Mesh3d(meshes.add(mesh)),
                MeshMaterial3d(stone),
                Transform::from_translation(config.center + Vec3::new(0.4, -3.2, -0.3)),
            ));
        }
        Err(e) => warn!("Rock mesh not generated: {e}"),
    }
}

pub fn spawn_lights(mut commands: Commands, config: Res<WaterConfig>) {
    commands.spawn((
        Name::new("Sun"),
        DirectionalLight {
            color: Color::WHITE,
            illuminance: 15000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::default().looking_to(-config.light_direction, Vec3::X),
    ));
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 300.0,
        ..default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rock_stays_within_roughness() {
        let settings = RockSettings {
            subdivisions: 3,
            ..default()
        };
        let mesh = displaced_rock_mesh(&settings).expect("icosphere builds");
        let Some(VertexAttributeValues::Float32x3(positions)) =
            mesh.attribute(Mesh::ATTRIBUTE_POSITION)
        else {
            panic!("positions missing");
        };
        let low = settings.radius * (1.0 - settings.roughness) - 1e-4;
        let high = settings.radius * (1.0 + settings.roughness) + 1e-4;
        for p in positions {
            let r = Vec3::from(*p).length();
            assert!((low..=high).contains(&r), "vertex radius {r}");
        }
        assert!(mesh.attribute(Mesh::ATTRIBUTE_NORMAL).is_some());
    }

    #[test]
    fn test_oversubdivided_rock_is_a_mesh_error() {
        let settings = RockSettings {
            subdivisions: 100,
            ..default()
        };
        let error = displaced_rock_mesh(&settings).expect_err("too many subdivisions");
        assert!(matches!(error, WaterError::Mesh(_)));
    }

    #[test]
    fn test_rock_is_seeded() {
        let settings = RockSettings {
            subdivisions: 2,
            ..default()
        };
        let a = displaced_rock_mesh(&settings).expect("icosphere builds");
        let b = displaced_rock_mesh(&settings).expect("icosphere builds");
        assert_eq!(
            a.attribute(Mesh::ATTRIBUTE_POSITION).and_then(|v| v.as_float3()),
            b.attribute(Mesh::ATTRIBUTE_POSITION).and_then(|v| v.as_float3())
        );
    }

    #[test]
    fn test_rock_fits_inside_enclosure() {
        let config = WaterConfig::default();
        let settings = RockSettings::default();
        let offset = Vec3::new(0.4, -3.2, -0.3);
        let farthest = offset.length() + settings.radius * (1.0 + settings.roughness);
        assert!(farthest < config.radius, "rock pokes through the glass: {farthest}");
    }
}
