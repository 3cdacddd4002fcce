use bevy::{
    pbr::{NotShadowCaster, NotShadowReceiver},
    prelude::*,
    render::{
        mesh::{Indices, PrimitiveTopology},
        render_asset::RenderAssetUsages,
        render_resource::Face,
        view::{NoFrustumCulling, RenderLayers},
    },
};

use super::level::FollowsWaterLevel;
use super::material::WaterSurfaceMaterial;
use super::refraction::RefractionSide;

/// Everything but the water itself.
pub const SCENE_LAYER: usize = 0;
/// Only the main camera renders this layer, refraction views never do.
pub const WATER_LAYER: usize = 1;

/// Quads per side of the water grid and of the caustics grid.
pub const GRID_RESOLUTION: u32 = 256;

/// Parent entity of the two water draws. Its transform follows the level.
#[derive(Component)]
pub struct WaterSurface;

/// One of the two draws of the water mesh.
#[derive(Component, Clone, Copy, Debug)]
pub struct WaterDraw(pub SurfaceFace);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum SurfaceFace {
    /// Seen from above the water.
    #[default]
    Surface,
    /// Seen from below, looking up through the water.
    Underwater,
}

impl SurfaceFace {
    pub const ALL: [SurfaceFace; 2] = [SurfaceFace::Underwater, SurfaceFace::Surface];

    /// The grid's front faces point down, so the draw seen from above culls
    /// front faces and the one seen from below culls back faces.
    pub fn culled(&self) -> Face {
        match self {
            SurfaceFace::Surface => Face::Front,
            SurfaceFace::Underwater => Face::Back,
        }
    }

    pub fn refraction_side(&self) -> RefractionSide {
        match self {
            SurfaceFace::Surface => RefractionSide::Above,
            SurfaceFace::Underwater => RefractionSide::Below,
        }
    }

    pub fn is_underwater(&self) -> bool {
        *self == SurfaceFace::Underwater
    }
}

/// Which of the two draws a camera at `eye` gets to see. `None` when the
/// eye sits exactly on the plane.
pub fn visible_face(eye: Vec3, plane_point: Vec3, plane_normal: Vec3) -> Option<SurfaceFace> {
    let side = plane_normal.dot(eye - plane_point);
    if side > 0.0 {
        Some(SurfaceFace::Surface)
    } else if side < 0.0 {
        Some(SurfaceFace::Underwater)
    } else {
        None
    }
}

/* ------------------------------ Grid Mesh ----------------------------- */

/// `(resolution + 1)^2` points on `[-1, 1]^2`, row by row along +z.
pub fn grid_positions(resolution: u32) -> Vec<[f32; 2]> {
    let n = resolution.max(1);
    let mut positions = Vec::with_capacity(((n + 1) * (n + 1)) as usize);
    for j in 0..=n {
        for i in 0..=n {
            positions.push([
                -1.0 + 2.0 * i as f32 / n as f32,
                -1.0 + 2.0 * j as f32 / n as f32,
            ]);
        }
    }
    positions
}

/// Two triangles per quad, wound so the front face points towards -Y.
pub fn grid_indices(resolution: u32) -> Vec<u32> {
    let n = resolution.max(1);
    let row = n + 1;
    let mut indices = Vec::with_capacity((n * n * 6) as usize);
    for j in 0..n {
        for i in 0..n {
            let a = j * row + i;
            let b = a + 1;
            let c = a + row;
            let d = c + 1;
            indices.extend_from_slice(&[a, b, c, b, d, c]);
        }
    }
    indices
}

/// Flat grid in the XZ plane. Heights come from the simulation texture in
/// the vertex shader, so only positions are stored.
pub fn water_grid_mesh(resolution: u32) -> Mesh {
    let positions: Vec<[f32; 3]> = grid_positions(resolution)
        .into_iter()
        .map(|[x, z]| [x, 0.0, z])
        .collect();

    Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD,
    )
    .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
    .with_inserted_indices(Indices::U32(grid_indices(resolution)))
}

/* -------------------------------- Plugin ------------------------------ */

pub struct SurfacePlugin;

impl Plugin for SurfacePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_water_surface);
    }
}

fn spawn_water_surface(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<WaterSurfaceMaterial>>,
) {
    let mesh = meshes.add(water_grid_mesh(GRID_RESOLUTION));

    commands
        .spawn((
            Name::new("Water Surface"),
            WaterSurface,
            FollowsWaterLevel,
            Transform::default(),
            Visibility::default(),
        ))
        .with_children(|parent| {
            // Underwater first, matching the draw order of the two passes.
            for face in SurfaceFace::ALL {
                parent.spawn((
                    Name::new(format!("Water {:?}", face)),
                    WaterDraw(face),
                    Mesh3d(mesh.clone()),
                    MeshMaterial3d(materials.add(WaterSurfaceMaterial::for_face(face))),
                    Transform::default(),
                    NoFrustumCulling,
                    NotShadowCaster,
                    NotShadowReceiver,
                    RenderLayers::layer(WATER_LAYER),
                ));
            }
        });
    info!("Spawned water surface ({}x{} grid)", GRID_RESOLUTION, GRID_RESOLUTION);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_normals(resolution: u32) -> Vec<(Vec3, Vec3)> {
        let positions: Vec<Vec3> = grid_positions(resolution)
            .into_iter()
            .map(|[x, z]| Vec3::new(x, 0.0, z))
            .collect();
        grid_indices(resolution)
            .chunks(3)
            .map(|t| {
                let (a, b, c) = (
                    positions[t[0] as usize],
                    positions[t[1] as usize],
                    positions[t[2] as usize],
                );
                ((b - a).cross(c - a).normalize(), a)
            })
            .collect()
    }

    /// A triangle survives a draw when its facing is not the culled one.
    fn drawn(face: SurfaceFace, normal: Vec3, point: Vec3, eye: Vec3) -> bool {
        let facing = if normal.dot(eye - point) > 0.0 {
            Face::Front
        } else {
            Face::Back
        };
        facing != face.culled()
    }

    #[test]
    fn test_grid_faces_down() {
        for (normal, _) in triangle_normals(4) {
            assert!((normal - Vec3::NEG_Y).length() < 1e-6, "normal {normal}");
        }
    }

    #[test]
    fn test_grid_sizes() {
        assert_eq!(grid_positions(256).len(), 257 * 257);
        assert_eq!(grid_indices(256).len(), 256 * 256 * 6);
        let mesh = water_grid_mesh(8);
        assert_eq!(mesh.count_vertices(), 81);
    }

    #[test]
    fn test_exactly_one_face_visible() {
        let triangles = triangle_normals(3);
        let eyes = [
            Vec3::new(0.3, 2.0, -0.4),
            Vec3::new(-5.0, 0.01, 3.0),
            Vec3::new(0.0, -1.5, 0.0),
            Vec3::new(4.0, -0.001, -2.0),
        ];
        for eye in eyes {
            let expected = visible_face(eye, Vec3::ZERO, Vec3::Y).expect("eye is off the plane");
            for (normal, point) in &triangles {
                let shown: Vec<SurfaceFace> = SurfaceFace::ALL
                    .into_iter()
                    .filter(|face| drawn(*face, *normal, *point, eye))
                    .collect();
                assert_eq!(shown, vec![expected], "eye {eye}");
            }
        }
    }

    #[test]
    fn test_on_plane_has_no_face() {
        assert_eq!(visible_face(Vec3::new(1.0, 0.0, 1.0), Vec3::ZERO, Vec3::Y), None);
    }

    #[test]
    fn test_faces_pick_matching_refraction() {
        assert_eq!(SurfaceFace::Surface.refraction_side(), RefractionSide::Above);
        assert_eq!(SurfaceFace::Underwater.refraction_side(), RefractionSide::Below);
        assert!(SurfaceFace::Underwater.is_underwater());
    }
}
