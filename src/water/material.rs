use bevy::{
    pbr::{ExtendedMaterial, MaterialExtension, MaterialPipeline, MaterialPipelineKey},
    prelude::*,
    render::{
        mesh::MeshVertexBufferLayoutRef,
        render_resource::{
            AsBindGroup, RenderPipelineDescriptor, ShaderRef, SpecializedMeshPipelineError,
        },
    },
};

use super::WaterRenderSet;
use super::caustics::CausticsTarget;
use super::config::WaterConfig;
use super::level::WaterLevel;
use super::refraction::{RefractionTargets, RefractionView};
use super::simulation::HeightFieldTextures;
use super::surface::{SurfaceFace, WaterDraw};

pub const WATER_SURFACE_SHADER: &str = "shaders/water_surface.wgsl";
pub const CAUSTIC_RECEIVER_SHADER: &str = "shaders/caustic_receiver.wgsl";

/* ---------------------------- Water Surface --------------------------- */

/// One material per face. The face only picks the culling mode and the
/// refraction texture; the shader is shared.
#[derive(Asset, AsBindGroup, Debug, Clone, Reflect)]
#[bind_group_data(WaterSurfaceKey)]
pub struct WaterSurfaceMaterial {
    // Surface-local position to refraction texture coordinates
    #[uniform(0)]
    pub texture_matrix: Mat4,

    // .x = bias_height, .y = water_radius, .z = underwater (0 or 1), .w = ior_ratio
    #[uniform(0)]
    pub params: Vec4,

    // .xyz = water center, .w = active radius k / R; the sheet is cut off beyond it
    #[uniform(0)]
    pub water_center: Vec4,

    #[uniform(0)]
    pub water_color: Vec4,

    // .xyz = direction towards the light
    #[uniform(0)]
    pub light: Vec4,

    #[texture(1, visibility(vertex, fragment))]
    #[sampler(2, visibility(vertex, fragment))]
    pub height_field: Option<Handle<Image>>,

    #[texture(3)]
    #[sampler(4)]
    pub caustics: Option<Handle<Image>>,

    #[texture(5)]
    #[sampler(6)]
    pub refraction: Option<Handle<Image>>,

    pub face: SurfaceFace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WaterSurfaceKey {
    face: SurfaceFace,
}

impl From<&WaterSurfaceMaterial> for WaterSurfaceKey {
    fn from(material: &WaterSurfaceMaterial) -> Self {
        Self {
            face: material.face,
        }
    }
}

impl WaterSurfaceMaterial {
    pub fn for_face(face: SurfaceFace) -> Self {
        let config = WaterConfig::default();
        Self {
            texture_matrix: Mat4::IDENTITY,
            params: Vec4::new(
                0.0,
                config.radius,
                if face.is_underwater() { 1.0 } else { 0.0 },
                config.ior_ratio,
            ),
            water_center: config.center.extend(1.0),
            water_color: config.water_color.extend(1.0),
            light: config.light_direction.normalize_or(Vec3::Y).extend(0.0),
            height_field: None,
            caustics: None,
            refraction: None,
            face,
        }
    }

    pub fn bias_height(&self) -> f32 {
        self.params.x
    }

    pub fn is_underwater(&self) -> bool {
        self.params.z > 0.5
    }

    pub fn active_radius(&self) -> f32 {
        self.water_center.w
    }
}

impl Material for WaterSurfaceMaterial {
    fn vertex_shader() -> ShaderRef {
        WATER_SURFACE_SHADER.into()
    }

    fn fragment_shader() -> ShaderRef {
        WATER_SURFACE_SHADER.into()
    }

    fn specialize(
        _pipeline: &MaterialPipeline<Self>,
        descriptor: &mut RenderPipelineDescriptor,
        layout: &MeshVertexBufferLayoutRef,
        key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        let vertex_layout = layout
            .0
            .get_layout(&[Mesh::ATTRIBUTE_POSITION.at_shader_location(0)])?;
        descriptor.vertex.buffers = vec![vertex_layout];
        descriptor.primitive.cull_mode = Some(key.bind_group_data.face.culled());
        Ok(())
    }
}

/* --------------------------- Caustic Receiver ------------------------- */

/// Lets any `StandardMaterial` surface inside the sphere pick up the
/// caustics and the water tint. Bindings 100 to 104 are the whole
/// interface, nothing is patched into the PBR shader.
#[derive(Asset, AsBindGroup, Debug, Clone, Reflect)]
pub struct CausticReceiver {
    // .xyz = water center, .w = water radius
    #[uniform(100)]
    pub water: Vec4,

    // .x = bias_height, .y = ior_ratio
    #[uniform(100)]
    pub params: Vec4,

    // .xyz = direction towards the light
    #[uniform(100)]
    pub light: Vec4,

    #[uniform(100)]
    pub water_color: Vec4,

    #[texture(101)]
    #[sampler(102)]
    pub height_field: Option<Handle<Image>>,

    #[texture(103)]
    #[sampler(104)]
    pub caustics: Option<Handle<Image>>,
}

impl Default for CausticReceiver {
    fn default() -> Self {
        let config = WaterConfig::default();
        Self {
            water: config.center.extend(config.radius),
            params: Vec4::new(0.0, config.ior_ratio, 0.0, 0.0),
            light: config.light_direction.normalize_or(Vec3::Y).extend(0.0),
            water_color: config.water_color.extend(1.0),
            height_field: None,
            caustics: None,
        }
    }
}

impl MaterialExtension for CausticReceiver {
    fn fragment_shader() -> ShaderRef {
        CAUSTIC_RECEIVER_SHADER.into()
    }
}

pub type CausticReceiverMaterial = ExtendedMaterial<StandardMaterial, CausticReceiver>;

pub fn caustic_receiver(base: StandardMaterial) -> CausticReceiverMaterial {
    ExtendedMaterial {
        base,
        extension: CausticReceiver::default(),
    }
}

/* -------------------------------- Sync -------------------------------- */

/// Per-frame inputs every water material sees.
struct WaterFrame<'a> {
    config: &'a WaterConfig,
    bias_height: f32,
    active_radius: f32,
    height_field: &'a Handle<Image>,
    caustics: &'a Handle<Image>,
}

impl WaterSurfaceMaterial {
    fn sync(&mut self, frame: &WaterFrame, refraction: &Handle<Image>, texture_matrix: Mat4) {
        let config = frame.config;
        self.texture_matrix = texture_matrix;
        self.params = Vec4::new(
            frame.bias_height,
            config.radius,
            if self.face.is_underwater() { 1.0 } else { 0.0 },
            config.ior_ratio,
        );
        self.water_center = config.center.extend(frame.active_radius);
        self.water_color = config.water_color.extend(1.0);
        self.light = config.light_direction.normalize_or(Vec3::Y).extend(0.0);
        self.height_field = Some(frame.height_field.clone());
        self.caustics = Some(frame.caustics.clone());
        self.refraction = Some(refraction.clone());
    }
}

impl CausticReceiver {
    fn sync(&mut self, frame: &WaterFrame) {
        let config = frame.config;
        self.water = config.center.extend(config.radius);
        self.params = Vec4::new(frame.bias_height, config.ior_ratio, 0.0, 0.0);
        self.light = config.light_direction.normalize_or(Vec3::Y).extend(0.0);
        self.water_color = config.water_color.extend(1.0);
        self.height_field = Some(frame.height_field.clone());
        self.caustics = Some(frame.caustics.clone());
    }
}

pub struct WaterMaterialPlugin;

impl Plugin for WaterMaterialPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            MaterialPlugin::<WaterSurfaceMaterial> {
                prepass_enabled: false,
                shadows_enabled: false,
                ..Default::default()
            },
            MaterialPlugin::<CausticReceiverMaterial>::default(),
        ))
        .register_asset_reflect::<WaterSurfaceMaterial>()
        .add_systems(
            PostUpdate,
            sync_water_materials.in_set(WaterRenderSet::Materials),
        );
    }
}

/// Points every water material at this frame's textures and matrices.
pub fn sync_water_materials(
    config: Res<WaterConfig>,
    level: Res<WaterLevel>,
    textures: Res<HeightFieldTextures>,
    caustics: Res<CausticsTarget>,
    targets: Res<RefractionTargets>,
    views: Query<&RefractionView>,
    draws: Query<(&WaterDraw, &MeshMaterial3d<WaterSurfaceMaterial>)>,
    receivers: Query<&MeshMaterial3d<CausticReceiverMaterial>>,
    mut water_materials: ResMut<Assets<WaterSurfaceMaterial>>,
    mut receiver_materials: ResMut<Assets<CausticReceiverMaterial>>,
) {
    let frame = WaterFrame {
        config: &config,
        bias_height: level.bias_height,
        active_radius: level.active_radius(&config),
        height_field: textures.current(),
        caustics: &caustics.image,
    };

    for (draw, handle) in draws.iter() {
        let side = draw.0.refraction_side();
        let texture_matrix = views
            .iter()
            .find(|view| view.side == side)
            .map_or(Mat4::IDENTITY, |view| view.texture_matrix);
        if let Some(material) = water_materials.get_mut(&handle.0) {
            material.sync(&frame, targets.get(side), texture_matrix);
        }
    }

    for handle in receivers.iter() {
        if let Some(material) = receiver_materials.get_mut(&handle.0) {
            material.extension.sync(&frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::water::ping_pong::PingPong;
    use crate::water::refraction::RefractionSide;
    use bevy::ecs::system::RunSystemOnce;

    #[test]
    fn test_key_follows_face() {
        let surface = WaterSurfaceMaterial::for_face(SurfaceFace::Surface);
        let underwater = WaterSurfaceMaterial::for_face(SurfaceFace::Underwater);
        assert_ne!(WaterSurfaceKey::from(&surface), WaterSurfaceKey::from(&underwater));
        assert!(!surface.is_underwater());
        assert!(underwater.is_underwater());
    }

    #[test]
    fn test_receiver_defaults_match_interface_constants() {
        let receiver = CausticReceiver::default();
        assert_eq!(receiver.water.w, 6.6);
        assert!((receiver.params.y - 1.0 / 1.333).abs() < 1e-6);
        assert_eq!(receiver.water_color.truncate(), Vec3::new(0.53, 0.72, 0.85));
    }

    #[test]
    fn test_sheet_shrinks_with_the_level() {
        let config = WaterConfig::default();
        let handle = Handle::<Image>::default();
        let mut material = WaterSurfaceMaterial::for_face(SurfaceFace::Surface);
        assert_eq!(material.active_radius(), 1.0);

        let level = WaterLevel {
            elapsed: 0.0,
            bias_height: 0.8 * config.radius,
        };
        let frame = WaterFrame {
            config: &config,
            bias_height: level.bias_height,
            active_radius: level.active_radius(&config),
            height_field: &handle,
            caustics: &handle,
        };
        material.sync(&frame, &handle, Mat4::IDENTITY);
        assert!((material.active_radius() - 0.6).abs() < 1e-5);
        assert_eq!(material.water_center.truncate(), config.center);
    }

    #[test]
    fn test_sync_wires_each_face_to_its_refraction() {
        let mut world = World::new();
        let mut images = Assets::<Image>::default();
        let slots = PingPong::new(images.add(Image::default()), images.add(Image::default()));
        let caustics = images.add(Image::default());
        let above = images.add(Image::default());
        let below = images.add(Image::default());

        let mut water_materials = Assets::<WaterSurfaceMaterial>::default();
        let surface = water_materials.add(WaterSurfaceMaterial::for_face(SurfaceFace::Surface));
        let underwater =
            water_materials.add(WaterSurfaceMaterial::for_face(SurfaceFace::Underwater));

        let mut receiver_materials = Assets::<CausticReceiverMaterial>::default();
        let receiver = receiver_materials.add(caustic_receiver(StandardMaterial::default()));

        world.insert_resource(WaterConfig::default());
        world.insert_resource(WaterLevel {
            elapsed: 1.0,
            bias_height: 0.75,
        });
        world.insert_resource(HeightFieldTextures { slots, size: 256 });
        world.insert_resource(CausticsTarget {
            image: caustics.clone(),
            size: 1024,
            ..default()
        });
        world.insert_resource(RefractionTargets {
            above: above.clone(),
            below: below.clone(),
        });
        world.insert_resource(water_materials);
        world.insert_resource(receiver_materials);

        let above_matrix = Mat4::from_scale(Vec3::splat(2.0));
        world.spawn(RefractionView {
            side: RefractionSide::Above,
            texture_matrix: above_matrix,
            clip_plane: None,
        });
        world.spawn(RefractionView::new(RefractionSide::Below));
        world.spawn((WaterDraw(SurfaceFace::Surface), MeshMaterial3d(surface.clone())));
        world.spawn((
            WaterDraw(SurfaceFace::Underwater),
            MeshMaterial3d(underwater.clone()),
        ));
        world.spawn(MeshMaterial3d(receiver.clone()));

        world
            .run_system_once(sync_water_materials)
            .expect("system runs");

        let current = world.resource::<HeightFieldTextures>().current().clone();
        let materials = world.resource::<Assets<WaterSurfaceMaterial>>();
        let surface = materials.get(&surface).expect("surface material");
        assert_eq!(surface.refraction.as_ref(), Some(&above));
        assert_eq!(surface.texture_matrix, above_matrix);
        assert_eq!(surface.height_field.as_ref(), Some(&current));
        assert_eq!(surface.bias_height(), 0.75);
        let k = (6.6_f32 * 6.6 - 0.75 * 0.75).sqrt() / 6.6;
        assert!((surface.active_radius() - k).abs() < 1e-6);

        let underwater = materials.get(&underwater).expect("underwater material");
        assert_eq!(underwater.refraction.as_ref(), Some(&below));
        assert!(underwater.is_underwater());
        assert!((underwater.active_radius() - k).abs() < 1e-6);

        let receivers = world.resource::<Assets<CausticReceiverMaterial>>();
        let receiver = receivers.get(&receiver).expect("receiver material");
        assert_eq!(receiver.extension.caustics.as_ref(), Some(&caustics));
        assert_eq!(receiver.extension.params.x, 0.75);
    }
}
