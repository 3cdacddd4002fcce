use bevy::{
    core_pipeline::tonemapping::Tonemapping,
    prelude::*,
    render::{
        camera::{CameraProjection, ClearColorConfig, RenderTarget},
        render_asset::RenderAssetUsages,
        render_resource::{Extent3d, TextureDimension, TextureFormat, TextureUsages},
        view::RenderLayers,
    },
};

use super::clip_plane::ClipPlane;
use super::oblique::{ObliqueProjection, oblique_clip_from_view};
use super::texture_matrix::texture_matrix;
use crate::water::config::{REFRACTION_CLEAR, WaterConfig, check_extent};
use crate::water::error::WaterError;
use crate::water::surface::{SCENE_LAYER, WaterSurface};
use crate::water::{WaterFailure, WaterRenderSet};

/// Marks the camera the water is drawn for. Refraction views copy it.
#[derive(Component)]
pub struct WaterViewer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum RefractionSide {
    /// For eyes above the water. Keeps what lies below the surface.
    Above,
    /// For eyes below the water. Keeps what lies above the surface.
    Below,
}

impl RefractionSide {
    pub const ALL: [RefractionSide; 2] = [RefractionSide::Above, RefractionSide::Below];

    pub fn inverse(&self) -> bool {
        *self == RefractionSide::Below
    }

    /// Both render before the main camera.
    fn order(&self) -> isize {
        match self {
            RefractionSide::Above => -2,
            RefractionSide::Below => -1,
        }
    }
}

#[derive(Component, Clone, Debug)]
pub struct RefractionView {
    pub side: RefractionSide,
    /// Surface-local position to refraction texture coordinates.
    pub texture_matrix: Mat4,
    pub clip_plane: Option<ClipPlane>,
}

impl RefractionView {
    pub fn new(side: RefractionSide) -> Self {
        Self {
            side,
            texture_matrix: Mat4::IDENTITY,
            clip_plane: None,
        }
    }
}

/// Color targets of the two refraction views.
#[derive(Resource, Clone, Default)]
pub struct RefractionTargets {
    pub above: Handle<Image>,
    pub below: Handle<Image>,
}

impl RefractionTargets {
    pub fn get(&self, side: RefractionSide) -> &Handle<Image> {
        match side {
            RefractionSide::Above => &self.above,
            RefractionSide::Below => &self.below,
        }
    }
}

pub struct RefractionPlugin;

impl Plugin for RefractionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RefractionTargets>()
            .register_type::<RefractionSide>()
            .add_systems(Startup, spawn_refraction_views)
            .add_systems(
                PostUpdate,
                update_refraction_views.in_set(WaterRenderSet::Refraction),
            );
    }
}

pub fn create_refraction_image(size: u32) -> Result<Image, WaterError> {
    check_extent("refraction target", size, size)?;
    let mut image = Image::new_fill(
        Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        &[0, 0, 0, 0],
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::default(),
    );
    image.texture_descriptor.usage = TextureUsages::TEXTURE_BINDING
        | TextureUsages::COPY_DST
        | TextureUsages::COPY_SRC
        | TextureUsages::RENDER_ATTACHMENT;
    Ok(image)
}

fn spawn_refraction_views(
    mut commands: Commands,
    config: Res<WaterConfig>,
    images: Option<ResMut<Assets<Image>>>,
    mut targets: ResMut<RefractionTargets>,
    mut failures: EventWriter<WaterFailure>,
) {
    let Some(mut images) = images else {
        return;
    };
    let allocated = create_refraction_image(config.refraction_size)
        .and_then(|above| Ok((above, create_refraction_image(config.refraction_size)?)));
    let (above, below) = match allocated {
        Ok(pair) => pair,
        Err(error) => {
            failures.write(WaterFailure(error));
            return;
        }
    };
    *targets = RefractionTargets {
        above: images.add(above),
        below: images.add(below),
    };

    for side in RefractionSide::ALL {
        // Per-view render state: the main camera keeps whatever it has.
        commands.spawn((
            Name::new(format!("Refraction View {:?}", side)),
            Camera3d::default(),
            Camera {
                target: RenderTarget::Image(targets.get(side).clone().into()),
                order: side.order(),
                clear_color: ClearColorConfig::Custom(REFRACTION_CLEAR),
                hdr: false,
                ..default()
            },
            Projection::custom(ObliqueProjection::default()),
            Tonemapping::AcesFitted,
            Msaa::Off,
            RenderLayers::layer(SCENE_LAYER),
            RefractionView::new(side),
            Transform::default(),
        ));
    }
    info!(
        "Created refraction views ({}x{}).",
        config.refraction_size, config.refraction_size
    );
}

/// Re-derives both views from this frame's main camera and surface:
/// clip plane, then virtual camera, then texture matrix.
pub fn update_refraction_views(
    config: Res<WaterConfig>,
    mut warned: Local<bool>,
    viewers: Query<(&GlobalTransform, &Projection), (With<WaterViewer>, Without<RefractionView>)>,
    surfaces: Query<
        &GlobalTransform,
        (With<WaterSurface>, Without<RefractionView>, Without<WaterViewer>),
    >,
    mut views: Query<
        (
            &mut RefractionView,
            &mut Transform,
            &mut GlobalTransform,
            &mut Projection,
        ),
        Without<WaterViewer>,
    >,
) {
    let Ok((viewer, viewer_projection)) = viewers.single() else {
        return;
    };
    let Ok(surface) = surfaces.single() else {
        return;
    };
    let Projection::Perspective(perspective) = viewer_projection else {
        if !*warned {
            warn!("Water refraction needs a perspective camera, views not updated");
            *warned = true;
        }
        return;
    };

    let world_from_view = viewer.compute_matrix();
    let view_from_world = world_from_view.inverse();
    let world_from_local = surface.compute_matrix();
    let real_clip_from_view = perspective.get_clip_from_view();

    for (mut view, mut transform, mut global, mut projection) in views.iter_mut() {
        let plane = ClipPlane::from_surface(surface, view.side.inverse());

        // Transform propagation already ran this frame, so the global
        // transform is written directly.
        *transform = viewer.compute_transform();
        *global = *viewer;
        *projection = Projection::custom(ObliqueProjection {
            source: perspective.clone(),
            clip_from_view: oblique_clip_from_view(
                perspective,
                &world_from_view,
                &plane,
                config.clip_bias,
            ),
        });

        view.clip_plane = Some(plane);
        view.texture_matrix =
            texture_matrix(real_clip_from_view, view_from_world, world_from_local);
    }
}
