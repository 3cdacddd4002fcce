//! Caustics projection.
//!
//! A grid of the same resolution as the water mesh is pushed through the
//! current height field: every vertex refracts the light at the surface and
//! lands on the floor of the sphere. The ratio of the triangle areas before
//! and after refraction is how much light that patch of floor receives.
//! Overlapping triangles add up.

use bevy::{
    prelude::*,
    render::{
        Render, RenderApp, RenderSet,
        extract_resource::{ExtractResource, ExtractResourcePlugin},
        graph::CameraDriverLabel,
        render_asset::{RenderAssetUsages, RenderAssets},
        render_graph::{Node, NodeRunError, RenderGraph, RenderGraphContext, RenderLabel},
        render_resource::{binding_types::*, *},
        renderer::{RenderContext, RenderDevice, RenderQueue},
        texture::GpuImage,
    },
};
use bytemuck::{Pod, Zeroable};

use super::config::{WaterConfig, check_extent};
use super::error::WaterError;
use super::level::WaterLevel;
use super::pipeline_status::{PipelineHandle, TrackedPipelines};
use super::simulation::HeightFieldTextures;
use super::simulation::gpu::WaterSimulationLabel;
use super::surface::{GRID_RESOLUTION, grid_indices, grid_positions};
use super::{WaterFailure, WaterSet};

pub const CAUSTICS_SHADER: &str = "shaders/caustics.wgsl";

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct CausticsLabel;

/// Must match `CausticsParams` in `caustics.wgsl`.
#[derive(Clone, Copy, Debug, Default, PartialEq, ShaderType)]
pub struct CausticsParams {
    // .xyz = direction towards the light, .w = ior ratio
    pub light: Vec4,
    // .x = water radius, .y = bias height
    pub water: Vec4,
}

impl CausticsParams {
    pub fn new(config: &WaterConfig, bias_height: f32) -> Self {
        Self {
            light: config.caustics_light.normalize_or(Vec3::Y).extend(config.ior_ratio),
            water: Vec4::new(config.radius, bias_height, 0.0, 0.0),
        }
    }
}

/// The caustics image plus what the projection needs this frame.
#[derive(Resource, Clone, Default, ExtractResource)]
pub struct CausticsTarget {
    pub image: Handle<Image>,
    pub size: u32,
    pub params: CausticsParams,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GridVertex {
    position: [f32; 2],
}

pub struct CausticsPlugin;

impl Plugin for CausticsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CausticsTarget>()
            .add_systems(Startup, allocate_caustics_target)
            .add_systems(Update, update_caustics_params.in_set(WaterSet::Plan));

        if app.get_sub_app(RenderApp).is_none() {
            return;
        }
        app.add_plugins(ExtractResourcePlugin::<CausticsTarget>::default());

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        render_app.init_resource::<CausticsUniform>().add_systems(
            Render,
            (
                prepare_caustics_uniform.in_set(RenderSet::Prepare),
                prepare_caustics_bind_group.in_set(RenderSet::PrepareBindGroups),
            ),
        );

        let mut render_graph = render_app.world_mut().resource_mut::<RenderGraph>();
        render_graph.add_node(CausticsLabel, CausticsNode);
        render_graph.add_node_edge(WaterSimulationLabel, CausticsLabel);
        render_graph.add_node_edge(CausticsLabel, CameraDriverLabel);
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app.init_resource::<CausticsPipeline>();
        let id = render_app.world().resource::<CausticsPipeline>().pipeline;
        render_app
            .world_mut()
            .get_resource_or_insert_with(TrackedPipelines::default)
            .0
            .push(("water_caustics", PipelineHandle::Render(id)));
    }
}

/* ----------------------------- Main World ----------------------------- */

pub fn create_caustics_image(size: u32) -> Result<Image, WaterError> {
    check_extent("caustics", size, size)?;
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
    image.texture_descriptor.usage = TextureUsages::RENDER_ATTACHMENT
        | TextureUsages::TEXTURE_BINDING
        | TextureUsages::COPY_SRC;
    Ok(image)
}

fn allocate_caustics_target(
    config: Res<WaterConfig>,
    level: Res<WaterLevel>,
    images: Option<ResMut<Assets<Image>>>,
    mut target: ResMut<CausticsTarget>,
    mut failures: EventWriter<WaterFailure>,
) {
    let Some(mut images) = images else {
        return;
    };
    match create_caustics_image(config.caustics_size) {
        Ok(image) => {
            *target = CausticsTarget {
                image: images.add(image),
                size: config.caustics_size,
                params: CausticsParams::new(&config, level.bias_height),
            };
            info!(
                "Created caustics target ({}x{}).",
                config.caustics_size, config.caustics_size
            );
        }
        Err(error) => {
            failures.write(WaterFailure(error));
        }
    }
}

pub fn update_caustics_params(
    config: Res<WaterConfig>,
    level: Res<WaterLevel>,
    mut target: ResMut<CausticsTarget>,
) {
    target.params = CausticsParams::new(&config, level.bias_height);
}

/* ----------------------------- Render World ---------------------------- */

#[derive(Resource)]
pub struct CausticsPipeline {
    pub layout: BindGroupLayout,
    pub sampler: Sampler,
    pub pipeline: CachedRenderPipelineId,
    pub vertices: Buffer,
    pub indices: Buffer,
    pub index_count: u32,
}

impl FromWorld for CausticsPipeline {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();

        let layout = render_device.create_bind_group_layout(
            "water_caustics_bind_group_layout",
            &BindGroupLayoutEntries::sequential(
                ShaderStages::VERTEX_FRAGMENT,
                (
                    texture_2d(TextureSampleType::Float { filterable: true }),
                    sampler(SamplerBindingType::Filtering),
                    uniform_buffer::<CausticsParams>(false),
                ),
            ),
        );

        let sampler = render_device.create_sampler(&SamplerDescriptor {
            label: Some("water_caustics_sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..default()
        });

        let vertex_data: Vec<GridVertex> = grid_positions(GRID_RESOLUTION)
            .into_iter()
            .map(|position| GridVertex { position })
            .collect();
        let index_data = grid_indices(GRID_RESOLUTION);

        let vertices = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("water_caustics_vertices"),
            contents: bytemuck::cast_slice(&vertex_data),
            usage: BufferUsages::VERTEX,
        });
        let indices = render_device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("water_caustics_indices"),
            contents: bytemuck::cast_slice(&index_data),
            usage: BufferUsages::INDEX,
        });

        let shader = world.resource::<AssetServer>().load(CAUSTICS_SHADER);
        let additive = BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
            operation: BlendOperation::Add,
        };

        let pipeline = world
            .resource::<PipelineCache>()
            .queue_render_pipeline(RenderPipelineDescriptor {
                label: Some("water_caustics_pipeline".into()),
                layout: vec![layout.clone()],
                push_constant_ranges: vec![],
                vertex: VertexState {
                    shader: shader.clone(),
                    shader_defs: vec![],
                    entry_point: "vertex".into(),
                    buffers: vec![VertexBufferLayout::from_vertex_formats(
                        VertexStepMode::Vertex,
                        [VertexFormat::Float32x2],
                    )],
                },
                primitive: PrimitiveState::default(),
                depth_stencil: None,
                multisample: MultisampleState::default(),
                fragment: Some(FragmentState {
                    shader,
                    shader_defs: vec![],
                    entry_point: "fragment".into(),
                    targets: vec![Some(ColorTargetState {
                        format: TextureFormat::Rgba16Float,
                        blend: Some(BlendState {
                            color: additive,
                            alpha: additive,
                        }),
                        write_mask: ColorWrites::ALL,
                    })],
                }),
                zero_initialize_workgroup_memory: false,
            });

        Self {
            layout,
            sampler,
            pipeline,
            vertices,
            indices,
            index_count: index_data.len() as u32,
        }
    }
}

#[derive(Resource, Default)]
struct CausticsUniform(UniformBuffer<CausticsParams>);

#[derive(Resource)]
struct CausticsBindGroup(BindGroup);

fn prepare_caustics_uniform(
    target: Option<Res<CausticsTarget>>,
    mut uniform: ResMut<CausticsUniform>,
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
) {
    let Some(target) = target else { return };
    uniform.0.set(target.params);
    uniform.0.write_buffer(&render_device, &render_queue);
}

fn prepare_caustics_bind_group(
    mut commands: Commands,
    pipeline: Option<Res<CausticsPipeline>>,
    textures: Option<Res<HeightFieldTextures>>,
    uniform: Res<CausticsUniform>,
    gpu_images: Res<RenderAssets<GpuImage>>,
    render_device: Res<RenderDevice>,
) {
    let (Some(pipeline), Some(textures)) = (pipeline, textures) else {
        return;
    };
    let Some(params) = uniform.0.binding() else {
        return;
    };
    let Some(height_field) = gpu_images.get(textures.current()) else {
        commands.remove_resource::<CausticsBindGroup>();
        return;
    };

    commands.insert_resource(CausticsBindGroup(render_device.create_bind_group(
        "water_caustics_bind_group",
        &pipeline.layout,
        &BindGroupEntries::sequential((&height_field.texture_view, &pipeline.sampler, params)),
    )));
}

pub struct CausticsNode;

impl Node for CausticsNode {
    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let (Some(pipeline), Some(bind_group), Some(target)) = (
            world.get_resource::<CausticsPipeline>(),
            world.get_resource::<CausticsBindGroup>(),
            world.get_resource::<CausticsTarget>(),
        ) else {
            return Ok(());
        };
        let Some(render_pipeline) = world
            .resource::<PipelineCache>()
            .get_render_pipeline(pipeline.pipeline)
        else {
            return Ok(());
        };
        let Some(output) = world.resource::<RenderAssets<GpuImage>>().get(&target.image) else {
            return Ok(());
        };

        let mut pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("water_caustics_pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: &output.texture_view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(LinearRgba::NONE.into()),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_render_pipeline(render_pipeline);
        pass.set_bind_group(0, &bind_group.0, &[]);
        pass.set_vertex_buffer(0, pipeline.vertices.slice(..));
        pass.set_index_buffer(pipeline.indices.slice(..), 0, IndexFormat::Uint32);
        pass.draw_indexed(0..pipeline.index_count, 0, 0..1);

        Ok(())
    }
}
