use bevy::{
    prelude::*,
    render::{
        Render, RenderApp, RenderSet,
        render_asset::RenderAssets,
        render_graph::{Node, NodeRunError, RenderGraph, RenderGraphContext, RenderLabel},
        render_resource::{binding_types::*, *},
        renderer::{RenderContext, RenderDevice, RenderQueue},
        texture::GpuImage,
    },
};

use super::HeightFieldTextures;
use super::schedule::{PassKind, SimulationParams, SimulationPlan};
use crate::water::config::WORKGROUP_SIZE;
use crate::water::pipeline_status::{PipelineHandle, TrackedPipelines};

pub const SIMULATION_SHADER: &str = "shaders/water_simulation.wgsl";

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct WaterSimulationLabel;

pub struct GpuSimulationPlugin;

impl Plugin for GpuSimulationPlugin {
    fn build(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .init_resource::<SimulationUniforms>()
            .add_systems(
                Render,
                (
                    prepare_simulation_uniforms.in_set(RenderSet::Prepare),
                    prepare_simulation_bind_groups.in_set(RenderSet::PrepareBindGroups),
                ),
            );

        let mut render_graph = render_app.world_mut().resource_mut::<RenderGraph>();
        render_graph.add_node(WaterSimulationLabel, WaterSimulationNode);
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app.init_resource::<SimulationPipeline>();
        let tracked = render_app.world().resource::<SimulationPipeline>().tracked();
        render_app
            .world_mut()
            .get_resource_or_insert_with(TrackedPipelines::default)
            .0
            .extend(tracked);
    }
}

/* ------------------------------ Pipelines ----------------------------- */

/// One layout, three entry points. Every pass reads the current slot as a
/// plain texture and writes the other one through a storage binding.
#[derive(Resource)]
pub struct SimulationPipeline {
    pub layout: BindGroupLayout,
    pub drop: CachedComputePipelineId,
    pub propagate: CachedComputePipelineId,
    pub normals: CachedComputePipelineId,
}

impl SimulationPipeline {
    pub fn id_for(&self, kind: &PassKind) -> CachedComputePipelineId {
        match kind {
            PassKind::Drop(_) => self.drop,
            PassKind::Propagate => self.propagate,
            PassKind::Normals => self.normals,
        }
    }

    fn tracked(&self) -> Vec<(&'static str, PipelineHandle)> {
        vec![
            ("water_drop", PipelineHandle::Compute(self.drop)),
            ("water_propagate", PipelineHandle::Compute(self.propagate)),
            ("water_normals", PipelineHandle::Compute(self.normals)),
        ]
    }
}

impl FromWorld for SimulationPipeline {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();

        let layout = render_device.create_bind_group_layout(
            "water_simulation_bind_group_layout",
            &BindGroupLayoutEntries::sequential(
                ShaderStages::COMPUTE,
                (
                    texture_2d(TextureSampleType::Float { filterable: false }),
                    texture_storage_2d(TextureFormat::Rgba16Float, StorageTextureAccess::WriteOnly),
                    uniform_buffer::<SimulationParams>(true),
                ),
            ),
        );

        let shader = world.resource::<AssetServer>().load(SIMULATION_SHADER);
        let pipeline_cache = world.resource::<PipelineCache>();

        let queue = |label: &'static str, entry_point: &'static str| {
            pipeline_cache.queue_compute_pipeline(ComputePipelineDescriptor {
                label: Some(label.into()),
                layout: vec![layout.clone()],
                push_constant_ranges: vec![],
                shader: shader.clone(),
                shader_defs: vec![],
                entry_point: entry_point.into(),
                zero_initialize_workgroup_memory: false,
            })
        };

        let drop = queue("water_drop_pipeline", "add_drop");
        let propagate = queue("water_propagate_pipeline", "propagate");
        let normals = queue("water_normals_pipeline", "estimate_normals");

        Self {
            layout,
            drop,
            propagate,
            normals,
        }
    }
}

/* ------------------------ Uniforms & Bind Groups ---------------------- */

/// One dynamic-offset entry per planned pass.
#[derive(Resource, Default)]
pub struct SimulationUniforms {
    pub buffer: DynamicUniformBuffer<SimulationParams>,
    pub offsets: Vec<u32>,
}

/// `groups[i]` reads slot `i` and writes slot `1 - i`.
#[derive(Resource)]
pub struct SimulationBindGroups {
    pub groups: [BindGroup; 2],
}

fn prepare_simulation_uniforms(
    plan: Option<Res<SimulationPlan>>,
    mut uniforms: ResMut<SimulationUniforms>,
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
) {
    let uniforms = &mut *uniforms;
    uniforms.buffer.clear();
    uniforms.offsets.clear();
    let Some(plan) = plan else { return };

    for pass in &plan.passes {
        uniforms.offsets.push(uniforms.buffer.push(&pass.params));
    }
    uniforms.buffer.write_buffer(&render_device, &render_queue);
}

fn prepare_simulation_bind_groups(
    mut commands: Commands,
    pipeline: Option<Res<SimulationPipeline>>,
    textures: Option<Res<HeightFieldTextures>>,
    uniforms: Res<SimulationUniforms>,
    gpu_images: Res<RenderAssets<GpuImage>>,
    render_device: Res<RenderDevice>,
) {
    let Some(pipeline) = pipeline else { return };
    let Some(textures) = textures else { return };
    let Some(params) = uniforms.buffer.binding() else {
        commands.remove_resource::<SimulationBindGroups>();
        return;
    };

    let [first, second] = textures.slots.slots();
    let Some(first) = gpu_images.get(first) else { return };
    let Some(second) = gpu_images.get(second) else { return };

    let group = |label: &'static str, read: &GpuImage, write: &GpuImage| {
        render_device.create_bind_group(
            label,
            &pipeline.layout,
            &BindGroupEntries::sequential((
                &read.texture_view,
                &write.texture_view,
                params.clone(),
            )),
        )
    };

    commands.insert_resource(SimulationBindGroups {
        groups: [
            group("water_simulation_bind_group_a_to_b", first, second),
            group("water_simulation_bind_group_b_to_a", second, first),
        ],
    });
}

/* ---------------------------- Compute Node ---------------------------- */

pub struct WaterSimulationNode;

impl Node for WaterSimulationNode {
    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        world: &World,
    ) -> Result<(), NodeRunError> {
        let Some(plan) = world.get_resource::<SimulationPlan>() else {
            return Ok(());
        };
        if plan.is_empty() {
            return Ok(());
        }
        let Some(pipeline) = world.get_resource::<SimulationPipeline>() else {
            return Ok(());
        };
        let Some(bind_groups) = world.get_resource::<SimulationBindGroups>() else {
            return Ok(());
        };
        let Some(textures) = world.get_resource::<HeightFieldTextures>() else {
            return Ok(());
        };
        let uniforms = world.resource::<SimulationUniforms>();
        if uniforms.offsets.len() != plan.passes.len() {
            return Ok(());
        }

        // All or nothing: a partial plan would leave the slots out of step
        // with the main world.
        let pipeline_cache = world.resource::<PipelineCache>();
        let mut compiled = Vec::with_capacity(plan.passes.len());
        for pass in &plan.passes {
            let Some(compute) = pipeline_cache.get_compute_pipeline(pipeline.id_for(&pass.kind))
            else {
                return Ok(());
            };
            compiled.push(compute);
        }

        let workgroups = textures.size.div_ceil(WORKGROUP_SIZE);
        let mut compute_pass = render_context
            .command_encoder()
            .begin_compute_pass(&ComputePassDescriptor {
                label: Some("water_simulation_pass"),
                timestamp_writes: None,
            });

        for ((pass, compute), offset) in plan.passes.iter().zip(compiled).zip(&uniforms.offsets) {
            compute_pass.push_debug_group(pass.kind.label());
            compute_pass.set_pipeline(compute);
            compute_pass.set_bind_group(0, &bind_groups.groups[pass.read & 1], &[*offset]);
            compute_pass.dispatch_workgroups(workgroups, workgroups, 1);
            compute_pass.pop_debug_group();
        }

        Ok(())
    }
}
