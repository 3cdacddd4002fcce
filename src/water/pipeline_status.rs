use bevy::{
    prelude::*,
    render::{
        Render, RenderApp, RenderSet,
        render_resource::{
            CachedComputePipelineId, CachedPipelineState, CachedRenderPipelineId, PipelineCache,
            PipelineCacheError,
        },
    },
};
use crossbeam_channel::{Receiver, Sender, unbounded};

use super::WaterFailure;
use super::error::WaterError;

/* ----------------------------- Messages ------------------------------- */

/// Sent once from the render world when every water pipeline has either
/// compiled or failed.
#[derive(Debug, Clone)]
pub enum PipelineStatus {
    Ready,
    Failed { pass: &'static str, reason: String },
}

#[derive(Clone, Copy, Debug)]
pub enum PipelineHandle {
    Compute(CachedComputePipelineId),
    Render(CachedRenderPipelineId),
}

#[derive(Debug, PartialEq)]
pub enum PipelineState {
    Pending,
    Ready,
    Failed(String),
}

/* ------------------------------- Plugin ------------------------------- */

pub struct PipelineStatusPlugin;

impl Plugin for PipelineStatusPlugin {
    fn build(&self, app: &mut App) {
        // Channel for cross-world communication
        let (tx, rx) = unbounded::<PipelineStatus>();
        app.init_resource::<SimulationStatus>()
            .insert_resource(PipelineStatusReceiver { rx });

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        render_app
            .init_resource::<TrackedPipelines>()
            .insert_resource(PipelineStatusSender { tx })
            .add_systems(Render, report_pipeline_status.in_set(RenderSet::Cleanup));
    }
}

/* ----------------------------- Resources ------------------------------ */

/// Main-world view of the pipeline state. Nothing is simulated before
/// this reads `Ready`.
#[derive(Resource, Clone, Debug, Default, PartialEq, Eq)]
pub enum SimulationStatus {
    #[default]
    Pending,
    Ready,
    Failed,
}

impl SimulationStatus {
    pub fn is_ready(&self) -> bool {
        *self == SimulationStatus::Ready
    }
}

#[derive(Resource)]
pub struct PipelineStatusReceiver {
    pub rx: Receiver<PipelineStatus>,
}

#[derive(Resource)]
pub struct PipelineStatusSender {
    pub tx: Sender<PipelineStatus>,
}

/// Render-world list of every pipeline the water passes need.
#[derive(Resource, Default)]
pub struct TrackedPipelines(pub Vec<(&'static str, PipelineHandle)>);

/* ------------------------------ Helpers ------------------------------- */

pub fn pipeline_state(cache: &PipelineCache, handle: PipelineHandle) -> PipelineState {
    let state = match handle {
        PipelineHandle::Compute(id) => cache.get_compute_pipeline_state(id),
        PipelineHandle::Render(id) => cache.get_render_pipeline_state(id),
    };
    match state {
        CachedPipelineState::Ok(_) => PipelineState::Ready,
        CachedPipelineState::Err(PipelineCacheError::ShaderNotLoaded(_))
        | CachedPipelineState::Err(PipelineCacheError::ShaderImportNotYetAvailable) => {
            PipelineState::Pending
        }
        CachedPipelineState::Err(err) => PipelineState::Failed(err.to_string()),
        _ => PipelineState::Pending,
    }
}

/* ---------------------- Render World: Report Once --------------------- */

pub fn report_pipeline_status(
    mut reported: Local<bool>,
    tracked: Res<TrackedPipelines>,
    cache: Res<PipelineCache>,
    sender: Res<PipelineStatusSender>,
) {
    if *reported || tracked.0.is_empty() {
        return;
    }
    let mut all_ready = true;
    for (pass, handle) in &tracked.0 {
        match pipeline_state(&cache, *handle) {
            PipelineState::Ready => {}
            PipelineState::Pending => all_ready = false,
            PipelineState::Failed(reason) => {
                let _ = sender.tx.send(PipelineStatus::Failed { pass, reason });
                *reported = true;
                return;
            }
        }
    }
    if all_ready {
        let _ = sender.tx.send(PipelineStatus::Ready);
        *reported = true;
    }
}

/* ---------------------- Main World: Poll Channel ---------------------- */

pub fn poll_pipeline_status(
    receiver: Option<Res<PipelineStatusReceiver>>,
    mut status: ResMut<SimulationStatus>,
    mut failures: EventWriter<WaterFailure>,
) {
    let Some(receiver) = receiver else {
        return;
    };
    while let Ok(message) = receiver.rx.try_recv() {
        match message {
            PipelineStatus::Ready => {
                info!("Water pipelines compiled, simulation starting.");
                *status = SimulationStatus::Ready;
            }
            PipelineStatus::Failed { pass, reason } => {
                *status = SimulationStatus::Failed;
                failures.write(WaterFailure(WaterError::PipelineFailed { pass, reason }));
            }
        }
    }
}
