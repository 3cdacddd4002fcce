use bevy::{
    prelude::*,
    render::{extract_resource::ExtractResource, render_resource::ShaderType},
};

use super::disturbance::Disturbance;
use crate::water::ping_pong::PingPong;

/// Uniform shared by every simulation kernel, CPU and GPU alike.
/// Must match `SimulationParams` in `water_simulation.wgsl`.
#[derive(Clone, Copy, Debug, Default, PartialEq, ShaderType)]
pub struct SimulationParams {
    // .xy = drop center, .z = drop radius, .w = drop strength
    pub drop: Vec4,
    // .x = active radius, .y = damping, .z = texel delta, .w = unused
    pub domain: Vec4,
}

/// Per-frame domain shared by every pass of that frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Domain {
    /// `k / R`, fraction of the texture half-width that is water.
    pub active_radius: f32,
    pub damping: f32,
    pub texel_delta: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PassKind {
    Drop(Disturbance),
    Propagate,
    Normals,
}

impl PassKind {
    pub fn label(&self) -> &'static str {
        match self {
            PassKind::Drop(_) => "water_drop_pass",
            PassKind::Propagate => "water_propagate_pass",
            PassKind::Normals => "water_normals_pass",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannedPass {
    pub kind: PassKind,
    /// Slot the pass samples.
    pub read: usize,
    /// Slot the pass writes. Always the other one.
    pub write: usize,
    pub params: SimulationParams,
}

/// Everything the simulator does in one frame, in execution order.
///
/// Built on the main thread, extracted to the render world and replayed
/// there unchanged, so both worlds agree on which slot ends up current.
#[derive(Resource, Clone, Debug, Default, ExtractResource)]
pub struct SimulationPlan {
    pub passes: Vec<PlannedPass>,
    pub final_slot: usize,
}

impl SimulationPlan {
    /// Drops first, then exactly one propagation step, then one normal pass.
    /// Invalid drops are left out. `buffers` ends up swapped once per pass.
    pub fn build<T>(
        buffers: &mut PingPong<T>,
        disturbances: impl IntoIterator<Item = Disturbance>,
        domain: Domain,
    ) -> Self {
        let mut kinds: Vec<PassKind> = disturbances
            .into_iter()
            .filter(|disturbance| {
                let valid = disturbance.is_valid();
                if !valid {
                    debug!("Skipping degenerate disturbance {:?}", disturbance);
                }
                valid
            })
            .map(PassKind::Drop)
            .collect();
        kinds.push(PassKind::Propagate);
        kinds.push(PassKind::Normals);

        let passes = kinds
            .into_iter()
            .map(|kind| {
                let (read, write) = buffers.targets();
                buffers.swap();
                PlannedPass {
                    kind,
                    read,
                    write,
                    params: pass_params(&kind, &domain),
                }
            })
            .collect();

        Self {
            passes,
            final_slot: buffers.current_index(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

pub fn pass_params(kind: &PassKind, domain: &Domain) -> SimulationParams {
    let drop = match kind {
        PassKind::Drop(d) => Vec4::new(d.center.x, d.center.y, d.radius, d.strength),
        _ => Vec4::ZERO,
    };
    SimulationParams {
        drop,
        domain: Vec4::new(domain.active_radius, domain.damping, domain.texel_delta, 0.0),
    }
}
