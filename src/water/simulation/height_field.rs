use std::f32::consts::PI;

use bevy::prelude::*;

use super::schedule::{PassKind, SimulationParams, SimulationPlan};
use crate::water::ping_pong::PingPong;

/// CPU copy of the simulation texture.
///
/// Texels are `(height, velocity, normal.x, normal.z)`, stored row by row.
/// The kernels here are the same ones `water_simulation.wgsl` runs; they
/// back headless apps and give the tests something to look at.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightField {
    size: usize,
    texels: Vec<Vec4>,
}

impl HeightField {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            texels: vec![Vec4::ZERO; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn texel(&self, x: usize, y: usize) -> Vec4 {
        self.texels[y * self.size + x]
    }

    pub fn height(&self, x: usize, y: usize) -> f32 {
        self.texel(x, y).x
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// Edge texels repeat, like a clamp-to-edge sampler.
    fn clamped(&self, x: isize, y: isize) -> Vec4 {
        let last = self.size as isize - 1;
        self.texel(x.clamp(0, last) as usize, y.clamp(0, last) as usize)
    }

    fn uv(&self, x: usize, y: usize) -> Vec2 {
        (Vec2::new(x as f32, y as f32) + 0.5) / self.size as f32
    }

    fn in_domain(&self, x: usize, y: usize, params: &SimulationParams) -> bool {
        (self.uv(x, y) * 2.0 - 1.0).length() <= params.domain.x
    }

    fn map_into(
        &self,
        out: &mut HeightField,
        params: &SimulationParams,
        kernel: impl Fn(&Self, usize, usize) -> Vec4,
    ) {
        debug_assert_eq!(self.size, out.size);
        for y in 0..self.size {
            for x in 0..self.size {
                out.texels[y * self.size + x] = if self.in_domain(x, y, params) {
                    kernel(self, x, y)
                } else {
                    self.texel(x, y)
                };
            }
        }
    }

    pub fn add_drop_into(&self, out: &mut HeightField, params: &SimulationParams) {
        let center = params.drop.truncate().truncate() * 0.5 + 0.5;
        let radius = params.drop.z;
        let strength = params.drop.w;
        self.map_into(out, params, |field, x, y| {
            let mut info = field.texel(x, y);
            let falloff = (1.0 - center.distance(field.uv(x, y)) / radius).max(0.0);
            let falloff = 0.5 - (falloff * PI).cos() * 0.5;
            info.x += falloff * strength;
            info
        });
    }

    pub fn propagate_into(&self, out: &mut HeightField, params: &SimulationParams) {
        let damping = params.domain.y;
        self.map_into(out, params, |field, x, y| {
            let (ix, iy) = (x as isize, y as isize);
            let mut info = field.texel(x, y);
            let average = (field.clamped(ix - 1, iy).x
                + field.clamped(ix + 1, iy).x
                + field.clamped(ix, iy - 1).x
                + field.clamped(ix, iy + 1).x)
                * 0.25;
            info.y += (average - info.x) * 2.0;
            info.y *= damping;
            info.x += info.y;
            info
        });
    }

    pub fn normals_into(&self, out: &mut HeightField, params: &SimulationParams) {
        let delta = params.domain.z;
        self.map_into(out, params, |field, x, y| {
            let (ix, iy) = (x as isize, y as isize);
            let mut info = field.texel(x, y);
            let dx = Vec3::new(delta, field.clamped(ix + 1, iy).x - info.x, 0.0);
            let dz = Vec3::new(0.0, field.clamped(ix, iy + 1).x - info.x, delta);
            let normal = dz.cross(dx).normalize_or(Vec3::Y);
            info.z = normal.x;
            info.w = normal.z;
            info
        });
    }

    pub fn run_pass(&self, kind: &PassKind, params: &SimulationParams, out: &mut HeightField) {
        match kind {
            PassKind::Drop(_) => self.add_drop_into(out, params),
            PassKind::Propagate => self.propagate_into(out, params),
            PassKind::Normals => self.normals_into(out, params),
        }
    }
}

/// Height field simulated on the CPU when there is no render app.
#[derive(Resource, Clone, Debug)]
pub struct CpuHeightField(pub PingPong<HeightField>);

impl CpuHeightField {
    pub fn new(size: usize) -> Self {
        Self(PingPong::new(HeightField::new(size), HeightField::new(size)))
    }

    pub fn run(&mut self, plan: &SimulationPlan) {
        for pass in &plan.passes {
            if pass.read != self.0.current_index() {
                warn!(
                    "CPU height field out of step: plan reads slot {}, current is {}",
                    pass.read,
                    self.0.current_index()
                );
            }
            let (read, write) = self.0.split();
            read.run_pass(&pass.kind, &pass.params, write);
            self.0.swap();
        }
    }
}

pub fn run_plan_on_cpu(plan: Res<SimulationPlan>, mut field: ResMut<CpuHeightField>) {
    field.run(&plan);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::water::simulation::disturbance::Disturbance;
    use crate::water::simulation::schedule::{Domain, pass_params};

    const SIZE: usize = 256;

    fn domain(active_radius: f32) -> Domain {
        Domain {
            active_radius,
            damping: 0.995,
            texel_delta: 1.0 / SIZE as f32,
        }
    }

    fn run(field: &mut PingPong<HeightField>, kind: PassKind, domain: &Domain) {
        let params = pass_params(&kind, domain);
        let (read, write) = field.split();
        read.run_pass(&kind, &params, write);
        field.swap();
    }

    fn fresh() -> PingPong<HeightField> {
        PingPong::new(HeightField::new(SIZE), HeightField::new(SIZE))
    }

    #[test]
    fn test_drop_leaves_previous_buffer_untouched() {
        let mut field = fresh();
        let before = field.current().clone();
        run(&mut field, PassKind::Drop(Disturbance::new(0.0, 0.0, 0.03, 0.04)), &domain(1.0));
        assert_eq!(field.next(), &before, "drop must not write the buffer it reads");
        assert_ne!(field.current(), &before);
    }

    #[test]
    fn test_drop_has_bounded_support() {
        let mut field = fresh();
        let drop = Disturbance::new(0.2, -0.4, 0.05, 0.04);
        run(&mut field, PassKind::Drop(drop), &domain(1.0));
        let center = drop.center * 0.5 + 0.5;
        let current = field.current();
        for y in 0..SIZE {
            for x in 0..SIZE {
                let distance = center.distance(current.uv(x, y));
                if distance >= drop.radius {
                    assert_eq!(current.height(x, y), 0.0, "texel ({x}, {y}) outside the drop changed");
                }
            }
        }
    }

    #[test]
    fn test_outside_domain_passes_through() {
        let mut field = fresh();
        run(&mut field, PassKind::Drop(Disturbance::new(0.0, 0.0, 0.03, 0.04)), &domain(0.0));
        assert!(field.current().texels().iter().all(|t| *t == Vec4::ZERO));
    }

    #[test]
    fn test_estimate_normals_is_idempotent() {
        let mut field = fresh();
        let d = domain(1.0);
        run(&mut field, PassKind::Drop(Disturbance::new(0.1, 0.1, 0.05, 0.04)), &d);
        run(&mut field, PassKind::Propagate, &d);
        run(&mut field, PassKind::Normals, &d);
        let once = field.current().clone();
        run(&mut field, PassKind::Normals, &d);
        assert_eq!(field.current(), &once);
    }

    #[test]
    fn test_flat_field_normals_point_up() {
        let mut field = fresh();
        run(&mut field, PassKind::Normals, &domain(1.0));
        let t = field.current().texel(100, 100);
        assert_eq!((t.z, t.w), (0.0, 0.0));
    }

    #[test]
    fn test_normals_lean_away_from_slope() {
        let mut field = fresh();
        let d = domain(1.0);
        run(&mut field, PassKind::Drop(Disturbance::new(0.0, 0.0, 0.1, 0.04)), &d);
        run(&mut field, PassKind::Normals, &d);
        let current = field.current();
        // East of the peak the surface falls off towards +x.
        assert!(current.texel(140, 128).z > 0.0);
        // West of it the surface rises towards +x.
        assert!(current.texel(115, 128).z < 0.0);
    }

    #[test]
    fn test_single_drop_scenario() {
        let mut field = fresh();
        let d = domain(1.0);
        run(&mut field, PassKind::Drop(Disturbance::new(0.0, 0.0, 0.03, 0.04)), &d);
        run(&mut field, PassKind::Propagate, &d);
        run(&mut field, PassKind::Normals, &d);
        let current = field.current();

        // The drop is centered between texels 127 and 128.
        let peak = current.height(128, 128);
        assert!(peak > 0.03 && peak < 0.04, "peak height {peak}");
        for (x, y) in [(127, 127), (127, 128), (128, 127)] {
            assert!((current.height(x, y) - peak).abs() < 1e-6);
        }
        let max = current
            .texels()
            .iter()
            .map(|t| t.x)
            .fold(f32::MIN, f32::max);
        assert!((max - peak).abs() < 1e-6, "extremum must sit at the drop center");

        let row: Vec<f32> = (128..140).map(|x| current.height(x, 128)).collect();
        for pair in row.windows(2) {
            assert!(pair[1] <= pair[0], "height must fall off with distance: {row:?}");
        }

        // radius 0.03 spans ~7.7 texels, propagation widens that by one.
        for y in 0..SIZE {
            for x in 0..SIZE {
                let far = (x as isize - 128).abs() > 10 || (y as isize - 128).abs() > 10;
                if far {
                    assert_eq!(current.height(x, y), 0.0, "texel ({x}, {y}) moved");
                }
            }
        }
    }

    #[test]
    fn test_propagation_spreads_and_damps() {
        let mut field = fresh();
        let d = domain(1.0);
        run(&mut field, PassKind::Drop(Disturbance::new(0.0, 0.0, 0.03, 0.04)), &d);
        let peak = field.current().height(128, 128);
        for _ in 0..50 {
            run(&mut field, PassKind::Propagate, &d);
        }
        let current = field.current();
        assert!(current.height(128, 128).abs() < peak);
        assert!(current.height(128 + 30, 128) != 0.0, "wave should have travelled");
    }

    #[test]
    fn test_cpu_field_runs_plan() {
        use crate::water::simulation::schedule::SimulationPlan;

        let mut slots = PingPong::new((), ());
        let plan = SimulationPlan::build(
            &mut slots,
            [Disturbance::new(0.0, 0.0, 0.03, 0.04)],
            domain(1.0),
        );
        let mut cpu = CpuHeightField::new(32);
        cpu.run(&plan);
        assert_eq!(cpu.0.current_index(), plan.final_slot);
        assert!(cpu.0.current().height(16, 16) > 0.0);
    }
}
