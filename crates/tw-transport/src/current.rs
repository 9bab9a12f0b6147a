//! Prescribed current model.
//!
//! Samples a user-supplied flow field at every DOF and publishes the
//! hydrodynamic state the transport models read: nodal velocity, water
//! level and depth ([`CurrentData`]) and per-element mean velocity, eddy
//! diffusivity and wet state ([`FlowElementData`]).

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use nalgebra::Vector2;
use tracing::debug;
use tw_core::timing::{Timer, loop_timing};
use tw_core::{DofId, SimConfig, TimeSeries, TwError, clamp_non_negative};
use tw_mesh::{Domain, ExtKind};
use tw_results::{Field, FieldMask, ResultHeader, ResultWriter};

use crate::contract::{ResultOutput, SelfStepping};
use crate::error::TransportResult;

/// Hydrodynamic state at one DOF.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CurrentData {
    pub u: f64,
    pub v: f64,
    pub level: f64,
    /// Water depth, `max(level - z, 0)`.
    pub depth: f64,
    /// The node lies on an open (hydrodynamic) boundary.
    pub open_boundary: bool,
}

impl CurrentData {
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.u, self.v)
    }
}

/// Hydrodynamic state of one element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowElementData {
    pub mean_velocity: Vector2<f64>,
    pub eddy_diffusivity: f64,
    /// Number of dry nodes, 0..=3.
    pub wet_state: u8,
}

impl Default for FlowElementData {
    fn default() -> Self {
        Self {
            mean_velocity: Vector2::zeros(),
            eddy_diffusivity: 0.0,
            wet_state: 0,
        }
    }
}

impl FlowElementData {
    pub fn is_dry(&self) -> bool {
        self.wet_state >= crate::assembly::DRY
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlowSample {
    pub u: f64,
    pub v: f64,
    pub level: f64,
}

/// Velocity and water level as a function of position and time.
pub trait FlowField: Send + Sync {
    fn sample(&self, x: f64, y: f64, t: f64) -> FlowSample;
}

impl<F> FlowField for F
where
    F: Fn(f64, f64, f64) -> FlowSample + Send + Sync,
{
    fn sample(&self, x: f64, y: f64, t: f64) -> FlowSample {
        self(x, y, t)
    }
}

/// Spatially uniform velocity with a (possibly tidal) water level.
#[derive(Clone, Debug)]
pub struct UniformFlow {
    pub velocity: Vector2<f64>,
    pub level: TimeSeries,
}

impl UniformFlow {
    pub fn new(u: f64, v: f64, level: f64) -> Self {
        Self {
            velocity: Vector2::new(u, v),
            level: TimeSeries::constant(level),
        }
    }

    pub fn with_level(mut self, level: TimeSeries) -> Self {
        self.level = level;
        self
    }
}

impl FlowField for UniformFlow {
    fn sample(&self, _x: f64, _y: f64, t: f64) -> FlowSample {
        FlowSample {
            u: self.velocity.x,
            v: self.velocity.y,
            level: self.level.value(t),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CurrentParams {
    /// Background eddy diffusivity (m²/s).
    pub eddy_diffusivity: f64,
    /// Velocity-dependent dispersion: adds `dispersion * |u| * size` (-).
    pub dispersion: f64,
    /// DOFs on open boundaries.
    pub open_boundary: Vec<DofId>,
    /// Optional cap on the global step (s).
    pub max_step: Option<f64>,
    pub output: Option<PathBuf>,
}

pub struct PrescribedCurrent {
    name: String,
    flow: Box<dyn FlowField>,
    eddy_diffusivity: f64,
    dispersion: f64,
    max_step: Option<f64>,
    dry_depth: f64,
    dof_kind: ExtKind<CurrentData>,
    elem_kind: ExtKind<FlowElementData>,
    levels: Vec<f64>,
    output: Option<ResultWriter<BufWriter<File>>>,
}

impl PrescribedCurrent {
    /// Attach current records to every DOF and element of `domain`.
    pub fn new(
        name: impl Into<String>,
        flow: impl FlowField + 'static,
        domain: &mut Domain,
        config: &SimConfig,
        params: CurrentParams,
    ) -> TransportResult<Self> {
        let name = name.into();
        let n = domain.dof_count();

        let mut open = vec![false; n];
        for dof in &params.open_boundary {
            let flag = open.get_mut(dof.idx()).ok_or(TwError::IndexOob {
                what: "open boundary DOF",
                index: dof.idx(),
                len: n,
            })?;
            *flag = true;
        }

        let dof_kind = domain.dofs.register::<CurrentData>();
        for (i, open_boundary) in open.into_iter().enumerate() {
            domain.dofs.attach(
                i,
                CurrentData {
                    open_boundary,
                    ..CurrentData::default()
                },
            )?;
        }
        let elem_kind = domain.elements.register::<FlowElementData>();
        for e in 0..domain.element_count() {
            domain.elements.attach(e, FlowElementData::default())?;
        }

        let output = match params.output {
            Some(path) => {
                let mask = FieldMask::EMPTY
                    .with(Field::Position)
                    .with(Field::Depth)
                    .with(Field::Velocity);
                let header = ResultHeader::from_mesh(name.as_str(), &domain.mesh, mask);
                Some(ResultWriter::create(&path, &header)?)
            }
            None => None,
        };

        Ok(Self {
            name,
            flow: Box::new(flow),
            eddy_diffusivity: params.eddy_diffusivity,
            dispersion: params.dispersion,
            max_step: params.max_step,
            dry_depth: config.wet_dry.dry_depth_m(),
            dof_kind,
            elem_kind,
            levels: vec![0.0; n],
            output,
        })
    }

    /// Sample the flow field at `t` and refresh every record.
    fn update(&mut self, t: f64, domain: &mut Domain) {
        let flow = &*self.flow;
        let mesh = &domain.mesh;
        domain.dofs.par_for_each_mut(self.dof_kind, |i, rec| {
            let dof = &mesh.dofs()[i];
            let s = flow.sample(dof.x, dof.y, t);
            rec.u = s.u;
            rec.v = s.v;
            rec.level = s.level;
            rec.depth = clamp_non_negative(s.level - dof.z);
        });

        let nodal: Vec<(Vector2<f64>, f64)> = (0..domain.dof_count())
            .map(|i| {
                domain
                    .dofs
                    .extract(self.dof_kind, i)
                    .map_or((Vector2::zeros(), 0.0), |c| (c.velocity(), c.depth))
            })
            .collect();
        for (level, i) in self.levels.iter_mut().zip(0..) {
            *level = domain.dofs.extract(self.dof_kind, i).map_or(0.0, |c| c.level);
        }

        let (eddy, dispersion, dry) = (self.eddy_diffusivity, self.dispersion, self.dry_depth);
        domain.elements.par_for_each_mut(self.elem_kind, |e, rec| {
            let element = &mesh.elements()[e];
            let [a, b, c] = element.nodes();
            let mean = (nodal[a].0 + nodal[b].0 + nodal[c].0) / 3.0;
            let dry_nodes = [a, b, c].iter().filter(|&&i| nodal[i].1 < dry).count();
            rec.mean_velocity = mean;
            rec.eddy_diffusivity = eddy + dispersion * mean.norm() * element.shape.size();
            rec.wet_state = dry_nodes as u8;
        });
    }

    pub fn dof_kind(&self) -> ExtKind<CurrentData> {
        self.dof_kind
    }

    pub fn element_kind(&self) -> ExtKind<FlowElementData> {
        self.elem_kind
    }
}

impl ResultOutput for PrescribedCurrent {
    fn write_result(&mut self, t: f64, state: &[f64], domain: &Domain) -> TransportResult<()> {
        let Some(writer) = self.output.as_mut() else {
            return Ok(());
        };
        let timer = Timer::start();
        let n = domain.dof_count();
        let mut depth = Vec::with_capacity(n);
        let mut velocity = Vec::with_capacity(2 * n);
        for i in 0..n {
            let c = domain.dofs.extract(self.dof_kind, i).copied().unwrap_or_default();
            depth.push(c.depth);
            velocity.push(c.u);
            velocity.push(c.v);
        }
        writer.write_record(
            t,
            &[
                (Field::Position, state),
                (Field::Depth, &depth[..]),
                (Field::Velocity, &velocity[..]),
            ],
        )?;
        timer.stop_into(&loop_timing::RESULT_WRITE);
        Ok(())
    }

    fn records_written(&self) -> usize {
        self.output.as_ref().map_or(0, |w| w.records_written())
    }

    fn flush(&mut self) -> TransportResult<()> {
        if let Some(w) = self.output.as_mut() {
            w.flush()?;
        }
        Ok(())
    }
}

impl SelfStepping for PrescribedCurrent {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, t: f64, domain: &mut Domain) -> TransportResult<()> {
        self.update(t, domain);
        debug!(model = %self.name, t, "current initialized");
        Ok(())
    }

    fn time_step(&mut self, t: f64, dt: f64, domain: &mut Domain) -> TransportResult<()> {
        self.update(t + dt, domain);
        Ok(())
    }

    fn max_time_step(&self) -> Option<f64> {
        self.max_step
    }

    fn state(&self) -> &[f64] {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_mesh::MeshBuilder;

    fn domain() -> Domain {
        // bed at -2 m
        Domain::new(MeshBuilder::rectangle(2, 1, 10.0, 10.0, -2.0).build().unwrap())
    }

    #[test]
    fn publishes_depth_and_element_means() {
        let mut domain = domain();
        let params = CurrentParams {
            eddy_diffusivity: 0.1,
            dispersion: 0.5,
            open_boundary: vec![DofId::from_index(0)],
            ..CurrentParams::default()
        };
        let mut current = PrescribedCurrent::new(
            "current",
            UniformFlow::new(0.3, 0.4, 1.0),
            &mut domain,
            &SimConfig::default(),
            params,
        )
        .unwrap();
        current.initialize(0.0, &mut domain).unwrap();

        let c0 = domain.dofs.get::<CurrentData>(0).unwrap();
        assert!(c0.open_boundary);
        assert_eq!(c0.depth, 3.0);
        assert!(!domain.dofs.get::<CurrentData>(1).unwrap().open_boundary);

        let e = domain.elements.get::<FlowElementData>(0).unwrap();
        assert!((e.mean_velocity - Vector2::new(0.3, 0.4)).norm() < 1e-15);
        let size = domain.mesh.elements()[0].shape.size();
        assert!((e.eddy_diffusivity - (0.1 + 0.5 * 0.5 * size)).abs() < 1e-12);
        assert_eq!(e.wet_state, 0);
        let by_kind = domain.elements.extract(current.element_kind(), 1).unwrap();
        assert_eq!(by_kind.wet_state, 0);
        assert_eq!(current.state(), &[1.0; 6]);
    }

    #[test]
    fn falling_level_dries_elements() {
        let mut domain = domain();
        let tide = TimeSeries::new(vec![(0.0, 1.0), (100.0, -3.0), (200.0, 1.0)]).unwrap();
        let mut current = PrescribedCurrent::new(
            "current",
            UniformFlow::new(0.0, 0.0, 0.0).with_level(tide),
            &mut domain,
            &SimConfig::default(),
            CurrentParams::default(),
        )
        .unwrap();
        current.initialize(0.0, &mut domain).unwrap();
        assert!(!domain.elements.get::<FlowElementData>(0).unwrap().is_dry());

        current.time_step(0.0, 100.0, &mut domain).unwrap();
        assert_eq!(domain.dofs.get::<CurrentData>(3).unwrap().depth, 0.0);
        assert!(domain.elements.get::<FlowElementData>(0).unwrap().is_dry());
    }

    #[test]
    fn sloping_bed_partially_dries() {
        let mut mesh = MeshBuilder::rectangle(1, 1, 10.0, 10.0, -1.0).build().unwrap();
        mesh.set_elevation(DofId::from_index(3), 0.5).unwrap();
        let mut domain = Domain::new(mesh);
        let mut current = PrescribedCurrent::new(
            "current",
            |_x: f64, _y: f64, _t: f64| FlowSample {
                u: 0.1,
                v: 0.0,
                level: 0.0,
            },
            &mut domain,
            &SimConfig::default(),
            CurrentParams::default(),
        )
        .unwrap();
        current.initialize(0.0, &mut domain).unwrap();
        // node 3 is in both triangles
        for e in 0..2 {
            assert_eq!(domain.elements.get::<FlowElementData>(e).unwrap().wet_state, 1);
        }
    }

    #[test]
    fn open_boundary_out_of_range_is_rejected() {
        let mut domain = domain();
        let params = CurrentParams {
            open_boundary: vec![DofId::from_index(40)],
            ..CurrentParams::default()
        };
        assert!(
            PrescribedCurrent::new(
                "current",
                UniformFlow::new(0.0, 0.0, 0.0),
                &mut domain,
                &SimConfig::default(),
                params,
            )
            .is_err()
        );
    }
}
