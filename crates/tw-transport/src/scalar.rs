//! Generic scalar transport engine.
//!
//! [`ScalarTransport<S>`] advects and diffuses one depth-averaged scalar with
//! the current model's velocity, depth and eddy diffusivity, and adds the
//! reaction term of its source `S`. Every concrete model (salinity, tracer,
//! nitrogen, ...) is this engine with a different `S`.
//!
//! Each DOF carries one [`TransportData<S>`] record holding the published
//! value, the lagged time derivative, an optional prescribed boundary series
//! and the extrapolation link.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use nalgebra::Vector2;
use rayon::prelude::*;
use tracing::{debug, warn};
use tw_core::timing::{Timer, loop_timing};
use tw_core::{DofId, SimConfig, TimeSeries, clamp_non_negative};
use tw_mesh::{Domain, ExtKind};
use tw_results::{BoundaryCondition, FieldMask, ResultHeader, ResultWriter, read_start_state};

use crate::assembly::{
    AssemblyParams, ElementContribution, ElementInput, NodeInput, NodeResidual, assemble,
};
use crate::contract::{BoundaryEnforcement, OdeModel, ResultOutput};
use crate::current::{CurrentData, FlowElementData};
use crate::error::{TransportError, TransportResult};
use crate::executor::ElementExecutor;
use crate::initial::{InitialCondition, inverse_distance};
use crate::source::{SourceContext, SourceTerm};

/// Weight of the node's own value when blending an extrapolating node.
const EXTRAPOLATION_SELF_WEIGHT: f64 = 0.9;

/// Per-DOF record of the model driven by source term `S`.
pub struct TransportData<S: SourceTerm> {
    /// Value at the start of the latest rate evaluation.
    pub value: f64,
    /// Time derivative from the latest rate evaluation.
    pub dcdt: f64,
    pub boundary: Option<TimeSeries>,
    /// Boundary node without a prescribed value, next to an open boundary.
    pub extrapolate: bool,
    /// Non-extrapolating neighbour used for blending.
    pub neighbour: Option<usize>,
    pub fluxes: S::Fluxes,
}

impl<S: SourceTerm> TransportData<S> {
    pub fn with_value(value: f64) -> Self {
        Self {
            value,
            dcdt: 0.0,
            boundary: None,
            extrapolate: false,
            neighbour: None,
            fluxes: S::Fluxes::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TransportOptions {
    pub initial: InitialCondition,
    /// Prescribed values; each is claimed by the DOF it names.
    pub boundary: Vec<BoundaryCondition>,
    pub output: Option<PathBuf>,
}

pub struct ScalarTransport<S: SourceTerm> {
    name: String,
    source: S,
    kind: ExtKind<TransportData<S>>,
    links: S::Links,
    current: ExtKind<CurrentData>,
    flow: ExtKind<FlowElementData>,
    executor: ElementExecutor,
    params: AssemblyParams,
    initial: InitialCondition,
    /// `3 / incident_elements` per DOF.
    normalization: Vec<f64>,
    sources: Vec<f64>,
    residuals: Vec<NodeResidual>,
    dt_limit: Option<f64>,
    output: Option<ResultWriter<BufWriter<File>>>,
}

impl<S: SourceTerm> ScalarTransport<S> {
    /// Attach a record to every DOF.
    ///
    /// The current model must already be part of `domain`. Fails if a model
    /// with the same source type was built on this domain before, or if the
    /// result stream cannot be created.
    pub fn new(
        name: impl Into<String>,
        source: S,
        domain: &mut Domain,
        config: &SimConfig,
        executor: ElementExecutor,
        options: TransportOptions,
    ) -> TransportResult<Self> {
        let name = name.into();
        let current = domain
            .dofs
            .kind::<CurrentData>()
            .ok_or(TransportError::MissingUpstream {
                what: "current model must be added before transport models",
            })?;
        let flow = domain
            .elements
            .kind::<FlowElementData>()
            .ok_or(TransportError::MissingUpstream {
                what: "current model must be added before transport models",
            })?;

        let kind = domain.dofs.register::<TransportData<S>>();
        let links = S::link(&mut domain.dofs);
        let mut pending = options.boundary;
        for dof in 0..domain.dof_count() {
            let record = Self::gen_data(dof, &mut pending, domain, current);
            domain.dofs.attach(dof, record)?;
        }
        if !pending.is_empty() {
            warn!(
                model = %name,
                unclaimed = pending.len(),
                "boundary conditions name DOFs outside the mesh"
            );
        }
        Self::link_extrapolation(kind, domain);

        let normalization = (0..domain.dof_count())
            .map(|i| match domain.mesh.incident_count(DofId::from_usize(i)) {
                0 => 0.0,
                n => 3.0 / n as f64,
            })
            .collect();

        let output = match options.output {
            Some(path) => {
                let mask = FieldMask::EMPTY.with(source.output_field());
                let header = ResultHeader::from_mesh(name.as_str(), &domain.mesh, mask);
                Some(ResultWriter::create(&path, &header)?)
            }
            None => None,
        };

        let n = domain.dof_count();
        debug!(model = %name, dofs = n, "transport model built");
        Ok(Self {
            name,
            source,
            kind,
            links,
            current,
            flow,
            executor,
            params: AssemblyParams::from_config(config),
            initial: options.initial,
            normalization,
            sources: vec![0.0; n],
            residuals: vec![NodeResidual::ZERO; n],
            dt_limit: None,
            output,
        })
    }

    /// Build the record for one DOF, claiming its boundary condition.
    fn gen_data(
        dof: usize,
        pending: &mut Vec<BoundaryCondition>,
        domain: &Domain,
        current: ExtKind<CurrentData>,
    ) -> TransportData<S> {
        let boundary = pending
            .iter()
            .position(|bc| bc.dof.idx() == dof)
            .map(|p| pending.swap_remove(p).series);
        let open = domain
            .dofs
            .extract(current, dof)
            .is_some_and(|c| c.open_boundary);
        TransportData {
            extrapolate: boundary.is_none() && open,
            boundary,
            ..TransportData::with_value(0.0)
        }
    }

    /// Point every extrapolating DOF at its lowest-index neighbour that is
    /// not extrapolating itself.
    fn link_extrapolation(kind: ExtKind<TransportData<S>>, domain: &mut Domain) {
        let n = domain.dof_count();
        let flags: Vec<bool> = (0..n)
            .map(|i| domain.dofs.extract(kind, i).is_some_and(|r| r.extrapolate))
            .collect();
        for i in (0..n).filter(|&i| flags[i]) {
            let neighbour = domain
                .mesh
                .neighbours(DofId::from_usize(i))
                .into_iter()
                .map(|d| d.idx())
                .find(|&j| !flags[j]);
            if neighbour.is_none() {
                debug!(dof = i, "extrapolating DOF has no usable neighbour");
            }
            if let Some(rec) = domain.dofs.extract_mut(kind, i) {
                rec.neighbour = neighbour;
            }
        }
    }

    pub fn kind(&self) -> ExtKind<TransportData<S>> {
        self.kind
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Source values from the latest rate evaluation.
    pub fn sources(&self) -> &[f64] {
        &self.sources
    }

    fn check_len(&self, len: usize, expected: usize) -> TransportResult<()> {
        if len != expected {
            return Err(TransportError::StateLength {
                model: self.name.clone(),
                expected,
                got: len,
            });
        }
        Ok(())
    }

    /// Evaluate every DOF's source in parallel, then publish the fluxes.
    fn evaluate_sources(&mut self, t: f64, values: &[f64], domain: &mut Domain) {
        let source = &self.source;
        let links = &self.links;
        let current = self.current;
        let dofs = &domain.dofs;
        let evaluated: Vec<(f64, S::Fluxes)> = self.executor.install(|| {
            values
                .par_iter()
                .enumerate()
                .map(|(dof, &value)| {
                    let ctx = SourceContext {
                        dof,
                        t,
                        value,
                        current: dofs.extract(current, dof),
                        dofs,
                    };
                    source.evaluate(&ctx, links)
                })
                .collect()
        });

        let kind = self.kind;
        for (dof, (s, fluxes)) in evaluated.into_iter().enumerate() {
            self.sources[dof] = s;
            if let Some(rec) = domain.dofs.extract_mut(kind, dof) {
                rec.fluxes = fluxes;
            }
        }
    }
}

impl<S: SourceTerm> BoundaryEnforcement for ScalarTransport<S> {
    fn set_boundary_conditions(&mut self, t: f64, state: &mut [f64], domain: &mut Domain) {
        let mut links = Vec::new();
        domain.dofs.for_each_mut(self.kind, |i, rec| {
            state[i] = clamp_non_negative(state[i]);
            if let Some(series) = &rec.boundary {
                state[i] = clamp_non_negative(series.value(t));
                rec.dcdt = series.derivative(t);
            } else if rec.extrapolate {
                if let Some(j) = rec.neighbour {
                    links.push((i, j));
                }
            }
        });
        // Neighbours never extrapolate, so blending order does not matter.
        for (i, j) in links {
            state[i] =
                EXTRAPOLATION_SELF_WEIGHT * state[i] + (1.0 - EXTRAPOLATION_SELF_WEIGHT) * state[j];
        }
    }
}

impl<S: SourceTerm> OdeModel for ScalarTransport<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn initial_state(&mut self, t: f64, domain: &mut Domain) -> TransportResult<Vec<f64>> {
        let n = domain.dof_count();
        let mut state = match &self.initial {
            InitialCondition::Constant(c) => vec![*c; n],
            InitialCondition::FromBoundaries => {
                let samples: Vec<(usize, f64)> = (0..n)
                    .filter_map(|i| {
                        let rec = domain.dofs.extract(self.kind, i)?;
                        rec.boundary.as_ref().map(|s| (i, s.value(t)))
                    })
                    .collect();
                inverse_distance(&domain.mesh, &samples)?
            }
            InitialCondition::FromResult { path, record } => {
                read_start_state(path, n, *record, self.source.output_field())?
            }
        };
        for v in &mut state {
            *v = clamp_non_negative(*v);
        }
        Ok(state)
    }

    fn rate_of_change(
        &mut self,
        t: f64,
        state: &mut [f64],
        rate: &mut [f64],
        domain: &mut Domain,
    ) -> TransportResult<()> {
        let n = domain.dof_count();
        self.check_len(state.len(), n)?;
        self.check_len(rate.len(), n)?;

        let timer = Timer::start();
        self.set_boundary_conditions(t, state, domain);
        timer.stop_into(&loop_timing::BOUNDARY);

        let kind = self.kind;
        let values: &[f64] = state;
        self.executor
            .install(|| domain.dofs.par_for_each_mut(kind, |i, rec| rec.value = values[i]));

        let timer = Timer::start();
        self.evaluate_sources(t, values, domain);
        timer.stop_into(&loop_timing::SOURCES);

        // Snapshot of everything the element loop reads per node.
        let current = self.current;
        let sources = &self.sources;
        let dofs = &domain.dofs;
        let nodes: Vec<NodeInput> = self.executor.install(|| {
            (0..n)
                .into_par_iter()
                .map(|i| {
                    let (velocity, depth) = dofs
                        .extract(current, i)
                        .map_or((Vector2::zeros(), 0.0), |c| (c.velocity(), c.depth));
                    NodeInput {
                        value: values[i],
                        dcdt: dofs.extract(kind, i).map_or(0.0, |r| r.dcdt),
                        source: sources[i],
                        velocity,
                        depth,
                    }
                })
                .collect()
        });

        let timer = Timer::start();
        let flow = self.flow;
        let params = self.params;
        let element_data = &domain.elements;
        let dt = self.executor.run(domain.mesh.elements(), &mut self.residuals, |element| {
            let Some(data) = element_data.extract(flow, element.id.idx()) else {
                return ElementContribution::SKIPPED;
            };
            let [a, b, c] = element.nodes();
            assemble(
                &ElementInput {
                    shape: &element.shape,
                    nodes: [nodes[a], nodes[b], nodes[c]],
                    mean_velocity: data.mean_velocity,
                    eddy_diffusivity: data.eddy_diffusivity,
                    wet_state: data.wet_state,
                },
                &params,
            )
        });
        timer.stop_into(&loop_timing::ELEMENT_LOOP);

        for ((r, residual), f) in rate.iter_mut().zip(&self.residuals).zip(&self.normalization) {
            *r = residual.scaled(*f).limited();
        }
        domain.dofs.for_each_mut(kind, |i, rec| {
            if rec.boundary.is_some() {
                rate[i] = rec.dcdt;
            }
            rec.dcdt = rate[i];
        });

        self.dt_limit = dt.is_finite().then_some(dt);
        Ok(())
    }

    fn max_time_step(&self) -> Option<f64> {
        self.dt_limit
    }
}

impl<S: SourceTerm> ResultOutput for ScalarTransport<S> {
    fn write_result(&mut self, t: f64, state: &[f64], _domain: &Domain) -> TransportResult<()> {
        let field = self.source.output_field();
        let Some(writer) = self.output.as_mut() else {
            return Ok(());
        };
        let timer = Timer::start();
        writer.write_record(t, &[(field, state)])?;
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
