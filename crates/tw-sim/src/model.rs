//! Composite model handles.
//!
//! Whether a model is stepped by an integrator or steps itself is decided
//! once, when it is added to the simulation.

use tw_core::first_non_finite;
use tw_mesh::Domain;
use tw_transport::{OdeModel, SelfStepping, TransportResult};

/// Position of a model in the run's insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelIndex(pub usize);

pub enum ModelSlot {
    Ode {
        model: Box<dyn OdeModel>,
        state: Vec<f64>,
        /// Rate applied in the latest step.
        rate: Vec<f64>,
    },
    Stepping(Box<dyn SelfStepping>),
}

impl ModelSlot {
    pub fn name(&self) -> &str {
        match self {
            ModelSlot::Ode { model, .. } => model.name(),
            ModelSlot::Stepping(model) => model.name(),
        }
    }

    pub fn state(&self) -> &[f64] {
        match self {
            ModelSlot::Ode { state, .. } => state,
            ModelSlot::Stepping(model) => model.state(),
        }
    }

    pub fn max_time_step(&self) -> Option<f64> {
        match self {
            ModelSlot::Ode { model, .. } => model.max_time_step(),
            ModelSlot::Stepping(model) => model.max_time_step(),
        }
    }

    /// Index of the first NaN or infinite state entry.
    pub fn first_non_finite(&self) -> Option<usize> {
        first_non_finite(self.state())
    }

    pub fn records_written(&self) -> usize {
        match self {
            ModelSlot::Ode { model, .. } => model.records_written(),
            ModelSlot::Stepping(model) => model.records_written(),
        }
    }

    pub(crate) fn write_result(&mut self, t: f64, domain: &Domain) -> TransportResult<()> {
        match self {
            ModelSlot::Ode { model, state, .. } => model.write_result(t, state, domain),
            ModelSlot::Stepping(model) => {
                let snapshot = model.state().to_vec();
                model.write_result(t, &snapshot, domain)
            }
        }
    }

    pub(crate) fn flush(&mut self) -> TransportResult<()> {
        match self {
            ModelSlot::Ode { model, .. } => model.flush(),
            ModelSlot::Stepping(model) => model.flush(),
        }
    }
}

impl std::fmt::Debug for ModelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ModelSlot::Ode { .. } => "ode",
            ModelSlot::Stepping(_) => "self-stepping",
        };
        f.debug_struct("ModelSlot")
            .field("name", &self.name())
            .field("kind", &kind)
            .field("dofs", &self.state().len())
            .finish()
    }
}
