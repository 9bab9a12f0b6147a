//! Capability traits for transport models.
//!
//! A model implements only what its physics needs. The integrator decides
//! once, when a model is added, whether it advances it with an explicit
//! single-step scheme ([`OdeModel`]) or lets it step itself
//! ([`SelfStepping`]).

use tw_mesh::Domain;

use crate::error::TransportResult;

/// Serialization of time records to the model's result stream.
pub trait ResultOutput {
    /// Append one record for `state` at time `t`.
    ///
    /// Models without an output stream accept the call and do nothing.
    fn write_result(&mut self, t: f64, state: &[f64], domain: &Domain) -> TransportResult<()>;

    /// Number of records written so far.
    fn records_written(&self) -> usize;

    fn flush(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

/// Boundary enforcement on a state vector.
pub trait BoundaryEnforcement {
    /// Clamp negative values, impose prescribed values and blend
    /// extrapolating boundary nodes with their neighbour.
    fn set_boundary_conditions(&mut self, t: f64, state: &mut [f64], domain: &mut Domain);
}

/// A field advanced by the integrator from its rate of change.
pub trait OdeModel: ResultOutput + Send {
    fn name(&self) -> &str;

    /// Initial state vector, one value per DOF.
    fn initial_state(&mut self, t: f64, domain: &mut Domain) -> TransportResult<Vec<f64>>;

    /// Evaluate `rate = dC/dt` at `(t, state)`.
    ///
    /// Boundary conditions are applied to `state` in place first. The
    /// evaluation also refreshes the model's lagged derivative and its
    /// step limit.
    fn rate_of_change(
        &mut self,
        t: f64,
        state: &mut [f64],
        rate: &mut [f64],
        domain: &mut Domain,
    ) -> TransportResult<()>;

    /// Stability limit from the latest rate evaluation; `None` when no
    /// element constrains the step.
    fn max_time_step(&self) -> Option<f64>;
}

/// A model that owns its state and advances it internally.
pub trait SelfStepping: ResultOutput + Send {
    fn name(&self) -> &str;

    /// Publish the state at the start time.
    fn initialize(&mut self, t: f64, domain: &mut Domain) -> TransportResult<()>;

    /// Advance from `t` to `t + dt`.
    fn time_step(&mut self, t: f64, dt: f64, domain: &mut Domain) -> TransportResult<()>;

    fn max_time_step(&self) -> Option<f64>;

    /// Current state, used for divergence checks and result records.
    fn state(&self) -> &[f64];
}
