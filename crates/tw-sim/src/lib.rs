//! Multi-model time integration for tidewater.
//!
//! Provides:
//! - Explicit single-step integrators (forward Euler, Heun)
//! - Composite model handles deciding once between ODE-style and
//!   self-stepping advancement
//! - The interval/sub-step loop under a global stability-limited step
//! - Divergence detection and progress reporting

pub mod error;
pub mod integrator;
pub mod model;
pub mod sim;

pub use error::{SimError, SimResult};
pub use integrator::{ForwardEuler, Heun, Integrator, IntegratorType};
pub use model::{ModelIndex, ModelSlot};
pub use sim::{RunSummary, SimOptions, SimProgress, Simulation};
