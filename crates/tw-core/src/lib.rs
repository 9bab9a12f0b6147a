//! tw-core: stable foundation for tidewater.
//!
//! Contains:
//! - units (uom lengths + constants)
//! - numeric (Real + NaN-preserving float helpers)
//! - ids (compact IDs for DOFs and elements)
//! - error (shared error types)
//! - config (run-wide settings threaded into model construction)
//! - series (periodic piecewise-linear time series)
//! - timing (opt-in phase timers)

pub mod config;
pub mod error;
pub mod ids;
pub mod numeric;
pub mod series;
pub mod timing;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use config::{Accumulation, SimConfig, Stabilization, WetDry};
pub use error::{TwError, TwResult};
pub use ids::*;
pub use numeric::*;
pub use series::TimeSeries;
pub use units::*;
