//! Error types for simulation runs.

use thiserror::Error;

/// Errors encountered while setting up or advancing a simulation.
///
/// Numeric divergence is not an error: it is logged and reported in the
/// [`RunSummary`](crate::RunSummary).
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Simulation state: {what}")]
    State { what: &'static str },

    #[error("Model '{model}': {source}")]
    Model {
        model: String,
        #[source]
        source: tw_transport::TransportError,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] tw_transport::TransportError),

    #[error("Core error: {0}")]
    Core(#[from] tw_core::TwError),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn model(name: &str) -> impl FnOnce(tw_transport::TransportError) -> SimError + '_ {
        move |source| SimError::Model {
            model: name.to_string(),
            source,
        }
    }
}
