//! Error types for transport models.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Model '{model}' expects {expected} values, got {got}")]
    StateLength {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("Missing upstream model: {what}")]
    MissingUpstream { what: &'static str },

    #[error("Thread pool error: {message}")]
    ThreadPool { message: String },

    #[error("Mesh error: {0}")]
    Mesh(#[from] tw_mesh::MeshError),

    #[error("Results error: {0}")]
    Results(#[from] tw_results::ResultsError),

    #[error("Core error: {0}")]
    Core(#[from] tw_core::TwError),
}

pub type TransportResult<T> = Result<T, TransportError>;
