//! tw-results: result streams, boundary-condition files and the run store.

pub mod boundary;
pub mod field;
pub mod hash;
pub mod store;
pub mod stream;
pub mod types;

pub use boundary::{BoundaryCondition, parse_boundary_conditions, read_boundary_file};
pub use field::{Field, FieldMask};
pub use hash::{compute_run_id, compute_run_id_with_inputs};
pub use store::RunStore;
pub use stream::{ResultHeader, ResultReader, ResultWriter, read_start_state};
pub use types::*;

use tw_core::TwError;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] TwError),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    #[error("Malformed result stream: {message}")]
    MalformedStream { message: String },

    #[error("Node count mismatch: file has {file}, mesh has {mesh}")]
    NodeCountMismatch { file: usize, mesh: usize },

    #[error("Record {record} out of range (stream holds {count})")]
    RecordOutOfRange { record: usize, count: usize },

    #[error("Field {field:?} not present in stream")]
    FieldNotPresent { field: Field },

    #[error("Field {field:?} expects {expected} values, got {got}")]
    FieldLength {
        field: Field,
        expected: usize,
        got: usize,
    },

    #[error("Boundary file line {line}: {message}")]
    BoundaryParse { line: usize, message: String },
}
