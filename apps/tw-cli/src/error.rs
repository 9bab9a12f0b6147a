//! Error type of the command-line driver.

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Project error: {0}")]
    Project(#[from] tw_project::ProjectError),

    #[error("Mesh error: {0}")]
    Mesh(#[from] tw_mesh::MeshError),

    #[error("Transport error: {0}")]
    Transport(#[from] tw_transport::TransportError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] tw_sim::SimError),

    #[error("Results error: {0}")]
    Results(#[from] tw_results::ResultsError),

    #[error("Core error: {0}")]
    Core(#[from] tw_core::TwError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type CliResult<T> = Result<T, CliError>;
