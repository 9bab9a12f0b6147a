//! tw-project: run definition file format and validation.

pub mod schema;
pub mod validate;

pub use schema::*;
pub use validate::{ValidationError, validate_run};

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn load_yaml(path: &std::path::Path) -> ProjectResult<RunDef> {
    let content = std::fs::read_to_string(path)?;
    let run: RunDef = serde_yaml::from_str(&content)?;
    validate_run(&run)?;
    Ok(run)
}

pub fn save_yaml(path: &std::path::Path, run: &RunDef) -> ProjectResult<()> {
    validate_run(run)?;
    let content = serde_yaml::to_string(run)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &std::path::Path) -> ProjectResult<RunDef> {
    let content = std::fs::read_to_string(path)?;
    let run: RunDef = serde_json::from_str(&content)?;
    validate_run(&run)?;
    Ok(run)
}

pub fn save_json(path: &std::path::Path, run: &RunDef) -> ProjectResult<()> {
    validate_run(run)?;
    let content = serde_json::to_string_pretty(run)?;
    std::fs::write(path, content)?;
    Ok(())
}
