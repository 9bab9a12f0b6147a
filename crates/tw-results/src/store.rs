//! Run storage API.
//!
//! Each run lives in `<root>/<run_id>/` with one result stream per model
//! and a `manifest.json`.

use crate::types::RunManifest;
use crate::{ResultsError, ResultsResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of result stream files.
pub const RESULT_EXTENSION: &str = "twr";

#[derive(Clone, Debug)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Store placed next to a run definition file, under `.tidewater/runs`.
    pub fn for_definition(definition_path: &Path) -> ResultsResult<Self> {
        let dir = definition_path
            .parent()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: "definition path has no parent directory".to_string(),
            })?;
        Self::new(dir.join(".tidewater").join("runs"))
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    /// Create (or reuse) the directory of a run.
    pub fn create_run_dir(&self, run_id: &str) -> ResultsResult<PathBuf> {
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// File name of a model's result stream.
    pub fn result_file_name(model: &str) -> String {
        format!("{model}.{RESULT_EXTENSION}")
    }

    pub fn result_path(&self, run_id: &str, model: &str) -> PathBuf {
        self.run_dir(run_id).join(Self::result_file_name(model))
    }

    pub fn has_run(&self, run_id: &str) -> bool {
        self.run_dir(run_id).join("manifest.json").exists()
    }

    pub fn save_manifest(&self, manifest: &RunManifest) -> ResultsResult<()> {
        let run_dir = self.create_run_dir(&manifest.run_id)?;
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(run_dir.join("manifest.json"), json)?;
        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let manifest_path = self.run_dir(run_id).join("manifest.json");

        if !manifest_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(manifest_path)?;
        let manifest = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    /// All runs with a readable manifest, optionally filtered by run name.
    pub fn list_runs(&self, run_name: Option<&str>) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();

        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            if let Ok(manifest) = self.load_manifest(&run_id) {
                if run_name.is_none_or(|name| manifest.run_name == name) {
                    runs.push(manifest);
                }
            }
        }
        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Ok(runs)
    }

    pub fn delete_run(&self, run_id: &str) -> ResultsResult<()> {
        let run_dir = self.run_dir(run_id);
        if run_dir.exists() {
            fs::remove_dir_all(run_dir)?;
        }
        Ok(())
    }
}
