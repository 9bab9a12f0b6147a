//! Run manifest types.

use serde::{Deserialize, Serialize};

use crate::field::FieldMask;

pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: RunId,
    pub run_name: String,
    pub timestamp: String,
    pub solver_version: String,
    pub time: TimeWindow,
    pub models: Vec<ModelOutput>,
    pub outcome: RunOutcome,
}

/// Simulated time span in seconds since the reference date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_s: f64,
    pub end_s: f64,
    /// Result interval; `<= 0` means a record after every sub-step.
    pub interval_s: f64,
}

/// One model's result stream within a run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub name: String,
    /// File name relative to the run directory.
    pub file: String,
    pub mask: FieldMask,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub sub_steps: usize,
    pub records: usize,
    pub min_step_s: Option<f64>,
    pub max_step_s: Option<f64>,
    /// First simulated time at which a non-finite state was seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diverged_at_s: Option<f64>,
}

impl RunOutcome {
    pub fn diverged(&self) -> bool {
        self.diverged_at_s.is_some()
    }
}

/// Current UTC time in RFC 3339 form, as stored in manifests.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339()
}
