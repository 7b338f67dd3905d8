//! The state object threaded from one stage to the next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::run_id::RunIdentifier;
use crate::models::stage::StageId;
use crate::params::ParameterStore;

/// Bookkeeping about how a run was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Upstream run this one resumed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_run: Option<RunIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_run_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_file: Option<PathBuf>,
    /// SHA-256 of the control-file text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_file_sha256: Option<String>,
    /// Steps whose `skip_<step>` flag was honored
    #[serde(default)]
    pub skipped_steps: Vec<String>,
    #[serde(default)]
    pub testing: bool,
    /// Free-form notes added by the stage function
    #[serde(default)]
    pub notes: Vec<String>,
    pub tool_version: String,
}

impl Provenance {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            prior_run: None,
            prior_run_dir: None,
            control_file: None,
            control_file_sha256: None,
            skipped_steps: Vec::new(),
            testing: false,
            notes: Vec::new(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn was_skipped(&self, step: &str) -> bool {
        self.skipped_steps.iter().any(|s| s == step)
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration, payload reference and provenance of one stage run.
///
/// The payload is opaque to the orchestration core: it holds whatever the
/// stage function chose to record (file names, table handles, scalar
/// summaries) and is never inspected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub stage: StageId,
    /// Set when the run is committed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunIdentifier>,
    pub parameters: ParameterStore,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub provenance: Provenance,
}

impl RunState {
    pub fn new(stage: StageId, parameters: ParameterStore) -> Self {
        Self {
            stage,
            run_id: None,
            parameters,
            payload: serde_json::Value::Null,
            provenance: Provenance::new(),
        }
    }

    /// Seed a fresh state for `stage` from the upstream run it resumes from.
    ///
    /// The upstream payload reference is carried forward so a stage that
    /// only adds to it does not have to copy it by hand.
    pub fn seeded_from(stage: StageId, parameters: ParameterStore, prior: &RunState) -> Self {
        let mut state = Self::new(stage, parameters);
        state.payload = prior.payload.clone();
        state.provenance.prior_run = prior.run_id.clone();
        state
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.provenance.notes.push(note.into());
        self
    }

    pub fn is_committed(&self) -> bool {
        self.run_id.is_some()
    }
}
