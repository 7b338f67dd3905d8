//! Error taxonomy for the orchestration core
//!
//! Every failure the core can surface maps onto one [`PipelineError`] variant,
//! and every variant belongs to exactly one [`ErrorClass`] so an operator can
//! tell "fix the control file" apart from "re-run the producing stage".

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Broad class of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// Control file or parameter problems
    Configuration,
    /// No usable upstream run, or more than one
    RunResolution,
    /// Run-state records could not be written or read back
    Storage,
    /// The external stage function failed
    StageExecution,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Configuration => write!(f, "configuration"),
            ErrorClass::RunResolution => write!(f, "run-resolution"),
            ErrorClass::Storage => write!(f, "storage"),
            ErrorClass::StageExecution => write!(f, "stage-execution"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed control file line {line}: '{content}' has no value")]
    MalformedLine { line: usize, content: String },

    #[error("missing required parameter '{key}'")]
    MissingParameter { key: String },

    #[error("parameter '{key}' must be {expected}, found {found}")]
    TypeCoercion {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("unknown parameter '{key}'")]
    UnknownParameter { key: String },

    #[error("no prior run found for {stage} under {}: {detail}", .root.display())]
    NotFound {
        stage: String,
        root: PathBuf,
        detail: String,
    },

    #[error("ambiguous prior run for {stage}: {detail} (candidates: {})", .candidates.join(", "))]
    AmbiguousRun {
        stage: String,
        detail: String,
        candidates: Vec<String>,
    },

    #[error("failed to persist run state to {}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt run state at {}: {reason}", .path.display())]
    CorruptState { path: PathBuf, reason: String },

    #[error("stage {stage} failed: {cause:#}")]
    StageExecution {
        stage: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project configuration {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MalformedLine { .. }
            | Self::MissingParameter { .. }
            | Self::TypeCoercion { .. }
            | Self::UnknownParameter { .. }
            | Self::Io { .. }
            | Self::Config { .. } => ErrorClass::Configuration,
            Self::NotFound { .. } | Self::AmbiguousRun { .. } => ErrorClass::RunResolution,
            Self::Persist { .. } | Self::CorruptState { .. } => ErrorClass::Storage,
            Self::StageExecution { .. } => ErrorClass::StageExecution,
        }
    }

    /// Short instruction for whoever is operating the pipeline.
    pub fn operator_hint(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "run the prerequisite stage first",
            Self::AmbiguousRun { .. } => {
                "pass an explicit run hint or remove the colliding run directory"
            }
            Self::Persist { .. } => "investigate the storage medium, then re-run this stage",
            Self::CorruptState { .. } => "re-run the stage that produced this run",
            Self::StageExecution { .. } => "inspect the stage failure, then re-run this stage",
            _ => "fix the control file or project configuration",
        }
    }

    pub(crate) fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
