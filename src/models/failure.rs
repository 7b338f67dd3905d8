use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorClass, PipelineError};
use crate::models::stage::StagePhase;

/// Why a stage invocation ended in `FAILED`.
///
/// Captures the phase that was active when the failure happened, the error
/// class (so operators know whether to fix configuration, re-run an upstream
/// stage, or look at storage) and the rendered error chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureInfo {
    /// Phase that was running when the failure was detected
    pub phase: StagePhase,

    pub class: ErrorClass,

    /// Rendered error, including its cause chain
    pub reason: String,

    pub hint: String,

    pub detected_at: DateTime<Utc>,
}

impl FailureInfo {
    pub fn from_error(phase: StagePhase, err: &PipelineError) -> Self {
        let mut reason = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !reason.contains(&text) {
                reason.push_str(": ");
                reason.push_str(&text);
            }
            source = cause.source();
        }

        Self {
            phase,
            class: err.class(),
            reason,
            hint: err.operator_hint().to_string(),
            detected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_info_renders_chain() {
        let err = PipelineError::Persist {
            path: "/runs/Stage2".into(),
            source: std::io::Error::other("disk full"),
        };
        let info = FailureInfo::from_error(StagePhase::Persisting, &err);
        assert_eq!(info.phase, StagePhase::Persisting);
        assert_eq!(info.class, ErrorClass::Storage);
        assert!(info.reason.contains("/runs/Stage2"));
        assert!(info.reason.contains("disk full"));
    }
}
