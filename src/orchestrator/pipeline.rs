//! Sequential multi-stage runs.

use crate::fs::project::ProjectConfig;

use super::invocation::{Orchestrator, StageFailure, StageOutcome};
use super::request::StageRequest;
use super::stage_fn::StageFunction;

/// Stages completed before the failing one, plus the failure itself.
#[derive(Debug, thiserror::Error)]
#[error("pipeline stopped after {} completed stage(s): {failure}", .completed.len())]
pub struct PipelineFailure {
    pub completed: Vec<StageOutcome>,
    #[source]
    pub failure: StageFailure,
}

/// An ordered list of stage invocations run one after another.
///
/// Each stage runs to completion before the next one starts, so a later stage
/// always resumes from the run its predecessor just committed.
pub struct Pipeline<'a> {
    config: Option<ProjectConfig>,
    steps: Vec<(StageRequest, &'a dyn StageFunction)>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self {
            config: None,
            steps: Vec::new(),
        }
    }

    /// Use `config` for every stage instead of each root's `stagehand.toml`.
    pub fn with_config(mut self, config: ProjectConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn stage(mut self, request: StageRequest, stage_fn: &'a dyn StageFunction) -> Self {
        self.steps.push((request, stage_fn));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every stage in order, stopping at the first failure.
    pub fn run(self) -> Result<Vec<StageOutcome>, PipelineFailure> {
        let mut completed = Vec::with_capacity(self.steps.len());

        for (request, stage_fn) in self.steps {
            let orchestrator = match &self.config {
                Some(config) => Orchestrator::with_config(request.clone(), config.clone()),
                None => match Orchestrator::new(request.clone()) {
                    Ok(orchestrator) => orchestrator,
                    Err(error) => {
                        // Unreadable project configuration: fail before any phase runs
                        let orchestrator =
                            Orchestrator::with_config(request, ProjectConfig::default());
                        return Err(PipelineFailure {
                            completed,
                            failure: orchestrator.fail(error),
                        });
                    }
                },
            };

            match orchestrator.run(stage_fn) {
                Ok(outcome) => completed.push(outcome),
                Err(failure) => return Err(PipelineFailure { completed, failure }),
            }
        }

        Ok(completed)
    }
}

impl Default for Pipeline<'_> {
    fn default() -> Self {
        Self::new()
    }
}
