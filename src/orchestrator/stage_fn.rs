//! Boundary between the orchestrator and the reduction code it drives.

use std::path::Path;

use crate::error::Result;
use crate::fs::run_log::RunLog;
use crate::models::run_id::RunIdentifier;
use crate::models::run_state::RunState;
use crate::models::stage::StageId;
use crate::params::schema::skip_key;
use crate::params::ParameterStore;

/// Everything a stage function may read during one invocation.
///
/// The prior run state is shared read-only; the function receives its own
/// seeded [`RunState`] by value and returns the updated one.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub stage: StageId,
    pub params: &'a ParameterStore,
    /// Upstream run state, `None` for a root stage
    pub prior: Option<&'a RunState>,
    /// Identifier the run will be committed under
    pub run_id: &'a RunIdentifier,
    /// Staging directory; becomes the run directory on commit
    pub output_dir: &'a Path,
    pub log: &'a RunLog,
}

impl StageContext<'_> {
    /// Whether `skip_<step>` is set for this invocation.
    ///
    /// A step the stage schema never declared and the control file never
    /// mentions is an `UnknownParameter` error, so a misspelled step name
    /// cannot quietly run the step.
    pub fn should_skip(&self, step: &str) -> Result<bool> {
        self.params.get_bool(&skip_key(step))
    }

    /// Whether the stage runs in diagnostic `testing_<stage>` mode.
    pub fn is_testing(&self) -> Result<bool> {
        self.params.get_bool(&self.stage.testing_key())
    }
}

/// An external stage implementation (S1 ramp fitting, S3 extraction, ...).
///
/// Errors are wrapped as `StageExecution` failures; the orchestrator never
/// retries a stage on its own.
pub trait StageFunction {
    fn run(&self, ctx: &StageContext<'_>, state: RunState) -> anyhow::Result<RunState>;
}

impl<F> StageFunction for F
where
    F: Fn(&StageContext<'_>, RunState) -> anyhow::Result<RunState>,
{
    fn run(&self, ctx: &StageContext<'_>, state: RunState) -> anyhow::Result<RunState> {
        self(ctx, state)
    }
}
