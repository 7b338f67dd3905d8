//! One stage invocation, driven through its phases.
//!
//! ```text
//! PENDING -> LOADING_INPUT -> BUILDING_PARAMS -> RUNNING_STAGE -> PERSISTING -> DONE
//!     \____________\_______________\________________\_______________\-> FAILED
//! ```
//!
//! Nothing becomes visible in the project tree before the final commit, so a
//! failed invocation leaves the tree exactly as it found it.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::control::parser::{control_file_digest, parse_control_file, ControlFile};
use crate::control::value::ParamValue;
use crate::error::{PipelineError, Result};
use crate::fs::project::{load_config_or_default, OrchestratorSettings, ProjectConfig, ProjectLayout};
use crate::fs::run_dirs::RunDirectory;
use crate::fs::run_log::RunLog;
use crate::models::failure::FailureInfo;
use crate::models::run_id::RunIdentifier;
use crate::models::run_state::RunState;
use crate::models::stage::{StageId, StagePhase};
use crate::params::schema::INPUTDIR;
use crate::params::{ParameterStore, StageSchema};
use crate::runs::locator::locate_prior_run;
use crate::runs::manager::RunStateManager;

use super::request::StageRequest;
use super::skip::resolve_skipped_steps;
use super::stage_fn::{StageContext, StageFunction};

/// A successfully committed stage run.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: StageId,
    pub run_id: RunIdentifier,
    pub run_dir: PathBuf,
    /// The committed state, as a later `load` returns it
    pub state: RunState,
    pub prior: Option<RunDirectory>,
    pub history: Vec<StagePhase>,
}

impl StageOutcome {
    pub fn phase(&self) -> StagePhase {
        StagePhase::Done
    }
}

/// A stage invocation that ended in `FAILED`.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed during {}: {error}", .info.phase)]
pub struct StageFailure {
    pub stage: StageId,
    pub info: FailureInfo,
    pub history: Vec<StagePhase>,
    #[source]
    pub error: PipelineError,
}

impl StageFailure {
    pub fn phase(&self) -> StagePhase {
        StagePhase::Failed
    }
}

/// Drives a single [`StageRequest`] to `DONE` or `FAILED`.
#[derive(Debug)]
pub struct Orchestrator {
    request: StageRequest,
    config: ProjectConfig,
    phase: StagePhase,
    history: Vec<StagePhase>,
}

/// The control file, read once per invocation.
struct ControlInput {
    path: PathBuf,
    text: String,
    parsed: ControlFile,
}

/// Output of the `LOADING_INPUT` phase.
enum LoadedInput {
    Ready {
        control: ControlInput,
        prior: Option<(RunDirectory, RunState)>,
    },
    /// The control file cannot be turned into parameters. `BUILDING_PARAMS`
    /// reports the error; no upstream run was looked for.
    Deferred(PipelineError),
}

/// Output of the `BUILDING_PARAMS` phase.
struct BuiltParams {
    schema: StageSchema,
    params: ParameterStore,
    control: ControlInput,
    label: Option<String>,
    testing: bool,
}

impl Orchestrator {
    /// Prepare an invocation, reading `stagehand.toml` from the project root.
    pub fn new(request: StageRequest) -> Result<Self> {
        let config = load_config_or_default(&request.project_root())?;
        Ok(Self::with_config(request, config))
    }

    pub fn with_config(request: StageRequest, config: ProjectConfig) -> Self {
        Self {
            request,
            config,
            phase: StagePhase::Pending,
            history: vec![StagePhase::Pending],
        }
    }

    pub fn request(&self) -> &StageRequest {
        &self.request
    }

    pub fn phase(&self) -> StagePhase {
        self.phase
    }

    fn settings(&self) -> &OrchestratorSettings {
        &self.config.orchestrator
    }

    /// Layout of the run tree rooted at a resolved `outputdir`.
    fn layout_at(&self, output_root: &Path) -> ProjectLayout {
        ProjectLayout::new(output_root, self.config.layout.clone())
    }

    fn advance(&mut self, next: StagePhase) {
        match self.phase.try_transition(next) {
            Ok(phase) => {
                tracing::debug!(stage = %self.request.stage, from = %self.phase, to = %phase, "phase");
                self.phase = phase;
                self.history.push(phase);
            }
            Err(e) => tracing::error!(error = %e, "phase bookkeeping out of order"),
        }
    }

    pub(super) fn fail(mut self, error: PipelineError) -> StageFailure {
        let info = FailureInfo::from_error(self.phase, &error);
        tracing::error!(
            stage = %self.request.stage,
            phase = %self.phase,
            class = %info.class,
            "{}",
            info.reason
        );
        self.advance(StagePhase::Failed);
        StageFailure {
            stage: self.request.stage,
            info,
            history: self.history,
            error,
        }
    }

    /// Run the invocation to a terminal phase.
    pub fn run(mut self, stage_fn: &dyn StageFunction) -> std::result::Result<StageOutcome, StageFailure> {
        let stage = self.request.stage;
        let root = match absolute(&self.request.project_root()) {
            Ok(root) => root,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::info!(%stage, root = %root.display(), "starting stage");

        self.advance(StagePhase::LoadingInput);
        let input = match self.load_input(&root) {
            Ok(input) => input,
            Err(e) => return Err(self.fail(e)),
        };

        self.advance(StagePhase::BuildingParams);
        let (control, prior) = match input {
            LoadedInput::Ready { control, prior } => (control, prior),
            LoadedInput::Deferred(e) => return Err(self.fail(e)),
        };
        let (prior_dir, prior_state) = prior.unzip();
        let built = match self.build_params(&root, control, prior_dir.as_ref()) {
            Ok(built) => built,
            Err(e) => return Err(self.fail(e)),
        };
        let skipped = match resolve_skipped_steps(
            &built.params,
            &built.schema,
            &self.settings().optional_namespaces,
        ) {
            Ok(skipped) => skipped,
            Err(e) => return Err(self.fail(e)),
        };

        self.advance(StagePhase::RunningStage);
        let output_layout = match built.params.outputdir() {
            Ok(dir) => self.layout_at(dir),
            Err(e) => return Err(self.fail(e)),
        };
        let manager = RunStateManager::new(output_layout.clone());
        let staged = match manager.begin(stage, built.label.as_deref()) {
            Ok(staged) => staged,
            Err(e) => return Err(self.fail(e)),
        };

        let log = if self.settings().write_run_log {
            match RunLog::open(&output_layout.log_path(staged.output_dir(), stage)) {
                Ok(log) => log,
                Err(e) => return Err(self.fail(e)),
            }
        } else {
            RunLog::disabled()
        };
        log.line(format!(
            "Starting {} run {}",
            output_layout.stage_name(stage),
            staged.run_id()
        ));
        if let Some(prior) = &prior_dir {
            log.line(format!("Resuming from {}", prior.path.display()));
        }
        if !skipped.is_empty() {
            log.line(format!("Skipping steps: {}", skipped.join(", ")));
        }

        let mut seed = match &prior_state {
            Some(prior) => RunState::seeded_from(stage, built.params.clone(), prior),
            None => RunState::new(stage, built.params.clone()),
        };
        seed.provenance.skipped_steps = skipped.clone();

        let ctx = StageContext {
            stage,
            params: &built.params,
            prior: prior_state.as_ref(),
            run_id: staged.run_id(),
            output_dir: staged.output_dir(),
            log: &log,
        };
        let result = catch_unwind(AssertUnwindSafe(|| stage_fn.run(&ctx, seed)));
        let mut state = match result {
            Ok(Ok(state)) => state,
            Ok(Err(cause)) => {
                log.line(format!("Stage function failed: {cause:#}"));
                return Err(self.fail(PipelineError::StageExecution {
                    stage: stage.to_string(),
                    cause,
                }));
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log.line(format!("Stage function panicked: {message}"));
                return Err(self.fail(PipelineError::StageExecution {
                    stage: stage.to_string(),
                    cause: anyhow::anyhow!("stage function panicked: {message}"),
                }));
            }
        };

        if state.stage != stage {
            return Err(self.fail(PipelineError::StageExecution {
                stage: stage.to_string(),
                cause: anyhow::anyhow!(
                    "stage function returned a run state for {} instead of {stage}",
                    state.stage
                ),
            }));
        }

        self.advance(StagePhase::Persisting);
        // Bookkeeping owned by the orchestrator, whatever the stage function did
        state.parameters = built.params.clone();
        state.provenance.skipped_steps = skipped;
        state.provenance.prior_run = prior_state.as_ref().and_then(|p| p.run_id.clone());
        state.provenance.prior_run_dir = prior_dir.as_ref().map(|p| p.path.clone());
        state.provenance.control_file = Some(built.control.path.clone());
        state.provenance.control_file_sha256 = Some(control_file_digest(&built.control.text));
        state.provenance.testing = built.testing;
        state.provenance.completed_at = Some(Utc::now());

        if self.settings().copy_control_file {
            let dest = output_layout.control_copy_path(staged.output_dir(), stage);
            if let Err(e) = fs::write(&dest, &built.control.text) {
                return Err(self.fail(PipelineError::persist(&dest, e)));
            }
        }
        log.line(format!("Committing run {}", staged.run_id()));
        if let Err(e) = log.flush() {
            return Err(self.fail(e));
        }
        drop(log);

        let committed = match staged.commit(&state) {
            Ok(committed) => committed,
            Err(e) => return Err(self.fail(e)),
        };
        state.run_id = Some(committed.run_id.clone());

        self.advance(StagePhase::Done);
        tracing::info!(%stage, run_id = %committed.run_id, "stage done");
        Ok(StageOutcome {
            stage,
            run_id: committed.run_id,
            run_dir: committed.path,
            state,
            prior: prior_dir,
            history: self.history,
        })
    }

    /// `LOADING_INPUT`: read the control file, then locate and load the
    /// upstream run unless this is a root stage.
    ///
    /// Upstream runs are searched in the tree this invocation will write to,
    /// the resolved `outputdir`, matching the resolved `suffix`. Both come
    /// from the same parameter build `BUILDING_PARAMS` performs, with the
    /// project root standing in for the not yet known `inputdir`.
    fn load_input(&self, root: &Path) -> Result<LoadedInput> {
        let stage = self.request.stage;
        let control = match self.read_control() {
            Ok(control) => control,
            Err(e) => return Ok(LoadedInput::Deferred(e)),
        };
        if stage.is_root() {
            tracing::debug!(%stage, "root stage, no upstream run");
            return Ok(LoadedInput::Ready {
                control,
                prior: None,
            });
        }

        let schema = self.schema(root, Some(root));
        let preview = match self.store(&schema, &control) {
            Ok(preview) => preview,
            Err(e) => return Ok(LoadedInput::Deferred(e)),
        };
        let layout = self.layout_at(preview.outputdir()?);
        let prior = locate_prior_run(
            &layout,
            stage,
            self.request.run_hint.as_deref(),
            preview.suffix()?,
        )?;
        let state = RunStateManager::new(layout).load_dir(&prior.path)?;
        Ok(LoadedInput::Ready {
            control,
            prior: Some((prior, state)),
        })
    }

    /// `BUILDING_PARAMS`: build the typed store the stage function receives.
    fn build_params(
        &self,
        root: &Path,
        control: ControlInput,
        prior: Option<&RunDirectory>,
    ) -> Result<BuiltParams> {
        for diagnostic in &control.parsed.diagnostics {
            tracing::warn!(file = %control.path.display(), "{diagnostic}");
        }

        let schema = self.schema(root, prior.map(|p| p.path.as_path()));
        let params = self.store(&schema, &control)?;
        let label = params.eventlabel()?.map(str::to_string);
        let testing = params.get_bool(&self.request.stage.testing_key())?;
        Ok(BuiltParams {
            schema,
            params,
            control,
            label,
            testing,
        })
    }

    fn read_control(&self) -> Result<ControlInput> {
        let path = absolute(&self.request.control_file)?;
        let text = fs::read_to_string(&path).map_err(|source| PipelineError::Io {
            path: path.clone(),
            source,
        })?;
        let parsed = parse_control_file(&text)?;
        Ok(ControlInput { path, text, parsed })
    }

    /// The request's schema, with `inputdir` defaulting to `dir` when given.
    fn schema(&self, root: &Path, dir: Option<&Path>) -> StageSchema {
        let schema = self.request.schema(root);
        match dir {
            Some(dir) => schema.with_default(INPUTDIR, ParamValue::Path(dir.to_path_buf())),
            None => schema,
        }
    }

    fn store(&self, schema: &StageSchema, control: &ControlInput) -> Result<ParameterStore> {
        let base_dir = absolute(&self.request.control_dir())?;
        let params = ParameterStore::from_schema(&control.parsed.entries, schema, &base_dir)?;
        Ok(match &self.request.suffix {
            Some(suffix) => params.override_suffix(suffix),
            None => params,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
