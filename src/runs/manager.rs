//! Durable run-state records
//!
//! A run directory becomes visible only through a rename of a fully written
//! staging directory, so a reader never observes a partial record:
//!
//! ```text
//! Stage2/.staging-XXXXXX/          <- stage function writes here
//!   jw01366_calints.fits
//!   run_state.yaml
//!   run_state.yaml.sha256
//! Stage2/20261017-093015-123456-0000_wasp39b/   <- after commit
//! ```

use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::{PipelineError, Result};
use crate::fs::project::ProjectLayout;
use crate::fs::run_dirs::{list_runs, RunDirectory, STAGING_PREFIX};
use crate::models::run_id::RunIdentifier;
use crate::models::run_state::RunState;
use crate::models::stage::StageId;
use crate::params::schema::EVENTLABEL;
use crate::validation::validate_label;

/// Version of the on-disk record layout. Bump the major on breaking changes.
pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize)]
struct RunStateRecord {
    schema_version: String,
    state: RunState,
}

#[derive(Debug, Deserialize)]
struct RecordHeader {
    schema_version: String,
}

/// Persists and reloads run states under one project root.
#[derive(Debug, Clone)]
pub struct RunStateManager {
    layout: ProjectLayout,
}

impl RunStateManager {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Mint an identifier and open a hidden staging directory for it.
    pub fn begin(&self, stage: StageId, label: Option<&str>) -> Result<StagedRun> {
        if let Some(label) = label {
            validate_label(label).map_err(|e| PipelineError::TypeCoercion {
                key: EVENTLABEL.to_string(),
                expected: "a directory-safe label",
                found: format!("'{label}' ({e})"),
            })?;
        }

        let stage_dir = self.layout.stage_dir(stage);
        let created = missing_ancestors(&stage_dir);
        fs::create_dir_all(&stage_dir).map_err(|e| PipelineError::persist(&stage_dir, e))?;

        let staging = match tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&stage_dir)
        {
            Ok(staging) => staging,
            Err(e) => {
                remove_created(&created);
                return Err(PipelineError::persist(&stage_dir, e));
            }
        };

        let run_id = RunIdentifier::mint();
        let target = self.layout.run_dir(stage, &run_id, label);
        tracing::debug!(
            %run_id,
            staging = %staging.path().display(),
            "opened staging directory"
        );

        Ok(StagedRun {
            layout: self.layout.clone(),
            stage,
            run_id,
            target,
            path: staging.path().to_path_buf(),
            staging: Some(staging),
            created,
        })
    }

    /// Record `state` under a freshly minted identifier.
    ///
    /// Either the whole record is committed or nothing is.
    pub fn persist(&self, state: &RunState) -> Result<RunIdentifier> {
        let staged = self.begin(state.stage, state.parameters.eventlabel()?)?;
        let committed = staged.commit(state)?;
        Ok(committed.run_id)
    }

    /// Load the committed run `run_id`, searching every stage subtree.
    pub fn load(&self, run_id: &RunIdentifier) -> Result<RunState> {
        let run = self.find(run_id)?;
        self.load_dir(&run.path)
    }

    /// Locate the committed directory of `run_id`.
    pub fn find(&self, run_id: &RunIdentifier) -> Result<RunDirectory> {
        for stage in StageId::ALL {
            if let Some(run) = list_runs(&self.layout, stage)?
                .into_iter()
                .find(|r| &r.run_id == run_id)
            {
                return Ok(run);
            }
        }
        Err(PipelineError::NotFound {
            stage: "any stage".to_string(),
            root: self.layout.root().to_path_buf(),
            detail: format!("no run directory for {run_id}"),
        })
    }

    /// Load the record inside a run directory.
    pub fn load_dir(&self, run_dir: &Path) -> Result<RunState> {
        let state_path = self.layout.state_path(run_dir);
        let digest_path = self.layout.digest_path(run_dir);

        let bytes = fs::read(&state_path)
            .map_err(|e| PipelineError::corrupt(&state_path, format!("unreadable record: {e}")))?;
        let recorded = fs::read_to_string(&digest_path)
            .map_err(|e| PipelineError::corrupt(&digest_path, format!("unreadable digest: {e}")))?;

        let actual = hex::encode(Sha256::digest(&bytes));
        if recorded.trim() != actual {
            return Err(PipelineError::corrupt(
                &state_path,
                format!("digest mismatch (recorded {}, actual {actual})", recorded.trim()),
            ));
        }

        let header: RecordHeader = serde_yaml::from_slice(&bytes)
            .map_err(|e| PipelineError::corrupt(&state_path, format!("invalid record: {e}")))?;
        check_schema_version(&header.schema_version)
            .map_err(|reason| PipelineError::corrupt(&state_path, reason))?;

        let record: RunStateRecord = serde_yaml::from_slice(&bytes)
            .map_err(|e| PipelineError::corrupt(&state_path, format!("invalid record: {e}")))?;

        tracing::debug!(path = %state_path.display(), "loaded run state");
        Ok(record.state)
    }
}

fn check_schema_version(found: &str) -> std::result::Result<(), String> {
    let found = Version::parse(found)
        .map_err(|e| format!("invalid schema version '{found}': {e}"))?;
    let supported =
        Version::parse(SCHEMA_VERSION).map_err(|e| format!("invalid built-in schema version: {e}"))?;
    if found.major != supported.major {
        return Err(format!(
            "incompatible schema version {found} (this build reads {}.x)",
            supported.major
        ));
    }
    Ok(())
}

/// An open, uncommitted run.
///
/// The stage function writes its data products into [`StagedRun::output_dir`].
/// Dropping the value without committing removes the staging directory and
/// any stage or output directory [`RunStateManager::begin`] had to create.
#[derive(Debug)]
pub struct StagedRun {
    layout: ProjectLayout,
    stage: StageId,
    run_id: RunIdentifier,
    target: PathBuf,
    path: PathBuf,
    staging: Option<TempDir>,
    /// Directories created by `begin`, deepest first
    created: Vec<PathBuf>,
}

/// A run that made it to its final directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedRun {
    pub run_id: RunIdentifier,
    pub path: PathBuf,
}

impl StagedRun {
    pub fn run_id(&self) -> &RunIdentifier {
        &self.run_id
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn output_dir(&self) -> &Path {
        &self.path
    }

    /// Directory the run will occupy once committed.
    pub fn target_dir(&self) -> &Path {
        &self.target
    }

    /// Write the record and move the staging directory into place.
    pub fn commit(mut self, state: &RunState) -> Result<CommittedRun> {
        let mut state = state.clone();
        state.run_id = Some(self.run_id.clone());

        let record = RunStateRecord {
            schema_version: SCHEMA_VERSION.to_string(),
            state,
        };
        let yaml = serde_yaml::to_string(&record).map_err(|e| {
            PipelineError::persist(
                &self.target,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        let digest = hex::encode(Sha256::digest(yaml.as_bytes()));

        write_synced(&self.layout.state_path(&self.path), yaml.as_bytes())?;
        write_synced(&self.layout.digest_path(&self.path), digest.as_bytes())?;

        if self.target.exists() {
            return Err(PipelineError::persist(
                &self.target,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "run directory already committed",
                ),
            ));
        }

        fs::rename(&self.path, &self.target)
            .map_err(|e| PipelineError::persist(&self.target, e))?;
        // The directory now lives at its final path; nothing left to clean up.
        if let Some(staging) = self.staging.take() {
            let _ = staging.keep();
        }
        self.created.clear();

        tracing::info!(
            run_id = %self.run_id,
            path = %self.target.display(),
            "committed run"
        );
        Ok(CommittedRun {
            run_id: self.run_id.clone(),
            path: self.target.clone(),
        })
    }
}

impl Drop for StagedRun {
    fn drop(&mut self) {
        // The staging directory goes first so its parents can be empty
        drop(self.staging.take());
        remove_created(&self.created);
    }
}

/// `dir` and every ancestor of it that does not exist yet, deepest first.
fn missing_ancestors(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Remove directories created for a run that never committed.
///
/// Only empty directories are removed, so anything another run put there in
/// the meantime stays.
fn remove_created(created: &[PathBuf]) {
    for dir in created {
        if let Err(e) = fs::remove_dir(dir) {
            tracing::debug!(dir = %dir.display(), error = %e, "kept directory");
            break;
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| PipelineError::persist(path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| PipelineError::persist(path, e))
}
