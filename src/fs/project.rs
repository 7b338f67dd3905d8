//! Project layout and project-level configuration
//!
//! A project root holds one subtree per stage and, optionally, a
//! `stagehand.toml` with layout and orchestration policy:
//!
//! ```text
//! <root>/
//!   stagehand.toml
//!   Stage1/<RunIdentifier>[_<label>]/...
//!   Stage2/<RunIdentifier>[_<label>]/...
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::models::run_id::RunIdentifier;
use crate::models::stage::StageId;

pub const CONFIG_FILE: &str = "stagehand.toml";

/// Extension of the control-file copy kept in each run directory.
pub const CONTROL_EXTENSION: &str = "ecf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Stage subtree names are `<prefix><n>`
    pub stage_dir_prefix: String,
    /// Run-state record file inside each run directory
    pub state_file: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            stage_dir_prefix: "Stage".to_string(),
            state_file: "run_state.yaml".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Key prefixes whose missing skip flags only warn
    pub optional_namespaces: Vec<String>,
    /// Copy the control file into each committed run directory
    pub copy_control_file: bool,
    /// Write `<StageName>.log` into each committed run directory
    pub write_run_log: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            optional_namespaces: Vec::new(),
            copy_control_file: true,
            write_run_log: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub layout: LayoutConfig,
    pub orchestrator: OrchestratorSettings,
}

/// Load `stagehand.toml` from a project root.
///
/// # Returns
/// * `Ok(Some(config))` - file present and valid
/// * `Ok(None)` - no config file
/// * `Err(_)` - unreadable or invalid file
pub fn load_config(project_root: &Path) -> Result<Option<ProjectConfig>> {
    let path = project_root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|source| PipelineError::Io {
        path: path.clone(),
        source,
    })?;
    let config: ProjectConfig = toml::from_str(&content).map_err(|e| PipelineError::Config {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    if config.layout.stage_dir_prefix.is_empty()
        || config.layout.stage_dir_prefix.contains(['/', '\\', '.'])
    {
        return Err(PipelineError::Config {
            path,
            reason: format!(
                "layout.stage_dir_prefix '{}' must be a plain directory name",
                config.layout.stage_dir_prefix
            ),
        });
    }
    if config.layout.state_file.is_empty() || config.layout.state_file.contains(['/', '\\']) {
        return Err(PipelineError::Config {
            path,
            reason: format!(
                "layout.state_file '{}' must be a plain file name",
                config.layout.state_file
            ),
        });
    }

    Ok(Some(config))
}

/// Load `stagehand.toml`, falling back to defaults when absent.
pub fn load_config_or_default(project_root: &Path) -> Result<ProjectConfig> {
    Ok(load_config(project_root)?.unwrap_or_default())
}

/// Paths of everything the core reads or writes under one output tree.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    layout: LayoutConfig,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>, layout: LayoutConfig) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self::new(root, LayoutConfig::default())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Subtree holding every run of `stage`.
    pub fn stage_dir(&self, stage: StageId) -> PathBuf {
        self.root.join(stage.dir_name(&self.layout.stage_dir_prefix))
    }

    pub fn stage_name(&self, stage: StageId) -> String {
        stage.dir_name(&self.layout.stage_dir_prefix)
    }

    /// Final location of a committed run.
    pub fn run_dir(&self, stage: StageId, run_id: &RunIdentifier, label: Option<&str>) -> PathBuf {
        self.stage_dir(stage)
            .join(super::run_dirs::run_dir_name(run_id, label))
    }

    pub fn state_file_name(&self) -> &str {
        &self.layout.state_file
    }

    /// Run-state record inside a run directory.
    pub fn state_path(&self, run_dir: &Path) -> PathBuf {
        run_dir.join(&self.layout.state_file)
    }

    /// Digest written beside the run-state record.
    pub fn digest_path(&self, run_dir: &Path) -> PathBuf {
        run_dir.join(format!("{}.sha256", self.layout.state_file))
    }

    /// Per-run log file, e.g. `Stage3.log`.
    pub fn log_path(&self, run_dir: &Path, stage: StageId) -> PathBuf {
        run_dir.join(format!("{}.log", self.stage_name(stage)))
    }

    /// Copy of the control file a run was produced with, e.g. `Stage3.ecf`.
    pub fn control_copy_path(&self, run_dir: &Path, stage: StageId) -> PathBuf {
        run_dir.join(format!("{}.{CONTROL_EXTENSION}", self.stage_name(stage)))
    }

    /// Whether `file` is one of the files the orchestrator itself writes into
    /// a run directory, as opposed to a data product of the stage.
    pub fn is_bookkeeping(&self, run_dir: &Path, stage: StageId, file: &Path) -> bool {
        file == self.state_path(run_dir)
            || file == self.digest_path(run_dir)
            || file == self.log_path(run_dir, stage)
            || file == self.control_copy_path(run_dir, stage)
    }
}
