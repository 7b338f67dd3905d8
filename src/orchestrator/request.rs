use std::path::{Path, PathBuf};

use crate::control::value::ParamValue;
use crate::models::stage::StageId;
use crate::params::StageSchema;

/// One requested stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRequest {
    pub stage: StageId,
    pub control_file: PathBuf,
    /// Pin the upstream run (identifier, directory name or identifier prefix)
    pub run_hint: Option<String>,
    /// Expected input suffix; overrides the control file's `suffix`
    pub suffix: Option<String>,
    /// Project root; defaults to the control file's directory
    pub root: Option<PathBuf>,
    /// Keys the stage function needs on top of the built-in schema
    pub required: Vec<String>,
    pub defaults: Vec<(String, ParamValue)>,
    /// Skippable steps on top of the built-in ones, without a default
    pub skip_steps: Vec<String>,
}

impl StageRequest {
    pub fn new(stage: StageId, control_file: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            control_file: control_file.into(),
            run_hint: None,
            suffix: None,
            root: None,
            required: Vec::new(),
            defaults: Vec::new(),
            skip_steps: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.run_hint = Some(hint.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Directory that relative paths in the control file resolve against.
    pub fn control_dir(&self) -> PathBuf {
        match self.control_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Project root holding the stage subtrees.
    pub fn project_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| self.control_dir())
    }

    pub fn with_required(mut self, key: impl Into<String>) -> Self {
        self.required.push(key.into());
        self
    }

    pub fn with_default(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.defaults.push((key.into(), value));
        self
    }

    /// Declare a skippable step whose `skip_<step>` key has no default.
    pub fn with_skip_step(mut self, step: impl Into<String>) -> Self {
        self.skip_steps.push(step.into());
        self
    }

    /// The stage's built-in schema rooted at `root`, extended by this request.
    pub fn schema(&self, root: &Path) -> StageSchema {
        let mut schema = StageSchema::for_stage(self.stage, root);
        for key in &self.required {
            schema = schema.with_required(key.clone());
        }
        for (key, value) in &self.defaults {
            schema = schema.with_default(key.clone(), value.clone());
        }
        for step in &self.skip_steps {
            schema = schema.with_skip_step(step.clone());
        }
        schema
    }

    pub fn control_file(&self) -> &Path {
        &self.control_file
    }
}
