//! Statically declared parameter schemas
//!
//! Each stage declares up front which keys it requires, which reserved keys
//! it defaults and which optional steps it can skip. Nothing is ever attached
//! to a configuration object by name at run time.

use std::collections::BTreeMap;
use std::path::Path;

use crate::control::value::ParamValue;
use crate::models::stage::StageId;

pub const TOPDIR: &str = "topdir";
pub const INPUTDIR: &str = "inputdir";
pub const OUTPUTDIR: &str = "outputdir";
pub const SUFFIX: &str = "suffix";
pub const EVENTLABEL: &str = "eventlabel";
pub const VERBOSE: &str = "verbose";

pub const SKIP_PREFIX: &str = "skip_";
pub const TESTING_PREFIX: &str = "testing_";

/// Keys every stage must hold after resolution.
pub const RESERVED_KEYS: &[&str] = &[TOPDIR, INPUTDIR, OUTPUTDIR, SUFFIX];

/// Semantic type a reserved key must coerce to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedKind {
    Path,
    Token,
    Flag,
}

impl ReservedKind {
    pub fn expected(self) -> &'static str {
        match self {
            ReservedKind::Path => "a path",
            ReservedKind::Token => "a single string token",
            ReservedKind::Flag => "a boolean",
        }
    }

    /// Whether `value` is acceptable for a key of this kind.
    pub fn accepts(self, value: &ParamValue) -> bool {
        match self {
            ReservedKind::Path => matches!(value, ParamValue::Path(_) | ParamValue::Str(_)),
            ReservedKind::Token => matches!(value, ParamValue::Str(_)),
            ReservedKind::Flag => matches!(value, ParamValue::Bool(_)),
        }
    }
}

/// Reserved semantics of `key`, if it has any.
pub fn reserved_kind(key: &str) -> Option<ReservedKind> {
    match key {
        TOPDIR | INPUTDIR | OUTPUTDIR => Some(ReservedKind::Path),
        SUFFIX => Some(ReservedKind::Token),
        _ if is_boolean_namespace(key) => Some(ReservedKind::Flag),
        _ => None,
    }
}

/// `skip_<step>` and `testing_<stage>` keys are always booleans.
pub fn is_boolean_namespace(key: &str) -> bool {
    [SKIP_PREFIX, TESTING_PREFIX]
        .iter()
        .any(|prefix| key.len() > prefix.len() && key.starts_with(prefix))
}

pub fn skip_key(step: &str) -> String {
    format!("{SKIP_PREFIX}{step}")
}

/// Required keys and typed defaults for one stage.
#[derive(Debug, Clone)]
pub struct StageSchema {
    pub stage: StageId,
    pub required: Vec<String>,
    pub defaults: BTreeMap<String, ParamValue>,
    /// Steps whose `skip_<step>` flag is honored for this stage
    pub skip_steps: Vec<String>,
}

impl StageSchema {
    /// The built-in schema for `stage`, rooted at `project_root`.
    ///
    /// Reserved directories default to the project root; the orchestrator
    /// replaces the `inputdir` default with the located upstream run.
    pub fn for_stage(stage: StageId, project_root: &Path) -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert(TOPDIR.to_string(), ParamValue::Path(project_root.to_path_buf()));
        defaults.insert(
            OUTPUTDIR.to_string(),
            ParamValue::Path(project_root.to_path_buf()),
        );
        defaults.insert(
            SUFFIX.to_string(),
            ParamValue::Str(stage.default_input_suffix().to_string()),
        );
        defaults.insert(VERBOSE.to_string(), ParamValue::Bool(true));
        defaults.insert(stage.testing_key(), ParamValue::Bool(false));

        let skip_steps: Vec<String> = stage
            .default_skip_steps()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for step in &skip_steps {
            defaults.insert(skip_key(step), ParamValue::Bool(false));
        }

        let required = if stage.is_root() {
            // Raw data has no upstream run to default from
            vec![INPUTDIR.to_string()]
        } else {
            Vec::new()
        };

        Self {
            stage,
            required,
            defaults,
            skip_steps,
        }
    }

    pub fn with_default(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    pub fn with_required(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.required.contains(&key) {
            self.required.push(key);
        }
        self
    }

    /// Declare an additional skippable step without giving it a default.
    ///
    /// A control file that does not mention `skip_<step>` then leaves the key
    /// unknown, which the orchestrator treats according to the optional
    /// namespaces in the project configuration.
    pub fn with_skip_step(mut self, step: impl Into<String>) -> Self {
        let step = step.into();
        if !self.skip_steps.contains(&step) {
            self.skip_steps.push(step);
        }
        self
    }

    pub fn required_keys(&self) -> Vec<&str> {
        self.required.iter().map(String::as_str).collect()
    }
}
