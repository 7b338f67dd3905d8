//! Run directory naming and lookup utilities
//!
//! Run directories are named with the run identifier, optionally followed by
//! the event label:
//! - `20261017-093015-123456-0000` (no label)
//! - `20261017-093015-123456-0001_wasp39b` (labelled)
//!
//! This module provides utilities for:
//! - Generating consistent run directory names
//! - Parsing a directory name back into identifier and label
//! - Listing the committed runs of a stage
//! - Checking whether a run holds data products with a given suffix token

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{PipelineError, Result};
use crate::fs::project::ProjectLayout;
use crate::models::run_id::RunIdentifier;
use crate::models::stage::StageId;

/// Prefix of in-flight staging directories. Never treated as a run.
pub const STAGING_PREFIX: &str = ".staging-";

fn run_dir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{8}-\d{6}-\d{6}-\d{4})(?:_([A-Za-z0-9_-]+))?$")
            .unwrap_or_else(|e| unreachable!("run directory pattern is valid: {e}"))
    })
}

/// A committed run directory of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    pub stage: StageId,
    pub run_id: RunIdentifier,
    pub label: Option<String>,
    pub path: PathBuf,
}

impl RunDirectory {
    pub fn name(&self) -> String {
        run_dir_name(&self.run_id, self.label.as_deref())
    }
}

/// Generate a run directory name.
///
/// # Returns
/// `{run_id}` or `{run_id}_{label}`
pub fn run_dir_name(run_id: &RunIdentifier, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{run_id}_{label}"),
        None => run_id.to_string(),
    }
}

/// Parse a run directory name into its identifier and label.
///
/// Returns None for staging directories and anything else that does not
/// follow the naming scheme.
pub fn parse_run_dir_name(name: &str) -> Option<(RunIdentifier, Option<String>)> {
    let caps = run_dir_pattern().captures(name)?;
    let run_id = RunIdentifier::parse(caps.get(1)?.as_str()).ok()?;
    let label = caps.get(2).map(|m| m.as_str().to_string());
    Some((run_id, label))
}

/// List every committed run of `stage`, sorted by run identifier.
///
/// A missing stage subtree yields an empty list.
pub fn list_runs(layout: &ProjectLayout, stage: StageId) -> Result<Vec<RunDirectory>> {
    let stage_dir = layout.stage_dir(stage);
    if !stage_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&stage_dir).map_err(|source| PipelineError::Io {
        path: stage_dir.clone(),
        source,
    })?;

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::Io {
            path: stage_dir.clone(),
            source,
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        match parse_run_dir_name(name) {
            Some((run_id, label)) => runs.push(RunDirectory {
                stage,
                run_id,
                label,
                path,
            }),
            None => tracing::debug!(dir = %path.display(), "ignoring non-run directory"),
        }
    }

    runs.sort_by(|a, b| a.run_id.cmp(&b.run_id).then_with(|| a.label.cmp(&b.label)));
    Ok(runs)
}

/// Whether `run` contains a data product whose file name carries `suffix`.
///
/// The record, digest, log and control-file copy written by the orchestrator
/// are not data products and never match. An empty suffix matches any run.
pub fn has_suffix_match(layout: &ProjectLayout, run: &RunDirectory, suffix: &str) -> bool {
    if suffix.is_empty() {
        return true;
    }

    let pattern = format!(
        "{}/**/*{}*",
        glob::Pattern::escape(&run.path.to_string_lossy()),
        glob::Pattern::escape(suffix)
    );
    match glob::glob(&pattern) {
        Ok(paths) => paths
            .flatten()
            .any(|p| p.is_file() && !layout.is_bookkeeping(&run.path, run.stage, &p)),
        Err(e) => {
            tracing::warn!(%pattern, error = %e, "invalid suffix pattern");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> RunIdentifier {
        RunIdentifier::parse(s).unwrap()
    }

    #[test]
    fn test_run_dir_name() {
        let run_id = id("20261017-093015-123456-0000");
        assert_eq!(run_dir_name(&run_id, None), "20261017-093015-123456-0000");
        assert_eq!(
            run_dir_name(&run_id, Some("wasp39b")),
            "20261017-093015-123456-0000_wasp39b"
        );
    }

    #[test]
    fn test_parse_run_dir_name() {
        let (run_id, label) = parse_run_dir_name("20261017-093015-123456-0001_wasp39b").unwrap();
        assert_eq!(run_id, id("20261017-093015-123456-0001"));
        assert_eq!(label.as_deref(), Some("wasp39b"));

        let (_, label) = parse_run_dir_name("20261017-093015-123456-0001").unwrap();
        assert!(label.is_none());

        assert!(parse_run_dir_name(".staging-20261017-093015-123456-0001").is_none());
        assert!(parse_run_dir_name("S3_2022-08-01_run1").is_none());
        assert!(parse_run_dir_name("20261017-093015-123456-0001_").is_none());
    }

    #[test]
    fn test_list_runs_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::with_defaults(temp.path());
        let stage_dir = layout.stage_dir(StageId::S2);

        for name in [
            "20261017-100000-000000-0000",
            "20261016-100000-000000-0000_early",
            ".staging-20261018-100000-000000-0000",
            "notes",
        ] {
            fs::create_dir_all(stage_dir.join(name)).unwrap();
        }
        fs::write(stage_dir.join("20261019-100000-000000-0000"), "a file, not a run").unwrap();

        let runs = list_runs(&layout, StageId::S2).unwrap();
        let names: Vec<String> = runs.iter().map(RunDirectory::name).collect();
        assert_eq!(
            names,
            vec![
                "20261016-100000-000000-0000_early".to_string(),
                "20261017-100000-000000-0000".to_string()
            ]
        );
    }

    #[test]
    fn test_list_runs_missing_stage_dir() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::with_defaults(temp.path());
        assert!(list_runs(&layout, StageId::S4).unwrap().is_empty());
    }

    #[test]
    fn test_has_suffix_match() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::with_defaults(temp.path());
        let run_dir = layout.stage_dir(StageId::S2).join("20261017-100000-000000-0000");
        fs::create_dir_all(run_dir.join("ap8_bg12")).unwrap();
        fs::write(run_dir.join("ap8_bg12/jw01366_nis_calints.fits"), "").unwrap();
        let (run_id, label) = parse_run_dir_name("20261017-100000-000000-0000").unwrap();
        let run = RunDirectory {
            stage: StageId::S2,
            run_id,
            label,
            path: run_dir,
        };

        assert!(has_suffix_match(&layout, &run, "calints"));
        assert!(!has_suffix_match(&layout, &run, "rateints"));
        assert!(has_suffix_match(&layout, &run, ""));
    }

    #[test]
    fn test_bookkeeping_files_never_match() {
        let temp = TempDir::new().unwrap();
        let layout = ProjectLayout::with_defaults(temp.path());
        let run_dir = layout.stage_dir(StageId::S1).join("20261017-100000-000000-0000");
        fs::create_dir_all(&run_dir).unwrap();
        for name in ["run_state.yaml", "run_state.yaml.sha256", "Stage1.log", "Stage1.ecf"] {
            fs::write(run_dir.join(name), "").unwrap();
        }
        let (run_id, label) = parse_run_dir_name("20261017-100000-000000-0000").unwrap();
        let run = RunDirectory {
            stage: StageId::S1,
            run_id,
            label,
            path: run_dir.clone(),
        };

        // Tokens that only occur in the orchestrator's own file names
        for token in ["run_state", "sha256", "Stage1", "ecf", "log"] {
            assert!(!has_suffix_match(&layout, &run, token), "{token}");
        }

        fs::write(run_dir.join("jw01366_Stage1_rateints.fits"), "").unwrap();
        assert!(has_suffix_match(&layout, &run, "Stage1"));
    }
}
