//! Upstream run resolution
//!
//! A stage resumes from a committed run of its predecessor. Without a hint the
//! most recent run holding the expected input products wins; a hint must pin
//! exactly one run. Equal identifiers are never resolved silently.

use crate::error::{PipelineError, Result};
use crate::fs::project::ProjectLayout;
use crate::fs::run_dirs::{has_suffix_match, list_runs, RunDirectory};
use crate::models::stage::StageId;

/// Resolve the upstream run directory that `stage` should read from.
///
/// # Arguments
/// * `layout` - Project layout holding the stage subtrees
/// * `stage` - The stage about to run (its predecessor's subtree is searched)
/// * `run_hint` - RunIdentifier, run directory name or identifier prefix
/// * `suffix` - Expected input product token; ignored when a hint is given
///
/// # Errors
/// * `NotFound` - root stage, empty subtree, or no run holds `suffix` products
/// * `AmbiguousRun` - the hint matches zero or several runs, or the most
///   recent identifier is shared by several directories
pub fn locate_prior_run(
    layout: &ProjectLayout,
    stage: StageId,
    run_hint: Option<&str>,
    suffix: &str,
) -> Result<RunDirectory> {
    let Some(upstream) = stage.predecessor() else {
        return Err(PipelineError::NotFound {
            stage: layout.stage_name(stage),
            root: layout.root().to_path_buf(),
            detail: "a root stage has no upstream run".to_string(),
        });
    };
    let upstream_name = layout.stage_name(upstream);

    let candidates = list_runs(layout, upstream)?;
    tracing::debug!(
        stage = %upstream_name,
        count = candidates.len(),
        "scanned candidate runs"
    );

    if let Some(hint) = run_hint {
        return select_hinted(candidates, hint, &upstream_name);
    }

    if candidates.is_empty() {
        return Err(PipelineError::NotFound {
            stage: upstream_name,
            root: layout.root().to_path_buf(),
            detail: format!("no committed runs under {}", layout.stage_dir(upstream).display()),
        });
    }

    let matching: Vec<RunDirectory> = candidates
        .into_iter()
        .filter(|run| has_suffix_match(layout, run, suffix))
        .collect();

    select_latest(matching, suffix, &upstream_name, layout)
}

fn select_hinted(candidates: Vec<RunDirectory>, hint: &str, stage: &str) -> Result<RunDirectory> {
    let mut matches: Vec<RunDirectory> = candidates
        .into_iter()
        .filter(|run| {
            run.run_id.as_str() == hint || run.name() == hint || run.run_id.as_str().starts_with(hint)
        })
        .collect();

    if matches.len() == 1 {
        let run = matches.remove(0);
        tracing::info!(stage, run = %run.name(), hint, "resolved hinted run");
        return Ok(run);
    }

    let detail = if matches.is_empty() {
        format!("hint '{hint}' matched no run")
    } else {
        format!("hint '{hint}' matched {} runs", matches.len())
    };
    Err(PipelineError::AmbiguousRun {
        stage: stage.to_string(),
        detail,
        candidates: matches.iter().map(RunDirectory::name).collect(),
    })
}

fn select_latest(
    matching: Vec<RunDirectory>,
    suffix: &str,
    stage: &str,
    layout: &ProjectLayout,
) -> Result<RunDirectory> {
    let Some(latest_id) = matching.iter().map(|run| run.run_id.clone()).max() else {
        return Err(PipelineError::NotFound {
            stage: stage.to_string(),
            root: layout.root().to_path_buf(),
            detail: format!("no run holds '*{suffix}*' products"),
        });
    };

    let mut newest: Vec<RunDirectory> = matching
        .into_iter()
        .filter(|run| run.run_id == latest_id)
        .collect();

    if newest.len() > 1 {
        return Err(PipelineError::AmbiguousRun {
            stage: stage.to_string(),
            detail: format!("{} run directories share identifier {latest_id}", newest.len()),
            candidates: newest.iter().map(RunDirectory::name).collect(),
        });
    }

    let run = newest.remove(0);
    tracing::info!(stage, run = %run.name(), suffix, "resolved most recent run");
    Ok(run)
}
