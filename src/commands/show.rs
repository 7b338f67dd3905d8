//! Run-state inspection
//! Usage: stagehand show <run-dir>

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::fs::project::{load_config_or_default, ProjectLayout};
use crate::runs::manager::RunStateManager;

use super::params::print_store;

/// Load and print the committed record of a run directory.
///
/// The project root is taken to be two levels above the run directory
/// (`<root>/<StageName>/<run>`), which is where `stagehand.toml` lives.
pub fn execute(run_dir: &Path) -> Result<()> {
    let run_dir = std::path::absolute(run_dir)
        .with_context(|| format!("Failed to resolve {}", run_dir.display()))?;
    let root = run_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| run_dir.clone());

    let config = load_config_or_default(&root)?;
    let manager = RunStateManager::new(ProjectLayout::new(root, config.layout));
    let state = manager
        .load_dir(&run_dir)
        .with_context(|| format!("Failed to load run state from {}", run_dir.display()))?;

    let run_id = state
        .run_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "(uncommitted)".to_string());
    println!("{} {} {}", "Run".bold(), run_id.bold(), state.stage);
    println!("─────────────────────────────────────────────────────────");

    let p = &state.provenance;
    println!("  started:    {}", p.started_at);
    if let Some(done) = p.completed_at {
        println!("  completed:  {done}");
    }
    if let Some(prior) = &p.prior_run {
        println!("  prior run:  {prior}");
    }
    if let Some(control) = &p.control_file {
        println!("  control:    {}", control.display());
    }
    if let Some(sha) = &p.control_file_sha256 {
        println!("  sha256:     {}", sha.dimmed());
    }
    if !p.skipped_steps.is_empty() {
        println!("  skipped:    {}", p.skipped_steps.join(", ").yellow());
    }
    if p.testing {
        println!("  mode:       {}", "testing".yellow());
    }
    for note in &p.notes {
        println!("  note:       {note}");
    }
    println!("  version:    {}", p.tool_version);

    println!();
    println!("{}", "Parameters".bold());
    print_store(&state.parameters);

    if !state.payload.is_null() {
        println!();
        println!("{}", "Payload".bold());
        let rendered =
            serde_json::to_string_pretty(&state.payload).context("Failed to render payload")?;
        for line in rendered.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}
