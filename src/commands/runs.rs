//! Run listing and lookup
//! Usage: stagehand runs --root DIR --stage N
//!        stagehand locate --root DIR --stage N [--hint H] [--suffix S]

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::fs::project::{load_config_or_default, ProjectLayout};
use crate::fs::run_dirs::list_runs;
use crate::models::stage::StageId;
use crate::runs::locator::locate_prior_run;
use crate::utils::display_path;

fn layout_for(root: &Path) -> Result<ProjectLayout> {
    let config = load_config_or_default(root)
        .with_context(|| format!("Failed to load project configuration in {}", root.display()))?;
    Ok(ProjectLayout::new(root, config.layout))
}

/// List committed runs of one stage, oldest first.
pub fn list(root: &Path, stage: StageId) -> Result<()> {
    let layout = layout_for(root)?;
    let runs = list_runs(&layout, stage)?;

    println!("{} runs under {}:", layout.stage_name(stage).bold(), root.display());
    println!("─────────────────────────────────────────────────────────");
    if runs.is_empty() {
        println!("(no committed runs)");
        return Ok(());
    }

    for run in &runs {
        let when = run
            .run_id
            .timestamp()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        println!(
            "  {}  {}  {}",
            run.name(),
            when.dimmed(),
            display_path(&run.path, root)
        );
    }
    Ok(())
}

/// Show which upstream run `stage` would resume from.
pub fn locate(root: &Path, stage: StageId, hint: Option<&str>, suffix: Option<&str>) -> Result<()> {
    let layout = layout_for(root)?;
    let suffix = suffix.unwrap_or_else(|| stage.default_input_suffix());

    match locate_prior_run(&layout, stage, hint, suffix) {
        Ok(run) => {
            println!(
                "{} {stage} resumes from {}",
                "✓".green().bold(),
                run.path.display()
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {e}", "✗".red().bold());
            println!("  {} {}", "hint:".yellow(), e.operator_hint());
            Err(e.into())
        }
    }
}
