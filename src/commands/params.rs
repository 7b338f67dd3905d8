//! Typed parameter dump
//! Usage: stagehand params <control-file> --stage N

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::control::parser::ControlFile;
use crate::control::value::ParamValue;
use crate::models::stage::StageId;
use crate::params::{ParamSource, ParameterStore, StageSchema};

/// Parse a control file and print the resolved, typed parameters.
///
/// `inputdir` is left to the control file (or the project root for a
/// downstream stage), since no upstream run is located here.
pub fn execute(control_file: &Path, stage: StageId, root: Option<&Path>) -> Result<()> {
    let control_file = std::path::absolute(control_file)
        .with_context(|| format!("Failed to resolve {}", control_file.display()))?;
    let control_dir = control_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ".".into());
    let root = root.map(Path::to_path_buf).unwrap_or_else(|| control_dir.clone());

    let parsed = ControlFile::load(&control_file)?;
    for diagnostic in &parsed.diagnostics {
        println!("{} {diagnostic}", "warning:".yellow().bold());
    }

    let mut schema = StageSchema::for_stage(stage, &root);
    if !stage.is_root() {
        schema = schema.with_default(
            crate::params::schema::INPUTDIR,
            ParamValue::Path(root.clone()),
        );
    }
    let store = ParameterStore::from_schema(&parsed.entries, &schema, &control_dir)
        .with_context(|| format!("Failed to build {stage} parameters"))?;

    print_store(&store);
    Ok(())
}

pub fn print_store(store: &ParameterStore) {
    let width = store.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, param) in store.iter() {
        let source = match param.source {
            ParamSource::ControlFile { line } => format!("line {line}"),
            ParamSource::Default => "default".to_string(),
            ParamSource::Request => "request".to_string(),
        };
        let comment = param
            .comment
            .as_deref()
            .map(|c| format!("  # {c}"))
            .unwrap_or_default();
        println!(
            "  {:<width$}  {:<6} {}  {}{}",
            key.bold(),
            param.value.type_name().cyan(),
            param.value,
            source.dimmed(),
            comment.dimmed()
        );
    }
}
