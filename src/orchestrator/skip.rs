//! Skip-flag resolution
//!
//! Skip flags are the only sanctioned way to leave out part of a stage. Every
//! honored flag ends up in the run's provenance so the omission is auditable.

use crate::error::{PipelineError, Result};
use crate::params::schema::skip_key;
use crate::params::{ParameterStore, StageSchema};

/// Resolve which optional steps this invocation skips.
///
/// Declared steps are looked up first, in schema order. A declared step whose
/// `skip_<step>` key is unknown only warns when the key falls in one of
/// `optional_namespaces`; otherwise the lookup error is returned. Any further
/// `skip_*` flag set in the control file is honored as well.
///
/// # Returns
/// Step names (without the `skip_` prefix) whose flag is `True`.
pub fn resolve_skipped_steps(
    params: &ParameterStore,
    schema: &StageSchema,
    optional_namespaces: &[String],
) -> Result<Vec<String>> {
    let mut skipped = Vec::new();

    for step in &schema.skip_steps {
        let key = skip_key(step);
        match params.get_bool(&key) {
            Ok(true) => skipped.push(step.clone()),
            Ok(false) => {}
            Err(PipelineError::UnknownParameter { key })
                if optional_namespaces.iter().any(|ns| key.starts_with(ns.as_str())) =>
            {
                tracing::warn!(%key, "optional skip flag not set, running step");
            }
            Err(e) => return Err(e),
        }
    }

    for (step, enabled) in params.skip_flags() {
        if enabled && !skipped.iter().any(|s| s == step) {
            skipped.push(step.to_string());
        }
    }

    if !skipped.is_empty() {
        tracing::info!(stage = %schema.stage, steps = ?skipped, "honoring skip flags");
    }
    Ok(skipped)
}
