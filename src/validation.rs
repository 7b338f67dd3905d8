//! Input validation for names that end up inside run-directory paths.
//!
//! Event labels and run hints are user-supplied and get joined onto the
//! project tree, so they are checked before any path is built from them.

use anyhow::{bail, Result};

/// Maximum length of an event label.
pub const MAX_LABEL_LENGTH: usize = 64;

/// Maximum length of a run hint: a full run directory name.
pub const MAX_HINT_LENGTH: usize = RUN_ID_LENGTH + 1 + MAX_LABEL_LENGTH;

/// Length of `YYYYMMDD-HHMMSS-ffffff-NNNN`.
const RUN_ID_LENGTH: usize = 27;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Validates an event label, which becomes the `_<label>` tail of a run
/// directory name.
///
/// The label must start with a letter or digit, so `<id>_<label>` never
/// produces a doubled separator, and may otherwise hold letters, digits,
/// dashes and underscores.
///
/// # Examples
///
/// ```
/// use stagehand::validation::validate_label;
///
/// assert!(validate_label("wasp39b").is_ok());
/// assert!(validate_label("nircam_f322w2").is_ok());
/// assert!(validate_label("_wasp39b").is_err());
/// assert!(validate_label("../etc").is_err());
/// ```
pub fn validate_label(label: &str) -> Result<()> {
    let Some(first) = label.chars().next() else {
        bail!("Event label cannot be empty");
    };
    if !first.is_ascii_alphanumeric() {
        bail!("Event label '{label}' must start with a letter or digit");
    }
    if label.len() > MAX_LABEL_LENGTH {
        bail!(
            "Event label too long: {} characters (max {MAX_LABEL_LENGTH})",
            label.len()
        );
    }
    if !label.chars().all(is_name_char) {
        bail!("Event label '{label}' may only hold letters, digits, '-' and '_'");
    }
    Ok(())
}

/// Validates a run hint: a run identifier, an identifier prefix such as a
/// date, or a full run directory name.
pub fn validate_hint(hint: &str) -> Result<()> {
    if !hint.starts_with(|c: char| c.is_ascii_digit()) {
        bail!("Run hint '{hint}' must start with the date of a run identifier");
    }
    if hint.len() > MAX_HINT_LENGTH {
        bail!("Run hint too long: {} characters (max {MAX_HINT_LENGTH})", hint.len());
    }
    if !hint.chars().all(is_name_char) {
        bail!("Run hint '{hint}' is not a run identifier or run directory name");
    }
    Ok(())
}

/// Validates a control-file key: an identifier made of ASCII letters,
/// digits and underscores that does not start with a digit.
pub fn validate_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    match chars.next() {
        None => bail!("Key cannot be empty"),
        Some(c) if c.is_ascii_digit() => bail!("Key '{key}' cannot start with a digit"),
        Some(_) => {}
    }

    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("Key '{key}' contains invalid characters. Use only alphanumeric characters and underscores (_)");
    }

    Ok(())
}

/// Clap value parser for run hints.
pub fn clap_hint_validator(s: &str) -> Result<String, String> {
    validate_hint(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label_valid() {
        assert!(validate_label("wasp39b").is_ok());
        assert!(validate_label("run-2").is_ok());
        assert!(validate_label("NIRCam_F444W").is_ok());
        assert!(validate_label("39").is_ok());
    }

    #[test]
    fn test_validate_label_empty() {
        let result = validate_label("");
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_validate_label_leading_separator() {
        assert!(validate_label("_wasp39b").is_err());
        assert!(validate_label("-v").is_err());
    }

    #[test]
    fn test_validate_label_too_long() {
        let long = "a".repeat(MAX_LABEL_LENGTH + 1);
        assert!(validate_label(&long).unwrap_err().to_string().contains("too long"));
        assert!(validate_label(&"a".repeat(MAX_LABEL_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_label_invalid_chars() {
        assert!(validate_label("Stage2/run").is_err());
        assert!(validate_label("two words").is_err());
        assert!(validate_label("run.1").is_err());
    }

    #[test]
    fn test_validate_hint() {
        assert!(validate_hint("20261017").is_ok());
        assert!(validate_hint("20261017-093015-123456-0000").is_ok());
        assert!(validate_hint(&format!("20261017-093015-123456-0000_{}", "a".repeat(MAX_LABEL_LENGTH))).is_ok());
        assert!(validate_hint("wasp39b").is_err());
        assert!(validate_hint("2026/10").is_err());
        assert!(validate_hint("").is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("skip_flat_field").is_ok());
        assert!(validate_key("testing_S2").is_ok());
        assert!(validate_key("topdir").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("1st").is_err());
        assert!(validate_key("bg-hw").is_err());
    }

    #[test]
    fn test_clap_hint_validator() {
        assert!(clap_hint_validator("20261017").is_ok());
        assert!(clap_hint_validator("../invalid").is_err());
    }
}
