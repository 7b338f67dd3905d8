//! Control-file parsing
//!
//! A control file holds one parameter per line:
//!
//! ```text
//! # Stage 2 control file
//! topdir          /data/wasp39b
//! suffix          rateints        # input file token
//! skip_flat_field True
//! ```
//!
//! Blank lines and whole-line comments are dropped. Parsing is pure: the
//! caller decides where the text came from.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};
use crate::params::schema::is_boolean_namespace;
use crate::validation::validate_key;

/// One `key value # comment` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFileEntry {
    pub key: String,
    pub raw_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// 1-based line number in the source text
    pub line: usize,
}

/// Non-fatal findings collected while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A key appeared more than once; the later value replaced the earlier one.
    DuplicateKey {
        key: String,
        first_line: usize,
        line: usize,
    },
    /// A bare boolean-namespace key was read as `True`.
    ImpliedBoolean { key: String, line: usize },
    /// The key is not a plain identifier and can never match a schema key.
    SuspiciousKey { key: String, line: usize },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::DuplicateKey {
                key,
                first_line,
                line,
            } => write!(
                f,
                "line {line}: '{key}' overrides the value from line {first_line}"
            ),
            Diagnostic::ImpliedBoolean { key, line } => {
                write!(f, "line {line}: bare '{key}' read as True")
            }
            Diagnostic::SuspiciousKey { key, line } => {
                write!(f, "line {line}: '{key}' is not a valid parameter name")
            }
        }
    }
}

/// A parsed control file: entries in file order plus diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ControlFile {
    pub entries: Vec<ControlFileEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ControlFile {
    /// Read and parse a control file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = parse_control_file(&content)?;
        for diagnostic in &parsed.diagnostics {
            tracing::warn!(file = %path.display(), "{diagnostic}");
        }
        Ok(parsed)
    }

    pub fn get(&self, key: &str) -> Option<&ControlFileEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize back to control-file text with aligned columns.
    ///
    /// Comments on entries are kept; whole-line comments and blank lines
    /// from the source are not.
    pub fn to_text(&self) -> String {
        let key_width = self.entries.iter().map(|e| e.key.len()).max().unwrap_or(0);
        let value_width = self
            .entries
            .iter()
            .filter(|e| e.comment.is_some())
            .map(|e| e.raw_value.len())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for entry in &self.entries {
            match &entry.comment {
                Some(comment) => {
                    let _ = writeln!(
                        out,
                        "{:<key_width$}    {:<value_width$}    # {}",
                        entry.key, entry.raw_value, comment
                    );
                }
                None => {
                    let _ = writeln!(out, "{:<key_width$}    {}", entry.key, entry.raw_value);
                }
            }
        }
        out
    }
}

/// Parse control-file text into ordered entries.
///
/// # Errors
///
/// Returns [`PipelineError::MalformedLine`] for a data line that has a key
/// but no value, unless the key is in a boolean namespace (`skip_*`,
/// `testing_*`), which reads as `True`.
pub fn parse_control_file(content: &str) -> Result<ControlFile> {
    let mut parsed = ControlFile::default();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (data, comment) = split_comment(trimmed);
        let (key, rest) = match data.split_once(char::is_whitespace) {
            Some((key, rest)) => (key, rest.trim()),
            None => (data, ""),
        };

        let raw_value = if rest.is_empty() {
            if !is_boolean_namespace(key) {
                return Err(PipelineError::MalformedLine {
                    line: line_no,
                    content: trimmed.to_string(),
                });
            }
            parsed.diagnostics.push(Diagnostic::ImpliedBoolean {
                key: key.to_string(),
                line: line_no,
            });
            "True".to_string()
        } else {
            rest.to_string()
        };

        if validate_key(key).is_err() {
            parsed.diagnostics.push(Diagnostic::SuspiciousKey {
                key: key.to_string(),
                line: line_no,
            });
        }

        if let Some(pos) = parsed.entries.iter().position(|e| e.key == key) {
            let previous = parsed.entries.remove(pos);
            parsed.diagnostics.push(Diagnostic::DuplicateKey {
                key: key.to_string(),
                first_line: previous.line,
                line: line_no,
            });
        }

        parsed.entries.push(ControlFileEntry {
            key: key.to_string(),
            raw_value,
            comment,
            line: line_no,
        });
    }

    Ok(parsed)
}

/// SHA-256 of control-file text, hex encoded. Recorded in run provenance.
pub fn control_file_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Split `value # comment` into its parts.
///
/// `#` only opens a comment at the start of the data or after whitespace,
/// and never inside quotes, so `F322W2#1` and `'a # b'` stay intact.
fn split_comment(line: &str) -> (&str, Option<String>) {
    let mut quote: Option<char> = None;
    let mut prev_ws = true;

    for (idx, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '#' && prev_ws => {
                let comment = line[idx + 1..].trim();
                let comment = (!comment.is_empty()).then(|| comment.to_string());
                return (line[..idx].trim_end(), comment);
            }
            None => {}
        }
        prev_ws = c.is_whitespace();
    }

    (line, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_file() {
        let content = r#"
# Eureka-style control file
topdir      /data/wasp39b
inputdir    Stage2/         # relative to topdir

suffix      calints
bg_hw       [8, 10]
"#;
        let parsed = parse_control_file(content).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed.entries[0].key, "topdir");
        assert_eq!(parsed.entries[0].raw_value, "/data/wasp39b");
        assert_eq!(parsed.entries[1].comment.as_deref(), Some("relative to topdir"));
        assert_eq!(parsed.entries[1].raw_value, "Stage2/");
        assert_eq!(parsed.entries[3].raw_value, "[8, 10]");
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_comment_needs_whitespace_and_no_quotes() {
        let parsed = parse_control_file("filter F322W2#1\nlabel 'a # b' # trailing").unwrap();
        assert_eq!(parsed.entries[0].raw_value, "F322W2#1");
        assert_eq!(parsed.entries[0].comment, None);
        assert_eq!(parsed.entries[1].raw_value, "'a # b'");
        assert_eq!(parsed.entries[1].comment.as_deref(), Some("trailing"));
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let parsed = parse_control_file("ncpu 4\nverbose True\nncpu 8").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get("ncpu").unwrap().raw_value, "8");
        assert_eq!(parsed.entries.last().unwrap().key, "ncpu");
        assert_eq!(
            parsed.diagnostics,
            vec![Diagnostic::DuplicateKey {
                key: "ncpu".to_string(),
                first_line: 1,
                line: 3
            }]
        );
    }

    #[test]
    fn test_bare_key_is_malformed() {
        let err = parse_control_file("topdir /data\noutputdir\n").unwrap_err();
        match err {
            PipelineError::MalformedLine { line, content } => {
                assert_eq!(line, 2);
                assert_eq!(content, "outputdir");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bare_key_with_only_comment_is_malformed() {
        let err = parse_control_file("suffix   # nothing here").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_bare_boolean_key_implies_true() {
        let parsed = parse_control_file("skip_jump\ntesting_S1 # quick look").unwrap();
        assert_eq!(parsed.get("skip_jump").unwrap().raw_value, "True");
        assert_eq!(parsed.get("testing_S1").unwrap().raw_value, "True");
        assert_eq!(parsed.diagnostics.len(), 2);
    }

    #[test]
    fn test_suspicious_key_is_diagnosed() {
        let parsed = parse_control_file("bg-hw 8").unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(matches!(
            parsed.diagnostics[0],
            Diagnostic::SuspiciousKey { line: 1, .. }
        ));
    }

    #[test]
    fn test_to_text_reparses_to_same_entries() {
        let content = "topdir /data\nsuffix calints # input token\nskip_photom False\n";
        let parsed = parse_control_file(content).unwrap();
        let reparsed = parse_control_file(&parsed.to_text()).unwrap();

        let strip = |f: &ControlFile| {
            f.entries
                .iter()
                .map(|e| (e.key.clone(), e.raw_value.clone(), e.comment.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&parsed), strip(&reparsed));
    }

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(control_file_digest("a 1\n"), control_file_digest("a 1\n"));
        assert_ne!(control_file_digest("a 1\n"), control_file_digest("a 2\n"));
        assert_eq!(control_file_digest("").len(), 64);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ControlFile::load(Path::new("/nonexistent/S3.ecf")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
