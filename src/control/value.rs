//! Typed parameter values and the coercion chain that produces them.
//!
//! Coercion order for a raw control-file value:
//! quoted string → boolean literal → null → integer → float →
//! single token (path or string) → list → string.
//!
//! Every raw value resolves to exactly one variant; nothing here can fail.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TRUE_LITERALS: &[&str] = &["true", "yes", "on"];
const FALSE_LITERALS: &[&str] = &["false", "no", "off"];
const NULL_LITERALS: &[&str] = &["none", "null", "~"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Path(PathBuf),
    Str(String),
    List(Vec<ParamValue>),
    Null,
}

impl ParamValue {
    /// Coerce a raw (already trimmed, comment-free) value.
    pub fn coerce(raw: &str) -> Self {
        let raw = raw.trim();

        if let Some(inner) = unquote(raw) {
            return ParamValue::Str(inner.to_string());
        }

        if let Some(scalar) = coerce_literal(raw) {
            return scalar;
        }

        if let Some(items) = split_list(raw) {
            return ParamValue::List(items.into_iter().map(coerce_item).collect());
        }

        coerce_token(raw)
    }

    /// Parse a boolean literal (`True`/`False`, `yes`/`no`, `on`/`off`),
    /// case-insensitively.
    pub fn parse_bool(raw: &str) -> Option<bool> {
        let lower = raw.trim().to_ascii_lowercase();
        if TRUE_LITERALS.contains(&lower.as_str()) {
            Some(true)
        } else if FALSE_LITERALS.contains(&lower.as_str()) {
            Some(false)
        } else {
            None
        }
    }

    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "boolean",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::Path(_) => "path",
            ParamValue::Str(_) => "string",
            ParamValue::List(_) => "list",
            ParamValue::Null => "null",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, with integers widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Strings and paths both read as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            ParamValue::Path(p) => p.to_str(),
            _ => None,
        }
    }

    /// Paths and plain strings both read as paths.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ParamValue::Path(p) => Some(p),
            ParamValue::Str(s) => Some(Path::new(s)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(true) => write!(f, "True"),
            ParamValue::Bool(false) => write!(f, "False"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v:?}"),
            ParamValue::Path(p) => write!(f, "{}", p.display()),
            ParamValue::Str(s) if needs_quotes(s) => write!(f, "'{s}'"),
            ParamValue::Str(s) => write!(f, "{s}"),
            ParamValue::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ParamValue::Null => write!(f, "None"),
        }
    }
}

/// A string needs quoting on output when re-coercing it would not give a string back.
fn needs_quotes(s: &str) -> bool {
    !matches!(ParamValue::coerce(s), ParamValue::Str(ref back) if back == s)
}

fn unquote(raw: &str) -> Option<&str> {
    if raw.len() < 2 {
        return None;
    }
    let first = raw.chars().next()?;
    if (first == '\'' || first == '"') && raw.ends_with(first) {
        let inner = &raw[1..raw.len() - 1];
        // `'a', 'b'` is a list of quoted items, not one quoted string
        if !inner.contains(first) {
            return Some(inner);
        }
    }
    None
}

/// Boolean, null, integer and float literals.
fn coerce_literal(raw: &str) -> Option<ParamValue> {
    if let Some(b) = ParamValue::parse_bool(raw) {
        return Some(ParamValue::Bool(b));
    }

    if NULL_LITERALS.contains(&raw.to_ascii_lowercase().as_str()) {
        return Some(ParamValue::Null);
    }

    if let Ok(i) = raw.parse::<i64>() {
        return Some(ParamValue::Int(i));
    }

    // `inf`, `nan` and overflowing exponents stay strings
    if raw.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Some(ParamValue::Float(f));
            }
        }
    }

    None
}

/// Split a multi-token value into list items. Returns `None` for single tokens.
fn split_list(raw: &str) -> Option<Vec<&str>> {
    let bracketed = (raw.starts_with('[') && raw.ends_with(']'))
        || (raw.starts_with('(') && raw.ends_with(')'));
    let body = if bracketed {
        raw[1..raw.len() - 1].trim()
    } else {
        raw
    };

    if bracketed && body.is_empty() {
        return Some(Vec::new());
    }

    let items: Vec<&str> = if body.contains(',') {
        body.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .collect()
    } else {
        body.split_whitespace().collect()
    };

    if bracketed || items.len() > 1 {
        Some(items)
    } else {
        None
    }
}

/// List items are scalars: nested lists are not expanded.
fn coerce_item(raw: &str) -> ParamValue {
    if let Some(inner) = unquote(raw) {
        return ParamValue::Str(inner.to_string());
    }
    if let Some(scalar) = coerce_literal(raw) {
        return scalar;
    }
    if raw.split_whitespace().count() > 1 {
        return ParamValue::Str(raw.to_string());
    }
    coerce_token(raw)
}

fn coerce_token(raw: &str) -> ParamValue {
    let looks_like_path = raw.contains('/')
        || raw.contains('\\')
        || raw.starts_with('.')
        || raw.starts_with('~');
    if looks_like_path && !raw.contains(char::is_whitespace) {
        ParamValue::Path(PathBuf::from(raw))
    } else {
        ParamValue::Str(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booleans_case_insensitive() {
        assert_eq!(ParamValue::coerce("True"), ParamValue::Bool(true));
        assert_eq!(ParamValue::coerce("FALSE"), ParamValue::Bool(false));
        assert_eq!(ParamValue::coerce("yes"), ParamValue::Bool(true));
        assert_eq!(ParamValue::coerce("Off"), ParamValue::Bool(false));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(ParamValue::coerce("8"), ParamValue::Int(8));
        assert_eq!(ParamValue::coerce("-3"), ParamValue::Int(-3));
        assert_eq!(ParamValue::coerce("2.5"), ParamValue::Float(2.5));
        assert_eq!(ParamValue::coerce("1e-3"), ParamValue::Float(0.001));
    }

    #[test]
    fn test_non_finite_falls_through() {
        assert_eq!(ParamValue::coerce("nan"), ParamValue::Str("nan".to_string()));
        assert_eq!(ParamValue::coerce("inf"), ParamValue::Str("inf".to_string()));
        assert_eq!(
            ParamValue::coerce("1e999"),
            ParamValue::Str("1e999".to_string())
        );
    }

    #[test]
    fn test_null() {
        assert_eq!(ParamValue::coerce("None"), ParamValue::Null);
        assert_eq!(ParamValue::coerce("null"), ParamValue::Null);
    }

    #[test]
    fn test_paths_and_strings() {
        assert_eq!(
            ParamValue::coerce("/data/jwst/"),
            ParamValue::Path(PathBuf::from("/data/jwst/"))
        );
        assert_eq!(
            ParamValue::coerce("Stage2/"),
            ParamValue::Path(PathBuf::from("Stage2/"))
        );
        assert_eq!(
            ParamValue::coerce("calints"),
            ParamValue::Str("calints".to_string())
        );
    }

    #[test]
    fn test_quoted_strings_are_verbatim() {
        assert_eq!(ParamValue::coerce("'True'"), ParamValue::Str("True".to_string()));
        assert_eq!(
            ParamValue::coerce("\"two words\""),
            ParamValue::Str("two words".to_string())
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            ParamValue::coerce("[8, 10, 12]"),
            ParamValue::List(vec![
                ParamValue::Int(8),
                ParamValue::Int(10),
                ParamValue::Int(12)
            ])
        );
        assert_eq!(
            ParamValue::coerce("5 7"),
            ParamValue::List(vec![ParamValue::Int(5), ParamValue::Int(7)])
        );
        assert_eq!(
            ParamValue::coerce("1.5, linear"),
            ParamValue::List(vec![
                ParamValue::Float(1.5),
                ParamValue::Str("linear".to_string())
            ])
        );
        assert_eq!(ParamValue::coerce("[]"), ParamValue::List(Vec::new()));
    }

    #[test]
    fn test_coercion_is_deterministic() {
        for raw in ["True", "3", "3.0", "a/b", "x y", "[1,2]", "None", "plain"] {
            assert_eq!(ParamValue::coerce(raw), ParamValue::coerce(raw));
        }
    }

    #[test]
    fn test_display_recoerces() {
        for raw in ["True", "42", "0.25", "/abs/path", "[1, 2.5, x]", "None", "'True'"] {
            let value = ParamValue::coerce(raw);
            assert_eq!(ParamValue::coerce(&value.to_string()), value, "{raw}");
        }
    }

    #[test]
    fn test_accessors() {
        assert_eq!(ParamValue::Int(4).as_float(), Some(4.0));
        assert_eq!(ParamValue::Str("x".into()).as_path(), Some(Path::new("x")));
        assert_eq!(ParamValue::Bool(true).as_str(), None);
        assert!(ParamValue::Null.is_null());
    }
}
