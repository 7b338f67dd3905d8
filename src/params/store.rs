use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::control::parser::ControlFileEntry;
use crate::control::value::ParamValue;
use crate::error::{PipelineError, Result};
use crate::params::schema::{
    reserved_kind, StageSchema, EVENTLABEL, INPUTDIR, OUTPUTDIR, RESERVED_KEYS, SKIP_PREFIX, SUFFIX, TOPDIR,
};

/// Where a parameter's value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "kebab-case")]
pub enum ParamSource {
    ControlFile { line: usize },
    Default,
    /// Supplied by the stage request, overriding the control file
    Request,
}

/// A typed parameter value plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub value: ParamValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub source: ParamSource,
}

/// Validated, typed, read-only parameters for one stage invocation.
///
/// All defaulting and path composition happens in [`ParameterStore::build`];
/// lookups never fall back to a default. Serializes as a plain key → parameter
/// map and re-validates the reserved keys when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<String, Parameter>",
    try_from = "BTreeMap<String, Parameter>"
)]
pub struct ParameterStore {
    values: BTreeMap<String, Parameter>,
}

impl ParameterStore {
    /// Build a store from control-file entries.
    ///
    /// Relative `topdir` values resolve against the current directory.
    pub fn build(
        entries: &[ControlFileEntry],
        required_keys: &[&str],
        defaults: &BTreeMap<String, ParamValue>,
    ) -> Result<Self> {
        let base = std::env::current_dir().map_err(|source| PipelineError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        Self::build_in(entries, required_keys, defaults, &base)
    }

    /// Build a store from a stage schema, resolving a relative `topdir`
    /// against `base_dir` (normally the control file's directory).
    pub fn from_schema(
        entries: &[ControlFileEntry],
        schema: &StageSchema,
        base_dir: &Path,
    ) -> Result<Self> {
        Self::build_in(entries, &schema.required_keys(), &schema.defaults, base_dir)
    }

    fn build_in(
        entries: &[ControlFileEntry],
        required_keys: &[&str],
        defaults: &BTreeMap<String, ParamValue>,
        base_dir: &Path,
    ) -> Result<Self> {
        let mut values: BTreeMap<String, Parameter> = defaults
            .iter()
            .map(|(key, value)| {
                let param = Parameter {
                    value: value.clone(),
                    comment: None,
                    source: ParamSource::Default,
                };
                (key.clone(), param)
            })
            .collect();

        for entry in entries {
            let value = ParamValue::coerce(&entry.raw_value);
            tracing::debug!(key = %entry.key, kind = value.type_name(), "coerced parameter");
            values.insert(
                entry.key.clone(),
                Parameter {
                    value,
                    comment: entry.comment.clone(),
                    source: ParamSource::ControlFile { line: entry.line },
                },
            );
        }

        for key in required_keys.iter().chain(RESERVED_KEYS) {
            if !values.contains_key(*key) {
                return Err(PipelineError::MissingParameter {
                    key: key.to_string(),
                });
            }
        }

        check_reserved_types(&values)?;
        resolve_paths(&mut values, base_dir)?;

        Ok(Self { values })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn parameter(&self, key: &str) -> Result<&Parameter> {
        self.values
            .get(key)
            .ok_or_else(|| PipelineError::UnknownParameter {
                key: key.to_string(),
            })
    }

    pub fn get(&self, key: &str) -> Result<&ParamValue> {
        self.parameter(key).map(|p| &p.value)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get(key)?;
        value.as_bool().ok_or_else(|| mismatch(key, "a boolean", value))
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get(key)?;
        value.as_int().ok_or_else(|| mismatch(key, "an integer", value))
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        let value = self.get(key)?;
        value.as_float().ok_or_else(|| mismatch(key, "a number", value))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        let value = self.get(key)?;
        value.as_str().ok_or_else(|| mismatch(key, "a string", value))
    }

    pub fn get_path(&self, key: &str) -> Result<&Path> {
        let value = self.get(key)?;
        value.as_path().ok_or_else(|| mismatch(key, "a path", value))
    }

    pub fn get_list(&self, key: &str) -> Result<&[ParamValue]> {
        let value = self.get(key)?;
        value.as_list().ok_or_else(|| mismatch(key, "a list", value))
    }

    /// Resolved absolute `topdir`.
    pub fn topdir(&self) -> Result<&Path> {
        self.get_path(TOPDIR)
    }

    /// Resolved absolute `inputdir`.
    pub fn inputdir(&self) -> Result<&Path> {
        self.get_path(INPUTDIR)
    }

    /// Resolved absolute `outputdir`.
    pub fn outputdir(&self) -> Result<&Path> {
        self.get_path(OUTPUTDIR)
    }

    pub fn suffix(&self) -> Result<&str> {
        self.get_str(SUFFIX)
    }

    /// Replace the `suffix` token with one supplied by the caller.
    pub fn override_suffix(mut self, suffix: &str) -> Self {
        self.values.insert(
            SUFFIX.to_string(),
            Parameter {
                value: ParamValue::Str(suffix.to_string()),
                comment: None,
                source: ParamSource::Request,
            },
        );
        self
    }

    /// The optional `eventlabel`. Absent is `None`; present but not a
    /// string is a coercion error.
    pub fn eventlabel(&self) -> Result<Option<&str>> {
        if !self.contains(EVENTLABEL) {
            return Ok(None);
        }
        self.get_str(EVENTLABEL).map(Some)
    }

    /// All `skip_<step>` flags as `(step, enabled)` pairs.
    pub fn skip_flags(&self) -> impl Iterator<Item = (&str, bool)> {
        self.values.iter().filter_map(|(key, param)| {
            let step = key.strip_prefix(SKIP_PREFIX)?;
            Some((step, param.value.as_bool()?))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<ParameterStore> for BTreeMap<String, Parameter> {
    fn from(store: ParameterStore) -> Self {
        store.values
    }
}

impl TryFrom<BTreeMap<String, Parameter>> for ParameterStore {
    type Error = PipelineError;

    fn try_from(values: BTreeMap<String, Parameter>) -> Result<Self> {
        for key in RESERVED_KEYS {
            if !values.contains_key(*key) {
                return Err(PipelineError::MissingParameter {
                    key: key.to_string(),
                });
            }
        }
        check_reserved_types(&values)?;
        Ok(Self { values })
    }
}

fn mismatch(key: &str, expected: &'static str, value: &ParamValue) -> PipelineError {
    PipelineError::TypeCoercion {
        key: key.to_string(),
        expected,
        found: format!("{} '{}'", value.type_name(), value),
    }
}

fn check_reserved_types(values: &BTreeMap<String, Parameter>) -> Result<()> {
    for (key, param) in values {
        if let Some(kind) = reserved_kind(key) {
            if !kind.accepts(&param.value) {
                return Err(mismatch(key, kind.expected(), &param.value));
            }
        }
    }
    Ok(())
}

/// Make `topdir` absolute, then compose `inputdir`/`outputdir` onto it.
fn resolve_paths(values: &mut BTreeMap<String, Parameter>, base_dir: &Path) -> Result<()> {
    let topdir = absolutize(base_dir, path_of(values, TOPDIR)?);
    set_path(values, TOPDIR, topdir.clone());

    for key in [INPUTDIR, OUTPUTDIR] {
        let resolved = absolutize(&topdir, path_of(values, key)?);
        set_path(values, key, resolved);
    }
    Ok(())
}

fn path_of<'a>(values: &'a BTreeMap<String, Parameter>, key: &str) -> Result<&'a Path> {
    let param = values
        .get(key)
        .ok_or_else(|| PipelineError::MissingParameter {
            key: key.to_string(),
        })?;
    param
        .value
        .as_path()
        .ok_or_else(|| mismatch(key, "a path", &param.value))
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn set_path(values: &mut BTreeMap<String, Parameter>, key: &str, path: PathBuf) {
    if let Some(param) = values.get_mut(key) {
        param.value = ParamValue::Path(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::parser::parse_control_file;
    use crate::models::stage::StageId;

    fn defaults(pairs: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn reserved_defaults() -> BTreeMap<String, ParamValue> {
        defaults(&[
            ("topdir", ParamValue::Path("/proj".into())),
            ("inputdir", ParamValue::Path("Stage2".into())),
            ("outputdir", ParamValue::Path("out".into())),
            ("suffix", ParamValue::Str("calints".into())),
        ])
    }

    #[test]
    fn test_missing_required_key() {
        let defaults = defaults(&[
            ("topdir", ParamValue::Path("/proj".into())),
            ("outputdir", ParamValue::Path("/proj".into())),
            ("suffix", ParamValue::Str("uncal".into())),
        ]);
        let err = ParameterStore::build(&[], &["inputdir"], &defaults).unwrap_err();
        match err {
            PipelineError::MissingParameter { key } => assert_eq!(key, "inputdir"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reserved_key_never_absent() {
        let mut defaults = reserved_defaults();
        defaults.remove("suffix");
        let err = ParameterStore::build(&[], &[], &defaults).unwrap_err();
        assert!(matches!(err, PipelineError::MissingParameter { ref key } if key == "suffix"));
    }

    #[test]
    fn test_paths_compose_onto_topdir() {
        let parsed = parse_control_file("topdir /data/wasp39b\ninputdir Stage2/\noutputdir /scratch/out").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap();
        assert_eq!(store.topdir().unwrap(), Path::new("/data/wasp39b"));
        assert_eq!(store.inputdir().unwrap(), Path::new("/data/wasp39b/Stage2/"));
        assert_eq!(store.outputdir().unwrap(), Path::new("/scratch/out"));
    }

    #[test]
    fn test_relative_topdir_resolves_against_base() {
        let parsed = parse_control_file("topdir analysis\ninputdir raw").unwrap();
        let schema = StageSchema::for_stage(StageId::S1, Path::new("/proj"));
        let store = ParameterStore::from_schema(&parsed.entries, &schema, Path::new("/home/obs")).unwrap();
        assert_eq!(store.topdir().unwrap(), Path::new("/home/obs/analysis"));
        assert_eq!(store.inputdir().unwrap(), Path::new("/home/obs/analysis/raw"));
        // The default outputdir is absolute and stays as it is
        assert_eq!(store.outputdir().unwrap(), Path::new("/proj"));
    }

    #[test]
    fn test_skip_flag_must_be_boolean() {
        let parsed = parse_control_file("skip_flat_field maybe").unwrap();
        let err = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap_err();
        match err {
            PipelineError::TypeCoercion { key, expected, .. } => {
                assert_eq!(key, "skip_flat_field");
                assert_eq!(expected, "a boolean");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_path_key_rejects_number() {
        let parsed = parse_control_file("outputdir 42").unwrap();
        let err = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap_err();
        assert!(matches!(err, PipelineError::TypeCoercion { ref key, .. } if key == "outputdir"));
    }

    #[test]
    fn test_non_reserved_keys_accept_anything() {
        let parsed = parse_control_file("ncpu 4\nbg_hw [8, 10]\nwave_pixel_offset None").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap();
        assert_eq!(store.get_int("ncpu").unwrap(), 4);
        assert_eq!(store.get_list("bg_hw").unwrap().len(), 2);
        assert!(store.get("wave_pixel_offset").unwrap().is_null());
    }

    #[test]
    fn test_unknown_key_fails() {
        let store = ParameterStore::build(&[], &[], &reserved_defaults()).unwrap();
        let err = store.get("spec_hw").unwrap_err();
        assert!(matches!(err, PipelineError::UnknownParameter { ref key } if key == "spec_hw"));
        assert!(!store.contains("spec_hw"));
    }

    #[test]
    fn test_read_type_mismatch() {
        let parsed = parse_control_file("ncpu four").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap();
        assert!(matches!(
            store.get_int("ncpu").unwrap_err(),
            PipelineError::TypeCoercion { .. }
        ));
    }

    #[test]
    fn test_control_file_overrides_default_and_keeps_comment() {
        let parsed = parse_control_file("suffix rateints # from stage 1").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap();
        let param = store.parameter("suffix").unwrap();
        assert_eq!(param.value, ParamValue::Str("rateints".into()));
        assert_eq!(param.comment.as_deref(), Some("from stage 1"));
        assert_eq!(param.source, ParamSource::ControlFile { line: 1 });
        assert_eq!(store.parameter("topdir").unwrap().source, ParamSource::Default);
    }

    #[test]
    fn test_skip_flags() {
        let parsed = parse_control_file("skip_flat_field True\nskip_photom False").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap();
        let flags: Vec<_> = store.skip_flags().collect();
        assert_eq!(flags, vec![("flat_field", true), ("photom", false)]);
        assert!(store.get_bool("skip_flat_field").unwrap());
    }

    #[test]
    fn test_serde_roundtrip_revalidates() {
        let parsed = parse_control_file("skip_photom True\nncpu 8").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap();
        let yaml = serde_yaml::to_string(&store).unwrap();
        let back: ParameterStore = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, store);

        let mut raw: BTreeMap<String, Parameter> = store.into();
        raw.remove("topdir");
        let yaml = serde_yaml::to_string(&raw).unwrap();
        assert!(serde_yaml::from_str::<ParameterStore>(&yaml).is_err());
    }

    #[test]
    fn test_eventlabel_must_be_a_string() {
        let store = ParameterStore::build(&[], &[], &reserved_defaults()).unwrap();
        assert_eq!(store.eventlabel().unwrap(), None);

        let parsed = parse_control_file("eventlabel wasp39b").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap();
        assert_eq!(store.eventlabel().unwrap(), Some("wasp39b"));

        let parsed = parse_control_file("eventlabel 39").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults()).unwrap();
        assert!(matches!(
            store.eventlabel().unwrap_err(),
            PipelineError::TypeCoercion { ref key, .. } if key == "eventlabel"
        ));
    }

    #[test]
    fn test_override_suffix_records_request_source() {
        let parsed = parse_control_file("suffix calints").unwrap();
        let store = ParameterStore::build(&parsed.entries, &[], &reserved_defaults())
            .unwrap()
            .override_suffix("rateints");
        assert_eq!(store.suffix().unwrap(), "rateints");
        assert_eq!(store.parameter("suffix").unwrap().source, ParamSource::Request);
    }
}
