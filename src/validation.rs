//! Schema validation
//!
//! A configspec is a second document with the same shape as the data, whose
//! values are check specifications. Validation walks both trees together:
//! sections the schema requires are created, every declared key is checked
//! and coerced through a [`Checker`], missing keys pick up defaults, and the
//! outcome is collapsed to a single verdict wherever a whole section passed
//! or failed. The wildcard name `__many__` applies a check or subsection
//! schema to every key the schema does not name.

use crate::config::{ConfigObj, SectionRef};
use crate::error::{ConfigObjError, ValidationError};
use crate::interpolation::{Interpolation, interpolate_value};
use crate::section::Section;
use crate::value::Value;
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

/// Key names that act as wildcards in a schema
pub const WILDCARD_NAMES: [&str; 3] = ["__many__", "___many___", "__many___"];

fn is_wildcard(name: &str) -> bool {
    WILDCARD_NAMES.contains(&name)
}

/// Checks one value against a check specification
pub trait Checker {
    /// Validates and converts `value`; `None` means the key is missing
    fn check(&self, spec: &str, value: Option<&Value>) -> Result<Value, ValidationError>;

    /// The converted default declared by `spec`, if there is one
    fn default_value(&self, _spec: &str) -> Option<Value> {
        None
    }
}

/// Flags controlling a validation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Report check failures as errors instead of plain `Invalid`
    pub preserve_errors: bool,
    /// Copy schema comments into the data and store defaults as real values
    pub copy: bool,
    /// Stop at the first failure and return it as an error
    pub fail_fast: bool,
}

impl ValidateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preserve_errors(mut self, preserve_errors: bool) -> Self {
        self.preserve_errors = preserve_errors;
        self
    }

    pub fn with_copy(mut self, copy: bool) -> Self {
        self.copy = copy;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Result of validating a key or a section
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Everything passed
    Valid,
    /// Everything failed, or a key failed without a preserved error
    Invalid,
    /// A key failed with this error
    Error(ValidationError),
    /// Mixed results, per key
    Section(IndexMap<String, Outcome>),
}

impl Outcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Outcome::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Outcome::Invalid)
    }

    /// Looks up the outcome for `key` inside a mixed result
    pub fn get(&self, key: &str) -> Option<&Outcome> {
        match self {
            Outcome::Section(map) => map.get(key),
            _ => None,
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Outcome::Invalid => false,
            Outcome::Section(map) => !map.is_empty(),
            _ => true,
        }
    }
}

/// One failure from [`flatten_errors`]
#[derive(Debug, Clone, PartialEq)]
pub struct FlatError {
    /// Section names from the root down to the failing entry
    pub sections: Vec<String>,
    /// Failing key, or `None` when a whole section failed
    pub key: Option<String>,
    /// The error, or `None` for a plain failure or missing value
    pub error: Option<ValidationError>,
}

/// Lists every failure in a validation outcome
pub fn flatten_errors(section: &Section, outcome: &Outcome) -> Vec<FlatError> {
    let mut results = Vec::new();
    let mut levels = Vec::new();
    flatten_into(section, outcome, &mut levels, &mut results);
    results
}

fn flatten_into(
    section: &Section,
    outcome: &Outcome,
    levels: &mut Vec<String>,
    results: &mut Vec<FlatError>,
) {
    let map = match outcome {
        Outcome::Valid => return,
        Outcome::Invalid | Outcome::Error(_) => {
            results.push(FlatError {
                sections: levels.clone(),
                key: None,
                error: error_of(outcome),
            });
            return;
        }
        Outcome::Section(map) => map,
    };
    for (key, result) in map {
        if result.is_valid() {
            continue;
        }
        if let Some(child) = section.section(key) {
            levels.push(key.clone());
            flatten_into(child, result, levels, results);
            levels.pop();
        } else {
            results.push(FlatError {
                sections: levels.clone(),
                key: Some(key.clone()),
                error: error_of(result),
            });
        }
    }
}

fn error_of(outcome: &Outcome) -> Option<ValidationError> {
    match outcome {
        Outcome::Error(error) => Some(error.clone()),
        _ => None,
    }
}

/// Rejects schemas declaring more than one wildcard subsection in a section
pub(crate) fn check_wildcards(spec: &Section, default_section: &str) -> Result<(), ConfigObjError> {
    let wildcards = spec.sections().filter(|(name, _)| is_wildcard(name)).count();
    if wildcards > 1 {
        return Err(ConfigObjError::RepeatSection {
            section: spec.name().to_string(),
        });
    }
    for (name, child) in spec.sections() {
        if name != default_section {
            check_wildcards(child, default_section)?;
        }
    }
    Ok(())
}

/// How one schema section maps onto data
struct Layout<'s> {
    scalars: Vec<&'s str>,
    many_scalar: Option<&'s str>,
    sections: Vec<&'s str>,
    many_section: Option<&'s str>,
}

impl<'s> Layout<'s> {
    fn of(spec: &'s Section, default_section: &str) -> Self {
        let mut layout = Layout {
            scalars: Vec::new(),
            many_scalar: None,
            sections: Vec::new(),
            many_section: None,
        };
        for (name, _) in spec.scalars() {
            if is_wildcard(name) {
                layout.many_scalar.get_or_insert(name);
            } else {
                layout.scalars.push(name);
            }
        }
        for (name, _) in spec.sections() {
            if name == default_section {
                continue;
            }
            if is_wildcard(name) {
                layout.many_section.get_or_insert(name);
            } else {
                layout.sections.push(name);
            }
        }
        layout
    }

    fn declares(&self, key: &str) -> bool {
        self.scalars.contains(&key) || self.sections.contains(&key)
    }
}

/// A check computed against an immutable view of the data
struct Pending {
    key: String,
    missing: bool,
    read: Option<Value>,
    default: Option<Value>,
    result: Result<Value, ValidationError>,
}

struct Walker<'v> {
    checker: &'v dyn Checker,
    options: ValidateOptions,
    interpolation: Interpolation,
    default_section: String,
}

/// Running verdict for one section
struct Verdict {
    out: IndexMap<String, Outcome>,
    all_true: bool,
    all_false: bool,
}

impl Verdict {
    fn new() -> Self {
        Self {
            out: IndexMap::new(),
            all_true: true,
            all_false: true,
        }
    }

    fn pass(&mut self, key: &str) {
        self.all_false = false;
        self.out.insert(key.to_string(), Outcome::Valid);
    }

    fn fail(&mut self, key: &str, error: ValidationError, preserve: bool) {
        self.all_true = false;
        if preserve && !error.is_missing() {
            self.all_false = false;
            self.out.insert(key.to_string(), Outcome::Error(error));
        } else {
            self.out.insert(key.to_string(), Outcome::Invalid);
        }
    }
}

fn chain_at<'d>(
    root: &'d Section,
    path: &[String],
) -> Result<SmallVec<[&'d Section; 8]>, ConfigObjError> {
    let mut chain: SmallVec<[&Section; 8]> = SmallVec::new();
    chain.push(root);
    let mut current = root;
    for name in path {
        current = current
            .section(name)
            .ok_or_else(|| ConfigObjError::KeyNotFound(name.clone()))?;
        chain.push(current);
    }
    Ok(chain)
}

fn section_at<'d>(
    root: &'d mut Section,
    path: &[String],
) -> Result<&'d mut Section, ConfigObjError> {
    let mut current = root;
    for name in path {
        current = current
            .section_mut(name)
            .ok_or_else(|| ConfigObjError::KeyNotFound(name.clone()))?;
    }
    Ok(current)
}

/// Reads a check specification, interpolated against the schema tree
fn spec_text(spec: &SectionRef<'_>, key: &str) -> String {
    match spec.get(key) {
        Ok(Some(value)) => value.to_string(),
        Ok(None) => String::new(),
        Err(error) => {
            debug!(key, %error, "configspec interpolation failed, using raw check");
            spec.raw(key).map(Value::to_string).unwrap_or_default()
        }
    }
}

impl Walker<'_> {
    fn validate_section(
        &self,
        root: &mut Section,
        path: &mut Vec<String>,
        spec: &SectionRef<'_>,
    ) -> Result<Outcome, ConfigObjError> {
        let spec_section = spec.as_section();
        let layout = Layout::of(spec_section, &self.default_section);
        let preserve = self.options.preserve_errors;
        let copy = self.options.copy;

        {
            let section = section_at(root, path)?;
            for &name in &layout.sections {
                if section.contains_key(name) {
                    continue;
                }
                let mut created = Section::new();
                created.created = true;
                section.insert(name, created);
                if copy {
                    copy_comments(section, spec_section, name);
                }
            }
        }

        let pending = self.run_checks(root, path, spec, &layout)?;

        let mut verdict = Verdict::new();
        let section = section_at(root, path)?;
        for check in pending {
            section.default_values.shift_remove(&check.key);
            if let Some(default) = check.default {
                section.default_values.insert(check.key.clone(), default);
            }
            if copy && check.missing && !section.contains_key(&check.key) {
                copy_comments(section, spec_section, &check.key);
            }
            match check.result {
                Err(error) => {
                    if self.options.fail_fast {
                        return Err(error.into());
                    }
                    verdict.fail(&check.key, error, preserve);
                }
                Ok(converted) => {
                    verdict.pass(&check.key);
                    if check.missing || check.read.as_ref() != Some(&converted) {
                        section.insert(check.key.clone(), converted);
                    }
                    if check.missing && !copy && !section.defaults.contains(&check.key) {
                        debug!(key = %check.key, "injected default value");
                        section.defaults.push(check.key);
                    }
                }
            }
        }

        for &name in &layout.scalars {
            if section.section(name).is_some() {
                let error = ValidationError::Custom(format!(
                    "Value '{}' was provided as a section",
                    name
                ));
                self.shape_mismatch(&mut verdict, name, error)?;
            }
        }
        for &name in &layout.sections {
            if section.value(name).is_some() {
                let error = ValidationError::Custom(format!(
                    "Section '{}' was provided as a single value",
                    name
                ));
                self.shape_mismatch(&mut verdict, name, error)?;
            }
        }

        let mut unvalidated: Vec<String> = section
            .scalar_keys()
            .into_iter()
            .filter(|key| layout.many_scalar.is_none() && !layout.declares(key))
            .collect();

        for name in section.section_keys() {
            if name == self.default_section {
                continue;
            }
            let declared_scalar = layout.scalars.contains(&name.as_str());
            let schema_name = if layout.sections.contains(&name.as_str()) {
                name.as_str()
            } else if let Some(many) = layout.many_section.filter(|_| !declared_scalar) {
                trace!(section = %name, "validating with wildcard section");
                many
            } else {
                unvalidated.push(name);
                continue;
            };
            let Some(child_spec) = spec.section(schema_name) else {
                continue;
            };
            if copy && spec_section.comments.contains_key(&name) {
                let section = section_at(root, path)?;
                copy_comments(section, spec_section, &name);
            }

            path.push(name.clone());
            let result = self.validate_section(root, path, &child_spec);
            path.pop();
            let result = result?;

            match result {
                Outcome::Invalid => verdict.all_true = false,
                Outcome::Valid => verdict.all_false = false,
                _ => verdict.all_true = false,
            }
            verdict.out.insert(name, result);
        }

        let section = section_at(root, path)?;
        section.extra_values = unvalidated;

        if preserve && !section.created {
            verdict.all_false = false;
        }
        if verdict.all_false && preserve && !verdict.out.is_empty() {
            verdict.all_false = !verdict.out.values().any(Outcome::is_truthy);
        }
        Ok(if verdict.all_true {
            Outcome::Valid
        } else if verdict.all_false {
            Outcome::Invalid
        } else {
            Outcome::Section(verdict.out)
        })
    }

    fn shape_mismatch(
        &self,
        verdict: &mut Verdict,
        name: &str,
        error: ValidationError,
    ) -> Result<(), ConfigObjError> {
        if self.options.fail_fast {
            return Err(error.into());
        }
        verdict.all_true = false;
        if self.options.preserve_errors {
            verdict.all_false = false;
            verdict.out.insert(name.to_string(), Outcome::Error(error));
        } else {
            verdict.out.insert(name.to_string(), Outcome::Invalid);
        }
        Ok(())
    }

    /// Runs every check of one section against a read-only view
    fn run_checks(
        &self,
        root: &Section,
        path: &[String],
        spec: &SectionRef<'_>,
        layout: &Layout<'_>,
    ) -> Result<Vec<Pending>, ConfigObjError> {
        let chain = chain_at(root, path)?;
        let section = chain[chain.len() - 1];
        let mut pending = Vec::new();

        for &key in &layout.scalars {
            if section.section(key).is_some() {
                continue;
            }
            let missing = section.value(key).is_none() || section.defaults.iter().any(|k| k == key);
            let read = if missing {
                None
            } else {
                self.read(&chain, key)?
            };
            let check = spec_text(spec, key);
            pending.push(self.pending(key, &check, read, missing));
        }

        if let Some(many) = layout.many_scalar {
            let check = spec_text(spec, many);
            for (key, _) in section.scalars() {
                if layout.declares(key) {
                    continue;
                }
                trace!(key, "validating with wildcard check");
                let read = self.read(&chain, key)?;
                pending.push(self.pending(key, &check, read, false));
            }
        }
        Ok(pending)
    }

    fn read(&self, chain: &[&Section], key: &str) -> Result<Option<Value>, ConfigObjError> {
        let section = chain[chain.len() - 1];
        let Some(raw) = section.value(key) else {
            return Ok(None);
        };
        let value = interpolate_value(chain, key, raw, self.interpolation, &self.default_section)?;
        Ok(Some(value))
    }

    fn pending(&self, key: &str, check: &str, read: Option<Value>, missing: bool) -> Pending {
        Pending {
            key: key.to_string(),
            missing,
            default: self.checker.default_value(check),
            result: self.checker.check(check, read.as_ref()),
            read,
        }
    }
}

fn copy_comments(section: &mut Section, spec: &Section, key: &str) {
    let comments = spec.comments.get(key).cloned().unwrap_or_default();
    let inline = spec.inline_comments.get(key).cloned().unwrap_or_default();
    section.comments.insert(key.to_string(), comments);
    section.inline_comments.insert(key.to_string(), inline);
}

impl ConfigObj {
    /// Validates the document against its attached schema
    ///
    /// Converted values are written back, missing keys receive defaults
    /// (recorded in each section's `defaults`), and schema sections absent
    /// from the data are created. Returns [`Outcome::Valid`] when everything
    /// passed, [`Outcome::Invalid`] when everything failed, and a per-key
    /// map otherwise.
    pub fn validate(
        &mut self,
        checker: &dyn Checker,
        options: ValidateOptions,
    ) -> Result<Outcome, ConfigObjError> {
        let spec = self
            .configspec
            .take()
            .ok_or(ConfigObjError::MissingConfigspec)?;
        let result = self.validate_against(&spec, checker, options);
        self.configspec = Some(spec);
        result
    }

    fn validate_against(
        &mut self,
        spec: &ConfigObj,
        checker: &dyn Checker,
        options: ValidateOptions,
    ) -> Result<Outcome, ConfigObjError> {
        if options.copy {
            self.initial_comment = spec.initial_comment.clone();
            self.final_comment = spec.final_comment.clone();
            self.indent_type = spec.indent_type.clone();
            self.newlines = spec.newlines;
        }
        let walker = Walker {
            checker,
            options,
            interpolation: self.options.interpolation,
            default_section: self.options.default_section.clone(),
        };
        let mut path = Vec::new();
        walker.validate_section(self.root_mut(), &mut path, &spec.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;

    /// Accepts anything, failing only on a value of "bad"
    struct Lenient;

    impl Checker for Lenient {
        fn check(&self, _spec: &str, value: Option<&Value>) -> Result<Value, ValidationError> {
            match value {
                None => Err(ValidationError::Missing),
                Some(v) if v.as_str() == Some("bad") => {
                    Err(ValidationError::Unacceptable("bad".into()))
                }
                Some(v) => Ok(v.clone()),
            }
        }
    }

    fn config(data: &[&str], spec: &[&str]) -> ConfigObj {
        ConfigObj::from_lines(data.iter().copied(), Options::default())
            .unwrap()
            .with_configspec(spec.iter().copied())
            .unwrap()
    }

    #[test]
    fn test_missing_configspec() {
        let mut plain = ConfigObj::new();
        assert!(matches!(
            plain.validate(&Lenient, ValidateOptions::default()),
            Err(ConfigObjError::MissingConfigspec)
        ));
    }

    #[test]
    fn test_all_valid_collapses() {
        let mut c = config(&["a = 1", "[s]", "b = 2"], &["a = x", "[s]", "b = x"]);
        let outcome = c.validate(&Lenient, ValidateOptions::default()).unwrap();
        assert_eq!(outcome, Outcome::Valid);
    }

    #[test]
    fn test_mixed_results() {
        let mut c = config(&["a = 1", "b = bad"], &["a = x", "b = x", "c = x"]);
        let outcome = c.validate(&Lenient, ValidateOptions::default()).unwrap();
        assert_eq!(outcome.get("a"), Some(&Outcome::Valid));
        assert_eq!(outcome.get("b"), Some(&Outcome::Invalid));
        assert_eq!(outcome.get("c"), Some(&Outcome::Invalid));
    }

    #[test]
    fn test_created_sections_and_extra_values() {
        let mut c = config(
            &["bar = 3", "something = 5", "[section]", "a = 1", "foo = 2", "[other]"],
            &["[section]", "a = x", "[required]"],
        );
        c.validate(&Lenient, ValidateOptions::default()).unwrap();
        assert_eq!(c.root().extra_values, ["bar", "something", "other"]);
        assert_eq!(c.root().section("section").unwrap().extra_values, ["foo"]);
        assert!(c.root().section("required").unwrap().was_created());
    }

    #[test]
    fn test_wildcard_scalars() {
        let mut c = config(&["a = 1", "b = bad"], &["__many__ = x"]);
        let outcome = c.validate(&Lenient, ValidateOptions::default()).unwrap();
        assert_eq!(outcome.get("b"), Some(&Outcome::Invalid));
        assert!(c.root().extra_values.is_empty());
    }

    #[test]
    fn test_repeated_wildcard_sections_rejected() {
        let error = ConfigObj::new()
            .with_configspec(["[__many__]", "a = x", "[___many___]", "b = x"])
            .unwrap_err();
        assert!(matches!(error, ConfigObjError::RepeatSection { .. }));
    }

    #[test]
    fn test_trailing_underscore_wildcard() {
        let mut c = config(&["a = 6", "b = bad"], &["__many___ = x"]);
        let outcome = c.validate(&Lenient, ValidateOptions::default()).unwrap();
        assert_eq!(outcome.get("a"), Some(&Outcome::Valid));
        assert_eq!(outcome.get("b"), Some(&Outcome::Invalid));
        assert!(c.root().extra_values.is_empty());

        let error = ConfigObj::new()
            .with_configspec(["[__many__]", "a = x", "[__many___]", "b = x"])
            .unwrap_err();
        assert!(matches!(error, ConfigObjError::RepeatSection { .. }));
    }

    #[test]
    fn test_fail_fast() {
        let mut c = config(&["a = bad", "b = bad"], &["a = x", "b = x"]);
        let error = c
            .validate(&Lenient, ValidateOptions::default().with_fail_fast(true))
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigObjError::Validation(ValidationError::Unacceptable(_))
        ));
    }

    #[test]
    fn test_flatten_nested() {
        let mut c = config(
            &["a = bad", "[s]", "b = bad", "ok = 1"],
            &["a = x", "[s]", "b = x", "ok = x"],
        );
        let outcome = c
            .validate(&Lenient, ValidateOptions::default().with_preserve_errors(true))
            .unwrap();
        let flat = flatten_errors(c.root(), &outcome);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].sections, Vec::<String>::new());
        assert_eq!(flat[0].key.as_deref(), Some("a"));
        assert_eq!(flat[1].sections, ["s"]);
        assert_eq!(flat[1].key.as_deref(), Some("b"));
        assert_eq!(
            flat[1].error,
            Some(ValidationError::Unacceptable("bad".to_string()))
        );
    }
}
