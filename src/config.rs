//! The configuration object and its options
//!
//! [`ConfigObj`] owns the root [`Section`] together with document-level state:
//! the comments before and after the content, the indentation and newline
//! style, the options the document was parsed with, and an optional schema.
//! [`SectionRef`] is a borrowed view that knows the path from the root to a
//! section, which is what interpolated reads need to resolve references.

use crate::error::{ConfigObjError, InterpolationError, ParseErrors};
use crate::interpolation::{Interpolation, interpolate_value};
use crate::parser::DocumentParser;
use crate::section::{Entry, Section};
use crate::value::Value;
use smallvec::SmallVec;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options controlling parsing, reading and writing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Return the first structural error instead of collecting them all
    pub raise_errors: bool,
    /// Parse comma-separated values as lists and strip quotes
    pub list_values: bool,
    /// Create the file when loading a path that does not exist
    pub create_empty: bool,
    /// Fail when loading a path that does not exist
    pub file_error: bool,
    pub interpolation: Interpolation,
    /// Name of the section holding fallback values for interpolation
    pub default_section: String,
    /// Write empty strings as `key =` rather than `key = ""`
    pub write_empty_values: bool,
    /// Read and write values as typed literals
    pub unrepr: bool,
    /// Keep values verbatim, as needed for schema documents
    pub inspec: bool,
    /// Indentation unit for writing; detected from input when unset
    pub indent_type: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            raise_errors: false,
            list_values: true,
            create_empty: false,
            file_error: false,
            interpolation: Interpolation::ConfigParser,
            default_section: DEFAULT_SECTION.to_string(),
            write_empty_values: false,
            unrepr: false,
            inspec: false,
            indent_type: None,
        }
    }
}

/// Name of the interpolation fallback section
pub const DEFAULT_SECTION: &str = "DEFAULT";

impl Options {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raise_errors(mut self, raise_errors: bool) -> Self {
        self.raise_errors = raise_errors;
        self
    }

    pub fn with_list_values(mut self, list_values: bool) -> Self {
        self.list_values = list_values;
        self
    }

    pub fn with_create_empty(mut self, create_empty: bool) -> Self {
        self.create_empty = create_empty;
        self
    }

    pub fn with_file_error(mut self, file_error: bool) -> Self {
        self.file_error = file_error;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_default_section(mut self, name: impl Into<String>) -> Self {
        self.default_section = name.into();
        self
    }

    pub fn with_write_empty_values(mut self, write_empty_values: bool) -> Self {
        self.write_empty_values = write_empty_values;
        self
    }

    /// Enables typed literals; list syntax is switched off in this mode
    pub fn with_unrepr(mut self, unrepr: bool) -> Self {
        self.unrepr = unrepr;
        if unrepr {
            self.list_values = false;
        }
        self
    }

    pub fn with_inspec(mut self, inspec: bool) -> Self {
        self.inspec = inspec;
        self
    }

    pub fn with_indent_type(mut self, indent: impl Into<String>) -> Self {
        self.indent_type = Some(indent.into());
        self
    }
}

/// Line terminator style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Newline {
    #[default]
    Lf,
    CrLf,
}

impl Newline {
    pub fn as_str(self) -> &'static str {
        match self {
            Newline::Lf => "\n",
            Newline::CrLf => "\r\n",
        }
    }

    /// Style of the first terminated line in `text`
    pub fn detect(text: &str) -> Option<Self> {
        let end = text.find('\n')?;
        if text[..end].ends_with('\r') {
            Some(Newline::CrLf)
        } else {
            Some(Newline::Lf)
        }
    }
}

/// A parsed configuration document
#[derive(Debug, Clone, Default)]
pub struct ConfigObj {
    root: Section,
    pub options: Options,
    /// Comment lines before the first content line
    pub initial_comment: Vec<String>,
    /// Comment lines after the last content line
    pub final_comment: Vec<String>,
    /// Indentation unit; four spaces are used when unset
    pub indent_type: Option<String>,
    pub newlines: Option<Newline>,
    /// Path the document was loaded from, used by reload
    pub filename: Option<PathBuf>,
    pub(crate) configspec: Option<Box<ConfigObj>>,
}

impl PartialEq for ConfigObj {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl ConfigObj {
    /// Creates an empty document with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document with the given options
    pub fn with_options(options: Options) -> Self {
        Self {
            indent_type: options.indent_type.clone(),
            options,
            ..Self::default()
        }
    }

    /// Parses a document from lines
    ///
    /// Line terminators are stripped; the first one seen sets the newline
    /// style. In the default mode every structural error is collected and
    /// returned together with the partial tree as
    /// [`ConfigObjError::Aggregate`].
    pub fn from_lines<I, S>(lines: I, options: Options) -> Result<Self, ConfigObjError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut newlines = None;
        let lines: Vec<String> = lines
            .into_iter()
            .map(|line| {
                let line = line.as_ref();
                if newlines.is_none() {
                    newlines = Newline::detect(line);
                }
                line.trim_end_matches(['\n', '\r']).to_string()
            })
            .collect();

        let document = DocumentParser::new(&options).parse(&lines)?;
        let mut config = Self::with_options(options);
        config.root = document.root;
        config.initial_comment = document.initial_comment;
        config.final_comment = document.final_comment;
        if config.indent_type.is_none() {
            config.indent_type = Some(document.indent_type.unwrap_or_default());
        }
        config.newlines = newlines;

        if document.errors.is_empty() {
            Ok(config)
        } else {
            Err(ParseErrors::new(document.errors, config).into())
        }
    }

    /// Parses a document from text
    pub fn parse(text: &str, options: Options) -> Result<Self, ConfigObjError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self::from_lines(text.split_inclusive('\n'), options)
    }

    /// Loads a document from a file
    ///
    /// A missing file yields an empty document, is created when
    /// `create_empty` is set, or is an error when `file_error` is set.
    pub fn from_file(path: impl AsRef<Path>, options: Options) -> Result<Self, ConfigObjError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let text = fs::read_to_string(path)?;
            Self::parse(&text, options)?
        } else if options.file_error {
            return Err(ConfigObjError::FileNotFound(path.to_path_buf()));
        } else {
            if options.create_empty {
                fs::write(path, "")?;
            }
            Self::with_options(options)
        };
        config.filename = Some(path.to_path_buf());
        Ok(config)
    }

    /// Re-reads the document from its file, keeping options and schema
    pub fn reload(&mut self) -> Result<(), ConfigObjError> {
        let path = self.filename.clone().ok_or(ConfigObjError::Reload)?;
        let mut fresh = Self::from_file(&path, self.options.clone())?;
        fresh.configspec = self.configspec.take();
        *self = fresh;
        Ok(())
    }

    /// Writes the document to `path`
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigObjError> {
        fs::write(path, self.write_string()?)?;
        Ok(())
    }

    /// Attaches a schema, parsed from lines in spec mode
    pub fn with_configspec<I, S>(mut self, lines: I) -> Result<Self, ConfigObjError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let options = Options::default()
            .with_raise_errors(true)
            .with_inspec(true);
        let spec = Self::from_lines(lines, options)
            .map_err(|error| ConfigObjError::Configspec(Box::new(error)))?;
        self.set_configspec(spec)?;
        Ok(self)
    }

    /// Attaches an already parsed schema
    pub fn set_configspec(&mut self, spec: ConfigObj) -> Result<(), ConfigObjError> {
        crate::validation::check_wildcards(&spec.root, &spec.options.default_section)?;
        debug!(sections = spec.root.sections().count(), "attached configspec");
        self.configspec = Some(Box::new(spec));
        Ok(())
    }

    pub fn configspec(&self) -> Option<&ConfigObj> {
        self.configspec.as_deref()
    }

    pub fn root(&self) -> &Section {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Section {
        &mut self.root
    }

    /// Interpolating view of the root section
    pub fn view(&self) -> SectionRef<'_> {
        SectionRef::new(&self.root, &self.options)
    }

    /// Reads a top-level value with interpolation applied
    pub fn get(&self, key: &str) -> Result<Option<Value>, InterpolationError> {
        self.view().get(key)
    }

    /// Interpolating view of a top-level section
    pub fn section(&self, name: &str) -> Option<SectionRef<'_>> {
        self.view().section(name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.root.section_mut(name)
    }

    /// Stores a top-level entry
    pub fn insert(&mut self, key: impl Into<String>, entry: impl Into<Entry>) -> Option<Entry> {
        self.root.insert(key, entry)
    }

    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.root.remove(key)
    }

    /// Recursively merges another document's tree into this one
    pub fn merge(&mut self, other: &ConfigObj) {
        self.root.merge(&other.root);
    }

    /// Restores every default recorded by validation
    pub fn restore_defaults(&mut self) {
        self.root.restore_defaults();
    }

    /// Returns the document to the state of [`ConfigObj::new`]
    ///
    /// Entries, comments, recorded defaults, the schema and the filename
    /// are dropped and the options go back to their defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A borrowed section together with its ancestors
///
/// Reads through a view are interpolated using the document's options.
#[derive(Debug, Clone)]
pub struct SectionRef<'a> {
    chain: SmallVec<[&'a Section; 8]>,
    interpolation: Interpolation,
    default_section: &'a str,
}

impl<'a> SectionRef<'a> {
    pub(crate) fn new(root: &'a Section, options: &'a Options) -> Self {
        let mut chain = SmallVec::new();
        chain.push(root);
        Self {
            chain,
            interpolation: options.interpolation,
            default_section: &options.default_section,
        }
    }

    /// The underlying section
    pub fn as_section(&self) -> &'a Section {
        self.chain[self.chain.len() - 1]
    }

    pub fn name(&self) -> &'a str {
        self.as_section().name()
    }

    pub fn depth(&self) -> usize {
        self.chain.len() - 1
    }

    /// Sections from the root down to this one
    pub fn chain(&self) -> &[&'a Section] {
        &self.chain
    }

    /// The enclosing section, or `None` at the root
    pub fn parent(&self) -> Option<SectionRef<'a>> {
        if self.chain.len() < 2 {
            return None;
        }
        let mut parent = self.clone();
        parent.chain.pop();
        Some(parent)
    }

    /// The root of the tree
    pub fn main(&self) -> SectionRef<'a> {
        let mut root = self.clone();
        root.chain.truncate(1);
        root
    }

    /// View of a subsection
    pub fn section(&self, name: &str) -> Option<SectionRef<'a>> {
        let child = self.as_section().section(name)?;
        let mut view = self.clone();
        view.chain.push(child);
        Some(view)
    }

    /// Reads a value with interpolation applied
    ///
    /// Returns `Ok(None)` when the key is absent or names a subsection.
    pub fn get(&self, key: &str) -> Result<Option<Value>, InterpolationError> {
        let Some(value) = self.as_section().value(key) else {
            return Ok(None);
        };
        interpolate_value(
            &self.chain,
            key,
            value,
            self.interpolation,
            self.default_section,
        )
        .map(Some)
    }

    /// Like [`SectionRef::get`], failing when the key is absent
    pub fn value(&self, key: &str) -> Result<Value, ConfigObjError> {
        self.get(key)?
            .ok_or_else(|| ConfigObjError::KeyNotFound(key.to_string()))
    }

    /// Raw value without interpolation
    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.as_section().value(key)
    }

    /// Interpolated values of every scalar key, in order
    pub fn items(&self) -> Result<Vec<(&'a str, Value)>, InterpolationError> {
        let section = self.as_section();
        section
            .scalars()
            .map(|(key, _)| {
                let value = self.get(key)?.unwrap_or_default();
                Ok((key, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_and_read() {
        let config = ConfigObj::parse(
            "name = fred\ngreeting = hello %(name)s\n[sub]\nx = %(name)s!\n",
            Options::default(),
        )
        .unwrap();
        assert_eq!(config.get("greeting").unwrap(), Some(Value::from("hello fred")));
        let sub = config.section("sub").unwrap();
        assert_eq!(sub.get("x").unwrap(), Some(Value::from("fred!")));
        assert_eq!(sub.parent().unwrap().depth(), 0);
        assert_eq!(sub.raw("x"), Some(&Value::from("%(name)s!")));
        assert_eq!(config.newlines, Some(Newline::Lf));
        assert_eq!(config.indent_type.as_deref(), Some(""));
    }

    #[test]
    fn test_crlf_detection() {
        let config = ConfigObj::parse("a = 1\r\nb = 2\r\n", Options::default()).unwrap();
        assert_eq!(config.newlines, Some(Newline::CrLf));
        assert_eq!(config.root().value("a"), Some(&Value::from("1")));
    }

    #[test]
    fn test_aggregate_error_keeps_partial_tree() {
        let error = ConfigObj::from_lines(["a = 1", "oops", "b = 2"], Options::default())
            .unwrap_err();
        assert_eq!(error.errors().len(), 1);
        assert_eq!(error.kind(), Some(ErrorKind::Parse));
        let ConfigObjError::Aggregate(aggregate) = error else {
            panic!("expected aggregate error");
        };
        let partial = aggregate.into_config();
        assert_eq!(partial.root().len(), 2);
    }

    #[test]
    fn test_raise_errors_mode() {
        let options = Options::default().with_raise_errors(true);
        let error = ConfigObj::from_lines(["oops", "also bad"], options).unwrap_err();
        assert!(matches!(error, ConfigObjError::Parse(_)));
        assert_eq!(error.errors().len(), 1);
    }

    #[test]
    fn test_interpolation_off() {
        let options = Options::default().with_interpolation(Interpolation::Off);
        let config = ConfigObj::from_lines(["a = %(b)s", "b = x"], options).unwrap();
        assert_eq!(config.get("a").unwrap(), Some(Value::from("%(b)s")));
    }

    #[test]
    fn test_reset_matches_new() {
        let options = Options::default()
            .with_list_values(false)
            .with_raise_errors(true)
            .with_unrepr(true);
        let mut config = ConfigObj::from_lines(["# c", "a = 1", "# end"], options).unwrap();
        config.filename = Some(PathBuf::from("settings.ini"));
        config.root_mut().default_values.insert("b".to_string(), Value::Integer(3));
        config = config.with_configspec(["b = integer(default=3)"]).unwrap();

        config.reset();
        assert!(config.root().is_empty());
        assert!(config.root().default_values.is_empty());
        assert!(config.initial_comment.is_empty());
        assert!(config.final_comment.is_empty());
        assert!(config.configspec().is_none());
        assert!(config.filename.is_none());
        assert!(config.newlines.is_none());
        assert!(config.indent_type.is_none());
        assert_eq!(config.options, Options::default());
        assert_eq!(config, ConfigObj::new());
    }

    #[test]
    fn test_reload_without_filename() {
        let mut config = ConfigObj::new();
        assert!(matches!(config.reload(), Err(ConfigObjError::Reload)));
    }

    #[test]
    fn test_items_and_main() {
        let config = ConfigObj::from_lines(
            ["a = 1", "b = %(a)s2", "[s]", "[[t]]", "c = 3"],
            Options::default(),
        )
        .unwrap();
        let items = config.view().items().unwrap();
        assert_eq!(items, vec![("a", Value::from("1")), ("b", Value::from("12"))]);
        let t = config.section("s").unwrap().section("t").unwrap();
        assert_eq!(t.depth(), 2);
        assert_eq!(t.name(), "t");
        assert_eq!(t.main().depth(), 0);
    }

    #[test]
    fn test_configspec_parse_failure() {
        let error = ConfigObj::new()
            .with_configspec(["ok = integer", "[broken"])
            .unwrap_err();
        assert!(matches!(error, ConfigObjError::Configspec(_)));
        assert!(error.to_string().starts_with("Parsing configspec failed"));
        assert_eq!(error.errors().len(), 1);
    }
}
