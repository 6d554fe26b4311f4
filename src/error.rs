//! Error types for parsing, interpolation and validation
//!
//! Structural errors carry the 1-based line number and the text of the
//! offending line, so callers can point users at the exact spot. Parsing
//! collects every structural error by default and reports them together
//! through [`ConfigObjError::Aggregate`].

use crate::config::ConfigObj;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Broad category of a structural parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed value syntax: bad list, unterminated quote, unparseable line
    Parse,
    /// Repeated key or section name at one nesting level
    Duplicate,
    /// Illegal section depth transition
    Nesting,
    /// Malformed literal in unrepr mode
    Unrepr,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "ParseError",
            ErrorKind::Duplicate => "DuplicateError",
            ErrorKind::Nesting => "NestingError",
            ErrorKind::Unrepr => "UnreprError",
        };
        f.write_str(name)
    }
}

/// A structural error found on one line of input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Line is neither a section marker, a `key = value` pair nor a comment
    #[error("Invalid line at line {line}.")]
    InvalidLine { line: usize, text: String },

    /// Badly quoted value or malformed list
    #[error("Parse error in value at line {line}.")]
    BadValue { line: usize, text: String },

    /// Key declared twice in the same section
    #[error("Duplicate keyword name at line {line}.")]
    DuplicateKey {
        key: String,
        line: usize,
        text: String,
    },

    /// Section declared twice under the same parent
    #[error("Duplicate section name at line {line}.")]
    DuplicateSection {
        name: String,
        line: usize,
        text: String,
    },

    /// Section marker opens more than one level below the current section
    #[error("Section too nested at line {line}.")]
    TooNested { line: usize, text: String },

    /// No enclosing section exists at the requested depth
    #[error("Cannot compute nesting level at line {line}.")]
    NestingLevel { line: usize, text: String },

    /// Opening and closing bracket counts differ
    #[error("Cannot compute the section depth at line {line}.")]
    SectionDepth { line: usize, text: String },

    /// Bare name that is not a known literal in unrepr mode
    #[error("Unknown name or type in value at line {line}.")]
    UnreprUnknownName { line: usize, text: String },

    /// Malformed literal in unrepr mode
    #[error("Parse error in value at line {line}.")]
    UnreprSyntax { line: usize, text: String },
}

impl ParseError {
    /// Returns the category this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::InvalidLine { .. } | ParseError::BadValue { .. } => ErrorKind::Parse,
            ParseError::DuplicateKey { .. } | ParseError::DuplicateSection { .. } => {
                ErrorKind::Duplicate
            }
            ParseError::TooNested { .. }
            | ParseError::NestingLevel { .. }
            | ParseError::SectionDepth { .. } => ErrorKind::Nesting,
            ParseError::UnreprUnknownName { .. } | ParseError::UnreprSyntax { .. } => {
                ErrorKind::Unrepr
            }
        }
    }

    /// Returns the 1-based line number of the offending line
    pub fn line(&self) -> usize {
        match self {
            ParseError::InvalidLine { line, .. }
            | ParseError::BadValue { line, .. }
            | ParseError::DuplicateKey { line, .. }
            | ParseError::DuplicateSection { line, .. }
            | ParseError::TooNested { line, .. }
            | ParseError::NestingLevel { line, .. }
            | ParseError::SectionDepth { line, .. }
            | ParseError::UnreprUnknownName { line, .. }
            | ParseError::UnreprSyntax { line, .. } => *line,
        }
    }

    /// Returns the text of the offending line
    pub fn text(&self) -> &str {
        match self {
            ParseError::InvalidLine { text, .. }
            | ParseError::BadValue { text, .. }
            | ParseError::DuplicateKey { text, .. }
            | ParseError::DuplicateSection { text, .. }
            | ParseError::TooNested { text, .. }
            | ParseError::NestingLevel { text, .. }
            | ParseError::SectionDepth { text, .. }
            | ParseError::UnreprUnknownName { text, .. }
            | ParseError::UnreprSyntax { text, .. } => text,
        }
    }

    /// Formats the error followed by the offending line, gutter style
    pub fn format_with_context(&self) -> String {
        let gutter = self.line().to_string();
        let mut output = format!("{}: {}\n", self.kind(), self);
        output.push_str(&format!("{} | {}\n", gutter, self.text()));
        output.push_str(&format!(
            "{} | {}  <-- Error here\n",
            " ".repeat(gutter.len()),
            "^".repeat(self.text().trim_end().len().max(1))
        ));
        output
    }
}

/// Every structural error found while parsing one document
///
/// The partially built tree is kept so callers can inspect what did parse.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseErrors {
    message: String,
    errors: Vec<ParseError>,
    config: Box<ConfigObj>,
}

impl ParseErrors {
    /// Builds the aggregate from a non-empty error list
    pub(crate) fn new(errors: Vec<ParseError>, config: ConfigObj) -> Self {
        let message = match errors.as_slice() {
            [single] => single.to_string(),
            [first, ..] => format!(
                "Parsing failed with several errors.\nFirst error at line {}.",
                first.line()
            ),
            [] => "Parsing failed.".to_string(),
        };
        Self {
            message,
            errors,
            config: Box::new(config),
        }
    }

    /// The individual errors, in document order
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Line number of the first failure
    pub fn first_line(&self) -> Option<usize> {
        self.errors.first().map(ParseError::line)
    }

    /// The tree as far as it could be built
    pub fn config(&self) -> &ConfigObj {
        &self.config
    }

    /// Consumes the error and returns the partially built tree
    pub fn into_config(self) -> ConfigObj {
        *self.config
    }
}

/// Interpolation failures, raised lazily when a value is read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    /// A reference leads back to itself, or the recursion bound was hit
    #[error("interpolation loop detected in value \"{0}\".")]
    Loop(String),

    /// A reference names a key absent from every scope
    #[error("missing option \"{0}\" in interpolation.")]
    MissingOption(String),
}

impl InterpolationError {
    /// Returns the key that triggered the failure
    pub fn key(&self) -> &str {
        match self {
            InterpolationError::Loop(key) | InterpolationError::MissingOption(key) => key,
        }
    }
}

/// Failures reported by a value check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Value absent and the check supplies no default
    #[error("missing value")]
    Missing,

    #[error("the value \"{0}\" is of the wrong type.")]
    WrongType(String),

    #[error("the value \"{0}\" is too small.")]
    TooSmall(String),

    #[error("the value \"{0}\" is too big.")]
    TooBig(String),

    #[error("the value \"{0}\" is too short.")]
    TooShort(String),

    #[error("the value \"{0}\" is too long.")]
    TooLong(String),

    #[error("the value \"{0}\" is unacceptable.")]
    Unacceptable(String),

    #[error("the check \"{0}\" is unknown.")]
    UnknownCheck(String),

    /// A check parameter could not be converted
    #[error("passed an incorrect value \"{value}\" for parameter \"{param}\".")]
    Param { param: String, value: String },

    #[error("Bad syntax in check \"{0}\".")]
    BadSyntax(String),

    /// Free-form failure, used for shape mismatches between spec and data
    #[error("{0}")]
    Custom(String),
}

impl ValidationError {
    /// Returns true for the missing-value failure
    pub fn is_missing(&self) -> bool {
        matches!(self, ValidationError::Missing)
    }
}

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum ConfigObjError {
    /// First structural error, raised immediately in `raise_errors` mode
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Every structural error of one document
    #[error(transparent)]
    Aggregate(#[from] ParseErrors),

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    /// The specification document could not be parsed
    #[error("Parsing configspec failed: {0}")]
    Configspec(#[source] Box<ConfigObjError>),

    /// A specification section declares more than one wildcard subsection
    #[error("Conflicting repeated sections in configspec section \"{section}\".")]
    RepeatSection { section: String },

    #[error("No configspec supplied.")]
    MissingConfigspec,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The writer found no quoting that round-trips the value
    #[error("Value \"{0}\" cannot be safely quoted.")]
    Unquotable(String),

    #[error("Key \"{0}\" not found.")]
    KeyNotFound(String),

    /// A typed accessor could not convert the stored value
    #[error("Value \"{value}\" of key \"{key}\" is not a valid {expected}.")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Config file not found: \"{}\".", .0.display())]
    FileNotFound(PathBuf),

    #[error("Reload failed, filename is not set.")]
    Reload,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigObjError {
    /// The structural errors carried by this error, in document order
    pub fn errors(&self) -> &[ParseError] {
        match self {
            ConfigObjError::Parse(error) => std::slice::from_ref(error),
            ConfigObjError::Aggregate(aggregate) => aggregate.errors(),
            ConfigObjError::Configspec(inner) => inner.errors(),
            _ => &[],
        }
    }

    /// Category of the first structural error, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        self.errors().first().map(ParseError::kind)
    }
}
