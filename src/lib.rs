//! # nestini
//!
//! Reads, edits, validates and writes nested INI configuration files.
//!
//! ## Overview
//!
//! Documents are made of `key = value` lines grouped into sections. Section
//! nesting is expressed by the number of brackets (`[a]`, `[[b]]`,
//! `[[[c]]]`), not by indentation. The parser is tolerant: it collects every
//! structural error and still hands back the partially built document.
//!
//! ## Key Features
//!
//! - **Ordered, comment-preserving tree**: comments above a key and inline
//!   comments survive a read/write cycle
//! - **List values**: `a, b, c` reads as a list, `a,` as a one-element list
//! - **Multiline values** with triple quotes
//! - **Interpolation**: `%(name)s` or `$name` / `${name}` references resolved
//!   through enclosing sections and their `DEFAULT` sections
//! - **Schema validation** with defaults, `__many__` wildcards and a library
//!   of built-in checks
//! - **unrepr mode**: values are literals (`[1, 'two', None]`)
//!
//! ## Basic Usage
//!
//! ```rust
//! use nestini::{ConfigObj, Options};
//!
//! let text = "\
//! ## server settings
//! name = demo
//! ports = 80, 443
//!
//! [paths]
//! home = /srv
//! data = %(home)s/data
//! ";
//!
//! let config = ConfigObj::parse(text, Options::default())?;
//! assert_eq!(config.root().as_list("ports")?.len(), 2);
//!
//! let paths = config.section("paths").unwrap();
//! assert_eq!(paths.value("data")?.to_string(), "/srv/data");
//!
//! assert_eq!(config.write_string()?, text);
//! # Ok::<(), nestini::ConfigObjError>(())
//! ```
//!
//! ## Validation
//!
//! ```rust
//! use nestini::{ConfigObj, Options, Outcome, ValidateOptions, Validator, Value};
//!
//! let mut config = ConfigObj::parse("port = 8080\n", Options::default())?
//!     .with_configspec(["port = integer(1, 65535)", "debug = boolean(default=no)"])?;
//!
//! let outcome = config.validate(&Validator::new(), ValidateOptions::default())?;
//! assert!(matches!(outcome, Outcome::Valid));
//! assert_eq!(config.root().value("port"), Some(&Value::Integer(8080)));
//! assert_eq!(config.root().value("debug"), Some(&Value::Boolean(false)));
//! # Ok::<(), nestini::ConfigObjError>(())
//! ```
//!
//! ## Error Handling
//!
//! Structural problems are reported together:
//!
//! ```rust
//! use nestini::{ConfigObj, ConfigObjError, Options};
//!
//! let result = ConfigObj::parse("a = 1\na = 2\nnot a key\n", Options::default());
//! match result {
//!     Err(ConfigObjError::Aggregate(errors)) => {
//!         assert_eq!(errors.errors().len(), 2);
//!         assert_eq!(errors.config().root().value("a").unwrap().to_string(), "1");
//!     }
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

pub mod checks;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod lexer;
pub mod parser;
pub mod section;
pub mod validation;
pub mod value;
pub mod writer;

// Re-export main types and functions
pub use config::{ConfigObj, DEFAULT_SECTION, Newline, Options, SectionRef};
pub use error::{
    ConfigObjError, ErrorKind, InterpolationError, ParseError, ParseErrors, ValidationError,
};
pub use section::{Entry, Section, Walked};
pub use value::Value;

// Re-export interpolation types
pub use interpolation::{ConfigParserEngine, Interpolation, InterpolationEngine, TemplateEngine};

// Re-export validation types
pub use checks::{CheckArg, CheckFunction, CheckKind, CheckSpec, Validator};
pub use validation::{Checker, FlatError, Outcome, ValidateOptions, flatten_errors};

/// Parses a document with default options
pub fn from_str(text: &str) -> Result<ConfigObj, ConfigObjError> {
    ConfigObj::parse(text, Options::default())
}

/// Parses a document with the given options
pub fn from_str_with_options(text: &str, options: Options) -> Result<ConfigObj, ConfigObjError> {
    ConfigObj::parse(text, options)
}
