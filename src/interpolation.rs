//! String interpolation of values on read
//!
//! Two reference syntaxes are supported: ConfigParser style `%(name)s` and
//! Template style `$name` / `${name}` with `$$` as a literal dollar. A
//! reference is looked up in the section holding the value, then in that
//! section's `DEFAULT` subsection, then the same way in each enclosing
//! section up to the root. Substituted text is interpolated recursively,
//! with cycle detection and a bounded depth.

use crate::error::InterpolationError;
use crate::section::Section;
use crate::value::Value;
use tracing::trace;

/// Maximum nesting of references before a loop is reported
pub const MAX_INTERPOLATION_DEPTH: usize = 10;

/// Interpolation syntax applied when values are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Values are returned verbatim
    Off,
    /// `%(name)s`
    #[default]
    ConfigParser,
    /// `$name`, `${name}` and `$$`
    Template,
}

impl Interpolation {
    /// The engine implementing this syntax, if interpolation is on
    pub fn engine(self) -> Option<&'static dyn InterpolationEngine> {
        match self {
            Interpolation::Off => None,
            Interpolation::ConfigParser => Some(&ConfigParserEngine as &dyn InterpolationEngine),
            Interpolation::Template => Some(&TemplateEngine as &dyn InterpolationEngine),
        }
    }
}

/// What a reference expands to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Look up a key and interpolate its value
    Key(String),
    /// Insert text as is, without further scanning
    Literal(String),
}

/// A reference found in a value: the byte range it covers and its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub start: usize,
    pub end: usize,
    pub target: Target,
}

/// A reference syntax
pub trait InterpolationEngine: Sync {
    /// Character that must be present for a value to contain references
    fn cookie(&self) -> char;

    /// Finds the first reference starting at or after byte offset `from`
    fn find_reference(&self, text: &str, from: usize) -> Option<Reference>;
}

/// `%(name)s` references
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigParserEngine;

impl InterpolationEngine for ConfigParserEngine {
    fn cookie(&self) -> char {
        '%'
    }

    fn find_reference(&self, text: &str, from: usize) -> Option<Reference> {
        let mut search = from;
        while let Some(offset) = text.get(search..)?.find("%(") {
            let start = search + offset;
            let name_start = start + 2;
            if let Some(close) = text[name_start..].find(')') {
                let name_end = name_start + close;
                if text[name_end + 1..].starts_with('s') {
                    return Some(Reference {
                        start,
                        end: name_end + 2,
                        target: Target::Key(text[name_start..name_end].to_string()),
                    });
                }
            }
            search = start + 1;
        }
        None
    }
}

/// `$name`, `${name}` and `$$` references
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    fn name_length(text: &str) -> usize {
        let mut chars = text.char_indices();
        match chars.next() {
            Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return 0,
        }
        chars
            .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '_'))
            .map_or(text.len(), |(i, _)| i)
    }
}

impl InterpolationEngine for TemplateEngine {
    fn cookie(&self) -> char {
        '$'
    }

    fn find_reference(&self, text: &str, from: usize) -> Option<Reference> {
        let mut search = from;
        while let Some(offset) = text.get(search..)?.find('$') {
            let start = search + offset;
            let after = &text[start + 1..];

            if after.starts_with('$') {
                return Some(Reference {
                    start,
                    end: start + 2,
                    target: Target::Literal("$".to_string()),
                });
            }
            if let Some(braced) = after.strip_prefix('{') {
                if let Some(close) = braced.find('}') {
                    return Some(Reference {
                        start,
                        end: start + 2 + close + 1,
                        target: Target::Key(braced[..close].to_string()),
                    });
                }
            }
            let length = Self::name_length(after);
            if length > 0 {
                return Some(Reference {
                    start,
                    end: start + 1 + length,
                    target: Target::Key(after[..length].to_string()),
                });
            }
            // a bare `$` stays as is
            search = start + 1;
        }
        None
    }
}

/// Interpolates a value read from `chain.last()`
///
/// `chain` runs from the root to the section holding `key`. Lists are
/// interpolated element by element; non-string values pass through.
pub fn interpolate_value(
    chain: &[&Section],
    key: &str,
    value: &Value,
    mode: Interpolation,
    default_section: &str,
) -> Result<Value, InterpolationError> {
    let Some(engine) = mode.engine() else {
        return Ok(value.clone());
    };
    let mut resolver = Resolver {
        chain,
        engine,
        default_section,
        backtrail: Vec::new(),
    };
    let scope = chain.len().saturating_sub(1);
    match value {
        Value::String(text) => resolver.interpolate(key, text, scope).map(Value::String),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => resolver.interpolate(key, text, scope).map(Value::String),
                other => Ok(other.clone()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::list),
        other => Ok(other.clone()),
    }
}

struct Resolver<'c, 'a> {
    chain: &'c [&'a Section],
    engine: &'static dyn InterpolationEngine,
    default_section: &'c str,
    /// (key, scope) pairs currently being expanded
    backtrail: Vec<(String, usize)>,
}

impl Resolver<'_, '_> {
    fn interpolate(
        &mut self,
        key: &str,
        text: &str,
        scope: usize,
    ) -> Result<String, InterpolationError> {
        if !text.contains(self.engine.cookie()) {
            return Ok(text.to_string());
        }
        self.expand(key, text.to_string(), scope)
    }

    fn expand(
        &mut self,
        key: &str,
        mut text: String,
        scope: usize,
    ) -> Result<String, InterpolationError> {
        let seen = self.backtrail.iter().any(|(k, s)| k == key && *s == scope);
        if seen || self.backtrail.len() >= MAX_INTERPOLATION_DEPTH {
            return Err(InterpolationError::Loop(key.to_string()));
        }
        self.backtrail.push((key.to_string(), scope));

        let mut from = 0;
        while let Some(reference) = self.engine.find_reference(&text, from) {
            let replacement = match reference.target {
                Target::Literal(literal) => literal,
                Target::Key(name) => {
                    let (raw, found_in) = self.fetch(&name)?;
                    let expanded = self.expand(&name, raw, found_in)?;
                    trace!(key, reference = %name, value = %expanded, "substituted reference");
                    expanded
                }
            };
            text.replace_range(reference.start..reference.end, &replacement);
            from = reference.start + replacement.len();
        }

        self.backtrail.pop();
        Ok(text)
    }

    /// Looks `name` up from the section being read outwards, returning the
    /// raw text and the chain index of the section it came from
    ///
    /// Nested references resolve from the same starting section; the index
    /// only identifies the value for loop detection.
    fn fetch(&self, name: &str) -> Result<(String, usize), InterpolationError> {
        for index in (0..self.chain.len()).rev() {
            let section = self.chain[index];
            let found = section.value(name).or_else(|| {
                section
                    .section(self.default_section)
                    .and_then(|defaults| defaults.value(name))
            });
            if let Some(value) = found {
                return Ok((value.to_string(), index));
            }
        }
        Err(InterpolationError::MissingOption(name.to_string()))
    }
}
