//! Serializes a configuration back to text
//!
//! Output follows the tree's insertion order (scalars before subsections),
//! reproduces comments, and quotes values only where the reader would
//! otherwise misread them.

use crate::config::ConfigObj;
use crate::error::ConfigObjError;
use crate::section::{Entry, Section};
use crate::value::Value;

/// Indentation unit used when the document has none
pub const DEFAULT_INDENT: &str = "    ";

/// Characters that force quoting when they start or end a value
const EDGE_CHARS: &[char] = &[' ', '\r', '\n', '\u{b}', '\t', '\'', '"'];

impl ConfigObj {
    /// Renders the document as lines, without terminators
    pub fn write(&self) -> Result<Vec<String>, ConfigObjError> {
        let writer = Writer {
            config: self,
            indent: self.indent_type.as_deref().unwrap_or(DEFAULT_INDENT),
        };
        let mut out = Vec::new();
        push_document_comments(&mut out, &self.initial_comment);
        writer.write_section(self.root(), &mut out)?;
        push_document_comments(&mut out, &self.final_comment);
        Ok(out)
    }

    /// Renders the document as text using its newline style
    pub fn write_string(&self) -> Result<String, ConfigObjError> {
        let lines = self.write()?;
        if lines.is_empty() {
            return Ok(String::new());
        }
        let newline = self.newlines.unwrap_or_default().as_str();
        let mut text = lines.join(newline);
        text.push_str(newline);
        Ok(text)
    }
}

fn push_document_comments(out: &mut Vec<String>, comments: &[String]) {
    for line in comments {
        let stripped = line.trim();
        if !stripped.is_empty() && !stripped.starts_with('#') {
            out.push(format!("# {}", line));
        } else {
            out.push(line.clone());
        }
    }
}

fn format_comment(comment: &str) -> String {
    let line = comment.trim_start();
    if line.is_empty() || line.starts_with('#') {
        line.to_string()
    } else {
        format!("# {}", line)
    }
}

fn format_inline(comment: Option<&String>) -> String {
    match comment.map(|c| c.trim()) {
        None | Some("") => String::new(),
        Some(c) if c.starts_with('#') => format!(" {}", c),
        Some(c) => format!(" # {}", c),
    }
}

struct Writer<'c> {
    config: &'c ConfigObj,
    indent: &'c str,
}

impl Writer<'_> {
    fn write_section(
        &self,
        section: &Section,
        out: &mut Vec<String>,
    ) -> Result<(), ConfigObjError> {
        let indent = self.indent.repeat(section.depth());

        for (key, entry) in section.iter() {
            if section.defaults.iter().any(|k| k == key) {
                continue;
            }
            for comment in section.comments.get(key).into_iter().flatten() {
                let line = format_comment(comment);
                if line.is_empty() {
                    out.push(line);
                } else {
                    out.push(format!("{}{}", indent, line));
                }
            }
            let inline = format_inline(section.inline_comments.get(key));

            match entry {
                Entry::Value(value) => {
                    let key = self.quote_name(key)?;
                    if self.config.options.write_empty_values && is_empty_string(value) {
                        out.push(format!("{}{} ={}", indent, key, inline));
                    } else {
                        let text = self.format_value(value)?;
                        out.push(format!("{}{} = {}{}", indent, key, text, inline));
                    }
                }
                Entry::Section(child) => {
                    let depth = child.depth();
                    out.push(format!(
                        "{}{}{}{}{}",
                        indent,
                        "[".repeat(depth),
                        self.quote_name(key)?,
                        "]".repeat(depth),
                        inline
                    ));
                    self.write_section(child, out)?;
                }
            }
        }
        Ok(())
    }

    fn format_value(&self, value: &Value) -> Result<String, ConfigObjError> {
        if self.config.options.unrepr {
            return Ok(value.repr());
        }
        match value {
            Value::List(items) => match items.as_slice() {
                [] => Ok(",".to_string()),
                [single] => Ok(format!("{},", self.quote_text(&single.to_string(), false)?)),
                many => {
                    let quoted = many
                        .iter()
                        .map(|item| self.quote_text(&item.to_string(), false))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(quoted.join(", "))
                }
            },
            other => self.quote_text(&other.to_string(), true),
        }
    }

    /// Quotes a key or section name
    fn quote_name(&self, name: &str) -> Result<String, ConfigObjError> {
        if name.contains('\n') {
            return Err(ConfigObjError::Unquotable(name.to_string()));
        }
        let needs_quotes = name.is_empty()
            || name.starts_with(EDGE_CHARS)
            || name.ends_with(EDGE_CHARS)
            || name.starts_with('[')
            || name.contains(['=', '#', ',', ']']);
        if needs_quotes {
            single_quotes(name)
        } else {
            Ok(name.to_string())
        }
    }

    /// Quotes a value so it reads back unchanged
    ///
    /// `multiline` allows triple quotes; list items never use them.
    fn quote_text(&self, text: &str, multiline: bool) -> Result<String, ConfigObjError> {
        if text.is_empty() {
            return Ok("\"\"".to_string());
        }
        let list_values = self.config.options.list_values;
        let has_newline = text.contains('\n');
        let needs_triple =
            multiline && (has_newline || (text.contains('\'') && text.contains('"')));

        if needs_triple {
            return triple_quotes(text);
        }
        if !list_values {
            if has_newline {
                return Err(ConfigObjError::Unquotable(text.to_string()));
            }
            return Ok(text.to_string());
        }
        if has_newline {
            return Err(ConfigObjError::Unquotable(text.to_string()));
        }
        let plain = !text.starts_with(EDGE_CHARS)
            && !text.ends_with(EDGE_CHARS)
            && !text.contains(',')
            && !text.contains('#');
        if plain {
            Ok(text.to_string())
        } else {
            single_quotes(text)
        }
    }
}

fn is_empty_string(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.is_empty())
}

fn single_quotes(text: &str) -> Result<String, ConfigObjError> {
    match (text.contains('"'), text.contains('\'')) {
        (true, true) => Err(ConfigObjError::Unquotable(text.to_string())),
        (true, false) => Ok(format!("'{}'", text)),
        _ => Ok(format!("\"{}\"", text)),
    }
}

fn triple_quotes(text: &str) -> Result<String, ConfigObjError> {
    // a closing delimiter glued to the same quote character would close early
    if !text.contains("\"\"\"") && !text.ends_with('"') {
        Ok(format!("\"\"\"{}\"\"\"", text))
    } else if !text.contains("'''") && !text.ends_with('\'') {
        Ok(format!("'''{}'''", text))
    } else {
        Err(ConfigObjError::Unquotable(text.to_string()))
    }
}
