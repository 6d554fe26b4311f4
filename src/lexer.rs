//! Line and value tokenizer
//!
//! This module classifies one physical line as a comment, a section marker or
//! a `key = value` pair, and splits raw value text into scalars, lists and
//! trailing inline comments. It also reads triple-quoted multiline values and
//! the literal syntax used in unrepr mode.

use crate::value::Value;
use std::iter::Peekable;
use std::str::CharIndices;

/// Opening delimiters of multiline values
pub const TRIPLE_QUOTES: [&str; 2] = ["'''", "\"\"\""];

/// Failure while scanning a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueError {
    /// Quoting or list syntax is malformed
    Syntax,
    /// An unrepr literal names something that is not a known constant
    UnknownName,
}

/// A `[name]` style marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMarker<'a> {
    pub indent: &'a str,
    /// Number of opening brackets
    pub open: usize,
    /// Number of closing brackets
    pub close: usize,
    /// Section name, trimmed and unquoted
    pub name: String,
    /// Trailing `#` comment, or empty
    pub comment: &'a str,
}

/// A `key = value` line, before the value is scanned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue<'a> {
    pub indent: &'a str,
    /// Key, unquoted
    pub key: String,
    /// Everything after the `=` with leading whitespace removed
    pub value: &'a str,
}

/// Classification of one physical line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// Blank line or full-line comment
    Comment,
    Section(SectionMarker<'a>),
    KeyValue(KeyValue<'a>),
    /// Neither of the above
    Invalid,
}

/// Classifies a single line
pub fn classify_line(line: &str) -> Line<'_> {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return Line::Comment;
    }
    if let Some(marker) = scan_section_marker(line) {
        return Line::Section(marker);
    }
    if let Some(pair) = scan_key_value(line) {
        return Line::KeyValue(pair);
    }
    Line::Invalid
}

fn split_indent(line: &str) -> (&str, &str) {
    let body = line.trim_start();
    (&line[..line.len() - body.len()], body)
}

fn is_quote(ch: char) -> bool {
    ch == '"' || ch == '\''
}

/// Removes one pair of matching surrounding quotes
pub fn unquote(text: &str) -> &str {
    let mut chars = text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if first == last && is_quote(first) => {
            &text[1..text.len() - 1]
        }
        _ => text,
    }
}

fn scan_section_marker(line: &str) -> Option<SectionMarker<'_>> {
    let (indent, body) = split_indent(line);
    let mut open = 0;
    let mut rest = body;
    while let Some(after) = rest.strip_prefix('[') {
        open += 1;
        rest = after.trim_start();
    }
    if open == 0 || rest.is_empty() {
        return None;
    }

    // the shortest name that leaves a valid closing tail wins
    let ends = rest
        .char_indices()
        .map(|(i, _)| i)
        .skip(1)
        .chain(std::iter::once(rest.len()));
    for end in ends {
        let name = &rest[..end];
        if !is_section_name(name) {
            continue;
        }
        if let Some((close, comment)) = scan_closing(&rest[end..]) {
            return Some(SectionMarker {
                indent,
                open,
                close,
                name: unquote(name.trim()).to_string(),
                comment,
            });
        }
    }
    None
}

fn is_section_name(name: &str) -> bool {
    let Some(first) = name.chars().next() else {
        return false;
    };
    if is_quote(first) {
        name.len() >= 2
            && name.ends_with(first)
            && name[1..name.len() - 1].chars().any(|c| !c.is_whitespace())
    } else {
        !first.is_whitespace()
    }
}

fn scan_closing(tail: &str) -> Option<(usize, &str)> {
    let mut close = 0;
    let mut rest = tail;
    while let Some(after) = rest.trim_start().strip_prefix(']') {
        close += 1;
        rest = after;
    }
    if close == 0 {
        return None;
    }
    let rest = rest.trim_start();
    if rest.is_empty() || rest.starts_with('#') {
        Some((close, rest))
    } else {
        None
    }
}

fn scan_key_value(line: &str) -> Option<KeyValue<'_>> {
    let (indent, body) = split_indent(line);
    let first = body.chars().next()?;

    if is_quote(first) {
        // lazily match up to the first closing quote followed by `=`
        for (pos, ch) in body.char_indices().skip(1) {
            if ch != first {
                continue;
            }
            let after = body[pos + 1..].trim_start();
            if let Some(value) = after.strip_prefix('=') {
                return Some(KeyValue {
                    indent,
                    key: unquote(&body[..=pos]).to_string(),
                    value: value.trim_start(),
                });
            }
        }
        return None;
    }

    if first == '=' {
        return None;
    }
    let eq = body.find('=')?;
    Some(KeyValue {
        indent,
        key: body[..eq].trim_end().to_string(),
        value: body[eq + 1..].trim_start(),
    })
}

fn comment_tail(rest: &str) -> Option<&str> {
    let rest = rest.trim_start();
    if rest.is_empty() || rest.starts_with('#') {
        Some(rest)
    } else {
        None
    }
}

/// Splits one list item off the front of `rest`, returning the raw item
/// (still quoted) and what follows it
fn take_item(rest: &str) -> Result<(&str, &str), ValueError> {
    match rest.chars().next() {
        Some(q) if is_quote(q) => {
            let close = rest[1..].find(q).ok_or(ValueError::Syntax)? + 1;
            Ok((&rest[..=close], &rest[close + 1..]))
        }
        _ => {
            let end = rest.find([',', '#']).unwrap_or(rest.len());
            Ok((rest[..end].trim_end(), &rest[end..]))
        }
    }
}

/// Scans a value with list syntax enabled
///
/// Returns the scalar or list value and the trailing comment. A value made
/// only of a comma is the empty list, and a trailing comma turns a single
/// item into a one-element list.
pub fn scan_list_value(value: &str) -> Result<(Value, &str), ValueError> {
    if let Some(rest) = value.strip_prefix(',') {
        return comment_tail(rest)
            .map(|comment| (Value::empty_list(), comment))
            .ok_or(ValueError::Syntax);
    }

    let mut items: Vec<Value> = Vec::new();
    let mut rest = value;
    let (last, remainder) = loop {
        let (item, after) = take_item(rest)?;
        let after = after.trim_start();
        match after.strip_prefix(',') {
            Some(next) => {
                if item.is_empty() {
                    return Err(ValueError::Syntax);
                }
                items.push(Value::from(unquote(item)));
                rest = next.trim_start();
                if rest.is_empty() || rest.starts_with('#') {
                    break (None, rest);
                }
            }
            None => break (Some(item), after),
        }
    };

    let comment = comment_tail(remainder).ok_or(ValueError::Syntax)?;
    if items.is_empty() {
        return Ok((Value::from(unquote(last.unwrap_or(""))), comment));
    }
    if let Some(last) = last.filter(|item| !item.is_empty()) {
        items.push(Value::from(unquote(last)));
    }
    Ok((Value::list(items), comment))
}

/// Scans a value with list syntax disabled
///
/// Quotes are kept verbatim; only the trailing comment is split off.
pub fn scan_plain_value(value: &str) -> Result<(Value, &str), ValueError> {
    match value.chars().next() {
        Some(q) if is_quote(q) => {
            for (pos, ch) in value.char_indices().skip(1) {
                if ch != q {
                    continue;
                }
                if let Some(comment) = comment_tail(&value[pos + 1..]) {
                    return Ok((Value::from(&value[..=pos]), comment));
                }
            }
            Err(ValueError::Syntax)
        }
        Some('#') | None => Ok((Value::from(""), value)),
        Some(_) => {
            let end = value.find('#').unwrap_or(value.len());
            Ok((Value::from(value[..end].trim_end()), &value[end..]))
        }
    }
}

/// A triple-quoted value, possibly spanning several lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiline {
    /// Text between the delimiters, lines joined with `\n`
    pub value: String,
    pub comment: String,
    /// Index of the line holding the closing delimiter
    pub last_line: usize,
}

/// Returns the triple quote a value opens with, if any
pub fn triple_quote(value: &str) -> Option<&'static str> {
    TRIPLE_QUOTES
        .into_iter()
        .find(|quote| value.starts_with(quote))
}

fn close_triple<'a>(text: &'a str, quote: &str) -> Option<(&'a str, &'a str)> {
    text.match_indices(quote).find_map(|(pos, _)| {
        comment_tail(&text[pos + quote.len()..]).map(|comment| (&text[..pos], comment))
    })
}

/// Reads a multiline value whose first line is `lines[index]`
///
/// `value` is the text after `=` on that line. Returns `None` when the value
/// is malformed or the closing delimiter never appears.
pub fn scan_multiline<S: AsRef<str>>(value: &str, lines: &[S], index: usize) -> Option<Multiline> {
    let quote = triple_quote(value)?;
    let first = &value[quote.len()..];

    if first.contains(quote) {
        let (content, comment) = close_triple(first, quote)?;
        return Some(Multiline {
            value: content.to_string(),
            comment: comment.to_string(),
            last_line: index,
        });
    }

    let mut content = first.to_string();
    for (offset, line) in lines.iter().enumerate().skip(index + 1) {
        let line = line.as_ref();
        content.push('\n');
        if !line.contains(quote) {
            content.push_str(line);
            continue;
        }
        let (tail, comment) = close_triple(line, quote)?;
        content.push_str(tail);
        return Some(Multiline {
            value: content,
            comment: comment.to_string(),
            last_line: offset,
        });
    }
    None
}

/// Reads an unrepr-mode value: a single literal with an optional comment
///
/// Empty text reads as the empty string.
pub fn parse_literal(text: &str) -> Result<Value, ValueError> {
    let mut reader = LiteralReader::new(text);
    reader.skip_whitespace();
    if reader.at_end_or_comment() {
        return Ok(Value::from(""));
    }
    let value = reader.read_value()?;
    reader.skip_whitespace();
    if reader.at_end_or_comment() {
        Ok(value)
    } else {
        Err(ValueError::Syntax)
    }
}

struct LiteralReader<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> LiteralReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.source.len(), |&(i, _)| i)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
        }
    }

    fn at_end_or_comment(&mut self) -> bool {
        matches!(self.peek(), None | Some('#'))
    }

    fn read_value(&mut self) -> Result<Value, ValueError> {
        match self.peek().ok_or(ValueError::Syntax)? {
            '"' | '\'' => self.read_string().map(Value::String),
            '[' => self.read_sequence(']').map(|(items, _)| Value::list(items)),
            '(' => {
                let (mut items, trailing_comma) = self.read_sequence(')')?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::list(items))
                }
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.read_number(),
            c if c.is_alphabetic() || c == '_' => self.read_name(),
            _ => Err(ValueError::Syntax),
        }
    }

    fn read_sequence(&mut self, close: char) -> Result<(Vec<Value>, bool), ValueError> {
        self.chars.next();
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.chars.next();
                return Ok((items, trailing_comma));
            }
            items.push(self.read_value()?);
            self.skip_whitespace();
            match self.chars.next().map(|(_, c)| c) {
                Some(',') => trailing_comma = true,
                Some(c) if c == close => return Ok((items, false)),
                _ => return Err(ValueError::Syntax),
            }
        }
    }

    fn read_string(&mut self) -> Result<String, ValueError> {
        let (_, quote) = self.chars.next().ok_or(ValueError::Syntax)?;
        let mut out = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                c if c == quote => return Ok(out),
                '\\' => {
                    let (_, escaped) = self.chars.next().ok_or(ValueError::Syntax)?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(escaped),
                        'x' => out.push(self.read_code_point(2)?),
                        'u' => out.push(self.read_code_point(4)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }
        Err(ValueError::Syntax)
    }

    fn read_code_point(&mut self, digits: usize) -> Result<char, ValueError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let (_, c) = self.chars.next().ok_or(ValueError::Syntax)?;
            code = code * 16 + c.to_digit(16).ok_or(ValueError::Syntax)?;
        }
        char::from_u32(code).ok_or(ValueError::Syntax)
    }

    fn read_number(&mut self) -> Result<Value, ValueError> {
        let start = self.offset();
        let mut previous = None;
        while let Some(c) = self.peek() {
            let sign_allowed = matches!(previous, None | Some('e' | 'E'));
            let accepted = c.is_ascii_alphanumeric()
                || c == '.'
                || c == '_'
                || (sign_allowed && (c == '-' || c == '+'));
            if accepted {
                previous = Some(c);
                self.chars.next();
            } else {
                break;
            }
        }
        let text = self.source[start..self.offset()].replace('_', "");
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(&text)),
        };
        if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            let magnitude = i64::from_str_radix(hex, 16).map_err(|_| ValueError::Syntax)?;
            return Ok(Value::Integer(if negative { -magnitude } else { magnitude }));
        }
        if let Ok(int) = text.parse::<i64>() {
            return Ok(Value::Integer(int));
        }
        let is_float = digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
        if is_float {
            if let Ok(float) = text.parse::<f64>() {
                return Ok(Value::Float(float));
            }
        }
        Err(ValueError::Syntax)
    }

    fn read_name(&mut self) -> Result<Value, ValueError> {
        let start = self.offset();
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.chars.next();
        }
        match &self.source[start..self.offset()] {
            "True" => Ok(Value::Boolean(true)),
            "False" => Ok(Value::Boolean(false)),
            "None" => Ok(Value::None),
            _ => Err(ValueError::UnknownName),
        }
    }
}
