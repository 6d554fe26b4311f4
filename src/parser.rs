//! Document parser
//!
//! Turns a sequence of lines into a section tree. Sections are built on a
//! stack of owned frames and attached to their parent when a marker at the
//! same or a shallower depth closes them. Structural errors are collected
//! and parsing continues, unless `raise_errors` asks for the first error to
//! be returned immediately.

use crate::config::Options;
use crate::error::ParseError;
use crate::lexer::{
    self, classify_line, scan_list_value, scan_multiline, scan_plain_value, KeyValue, Line,
    SectionMarker, ValueError,
};
use crate::section::Section;
use crate::value::Value;
use std::mem;
use tracing::debug;

/// Everything recovered from one document
#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub root: Section,
    pub initial_comment: Vec<String>,
    pub final_comment: Vec<String>,
    /// First non-empty indentation seen on a section or key line
    pub indent_type: Option<String>,
    /// Structural errors, in document order
    pub errors: Vec<ParseError>,
}

struct Frame {
    name: String,
    section: Section,
    /// Original position of a reopened section
    reinsert_at: Option<usize>,
}

/// Line-driven parser over a borrowed set of options
pub struct DocumentParser<'o> {
    options: &'o Options,
    errors: Vec<ParseError>,
    indent_type: Option<String>,
}

impl<'o> DocumentParser<'o> {
    pub fn new(options: &'o Options) -> Self {
        Self {
            options,
            errors: Vec::new(),
            indent_type: None,
        }
    }

    /// Parses every line, returning the tree and the collected errors
    ///
    /// Fails only in `raise_errors` mode, with the first error found.
    pub fn parse<S: AsRef<str>>(mut self, lines: &[S]) -> Result<ParsedDocument, ParseError> {
        let mut stack = vec![Frame {
            name: String::new(),
            section: Section::new(),
            reinsert_at: None,
        }];
        let mut initial_comment = Vec::new();
        let mut comment_list: Vec<String> = Vec::new();
        let mut done_start = false;
        let mut trailing_comments = false;

        let mut index = 0;
        while index < lines.len() {
            let line = lines[index].as_ref();
            let classified = classify_line(line);

            if classified == Line::Comment {
                trailing_comments = true;
                comment_list.push(line.to_string());
                index += 1;
                continue;
            }

            if !done_start {
                initial_comment = mem::take(&mut comment_list);
                done_start = true;
            }
            trailing_comments = false;
            let comments = mem::take(&mut comment_list);

            match classified {
                Line::Section(marker) => {
                    self.open_section(&mut stack, marker, comments, line, index)?
                }
                Line::KeyValue(pair) => {
                    index = self.add_value(&mut stack, pair, comments, lines, index)?;
                }
                _ => self.record(ParseError::InvalidLine {
                    line: index + 1,
                    text: line.to_string(),
                })?,
            }
            index += 1;
        }

        while stack.len() > 1 {
            close_top(&mut stack);
        }
        let root = stack.pop().map(|frame| frame.section).unwrap_or_default();

        let mut final_comment = Vec::new();
        if root.is_empty() && initial_comment.is_empty() {
            initial_comment = comment_list;
        } else if trailing_comments {
            final_comment = comment_list;
        }

        Ok(ParsedDocument {
            root,
            initial_comment,
            final_comment,
            indent_type: self.indent_type,
            errors: self.errors,
        })
    }

    fn record(&mut self, error: ParseError) -> Result<(), ParseError> {
        if self.options.raise_errors {
            return Err(error);
        }
        debug!(line = error.line(), kind = %error.kind(), "recorded parse error");
        self.errors.push(error);
        Ok(())
    }

    fn note_indent(&mut self, indent: &str) {
        if self.indent_type.is_none() && !indent.is_empty() {
            self.indent_type = Some(indent.to_string());
        }
    }

    fn open_section(
        &mut self,
        stack: &mut Vec<Frame>,
        marker: SectionMarker<'_>,
        comments: Vec<String>,
        line: &str,
        index: usize,
    ) -> Result<(), ParseError> {
        let text = line.to_string();
        let line_no = index + 1;
        self.note_indent(marker.indent);

        if marker.open != marker.close {
            return self.record(ParseError::SectionDepth { line: line_no, text });
        }
        let depth = marker.open;
        let current = stack.len() - 1;
        if depth > current + 1 {
            return self.record(ParseError::TooNested { line: line_no, text });
        }
        if depth == 0 {
            return self.record(ParseError::NestingLevel { line: line_no, text });
        }

        let name = marker.name;
        let open_sibling = stack.get(depth).is_some_and(|frame| frame.name == name);
        let closed_sibling = stack[depth - 1].section.contains_key(&name);
        let reopen = name == self.options.default_section
            && (open_sibling || stack[depth - 1].section.section(&name).is_some());

        if (open_sibling || closed_sibling) && !reopen {
            return self.record(ParseError::DuplicateSection {
                name,
                line: line_no,
                text,
            });
        }

        if open_sibling {
            // reopening the section that is still on the stack
            while stack.len() > depth + 1 {
                close_top(stack);
            }
            return Ok(());
        }

        while stack.len() > depth {
            close_top(stack);
        }
        let parent = &mut stack[depth - 1].section;

        if reopen {
            if let Some((position, section)) = parent.detach_section(&name) {
                stack.push(Frame {
                    name,
                    section,
                    reinsert_at: Some(position),
                });
            }
            return Ok(());
        }

        parent.comments.insert(name.clone(), comments);
        parent
            .inline_comments
            .insert(name.clone(), marker.comment.to_string());
        stack.push(Frame {
            section: Section::named(name.clone(), depth),
            name,
            reinsert_at: None,
        });
        Ok(())
    }

    /// Adds one key; returns the index of the last line consumed
    fn add_value<S: AsRef<str>>(
        &mut self,
        stack: &mut [Frame],
        pair: KeyValue<'_>,
        comments: Vec<String>,
        lines: &[S],
        index: usize,
    ) -> Result<usize, ParseError> {
        let line = lines[index].as_ref();
        let line_no = index + 1;
        self.note_indent(pair.indent);

        let scanned = if lexer::triple_quote(pair.value).is_some() {
            scan_multiline(pair.value, lines, index)
                .map(|found| (Value::String(found.value), found.comment, found.last_line))
                .ok_or(ValueError::Syntax)
        } else {
            self.scan_value(pair.value)
                .map(|(value, comment)| (value, comment, index))
        };

        let (value, comment, last_line) = match scanned {
            Ok(scanned) => scanned,
            Err(error) => {
                let text = line.to_string();
                let error = match (error, self.options.unrepr) {
                    (ValueError::UnknownName, true) => {
                        ParseError::UnreprUnknownName { line: line_no, text }
                    }
                    (_, true) => ParseError::UnreprSyntax { line: line_no, text },
                    _ => ParseError::BadValue { line: line_no, text },
                };
                self.record(error)?;
                return Ok(index);
            }
        };

        let Some(frame) = stack.last_mut() else {
            return Ok(last_line);
        };
        let section = &mut frame.section;
        if section.contains_key(&pair.key) {
            self.record(ParseError::DuplicateKey {
                key: pair.key,
                line: line_no,
                text: line.to_string(),
            })?;
            return Ok(last_line);
        }

        section.insert(pair.key.clone(), value);
        section.comments.insert(pair.key.clone(), comments);
        section.inline_comments.insert(pair.key, comment);
        Ok(last_line)
    }

    fn scan_value(&self, raw: &str) -> Result<(Value, String), ValueError> {
        if self.options.inspec {
            return Ok((Value::from(raw.trim_end()), String::new()));
        }
        if self.options.unrepr {
            return lexer::parse_literal(raw).map(|value| (value, String::new()));
        }
        let (value, comment) = if self.options.list_values {
            scan_list_value(raw)?
        } else {
            scan_plain_value(raw)?
        };
        Ok((value, comment.to_string()))
    }
}

fn close_top(stack: &mut Vec<Frame>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(frame) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent
                .section
                .attach_section(frame.name, frame.section, frame.reinsert_at);
        }
    }
}
