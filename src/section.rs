//! Ordered, comment-annotated section tree
//!
//! A [`Section`] maps keys to either values or nested sections, keeping
//! insertion order. Alongside the entries it carries the comments attached to
//! each key and the bookkeeping that validation fills in: keys holding
//! injected defaults, the defaults themselves, and keys the schema did not
//! cover.

use crate::error::ConfigObjError;
use crate::value::Value;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// An entry stored under a key
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Value(Value),
    Section(Section),
}

impl Entry {
    /// Returns the value if this entry is a scalar or list
    pub fn as_value(&self) -> Option<&Value> {
        if let Entry::Value(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Returns the section if this entry is a subsection
    pub fn as_section(&self) -> Option<&Section> {
        if let Entry::Section(section) = self {
            Some(section)
        } else {
            None
        }
    }

    /// Returns true if this entry is a subsection
    pub fn is_section(&self) -> bool {
        matches!(self, Entry::Section(_))
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Value(value)
    }
}

impl From<Section> for Entry {
    fn from(section: Section) -> Self {
        Entry::Section(section)
    }
}

impl From<&str> for Entry {
    fn from(s: &str) -> Self {
        Entry::Value(Value::from(s))
    }
}

impl From<String> for Entry {
    fn from(s: String) -> Self {
        Entry::Value(Value::from(s))
    }
}

impl From<i64> for Entry {
    fn from(i: i64) -> Self {
        Entry::Value(Value::Integer(i))
    }
}

impl From<f64> for Entry {
    fn from(f: f64) -> Self {
        Entry::Value(Value::Float(f))
    }
}

impl From<bool> for Entry {
    fn from(b: bool) -> Self {
        Entry::Value(Value::Boolean(b))
    }
}

impl From<Vec<&str>> for Entry {
    fn from(items: Vec<&str>) -> Self {
        Entry::Value(Value::from(items))
    }
}

impl From<Vec<String>> for Entry {
    fn from(items: Vec<String>) -> Self {
        Entry::Value(Value::from(items))
    }
}

/// Result of [`Section::walk`], shaped like the visited tree
#[derive(Debug, Clone, PartialEq)]
pub enum Walked<T> {
    Value(T),
    Section(IndexMap<String, Walked<T>>),
}

/// One level of the configuration tree
#[derive(Debug, Clone, Default)]
pub struct Section {
    name: String,
    depth: usize,
    entries: IndexMap<String, Entry>,
    /// Full-line comments preceding each key
    pub comments: IndexMap<String, Vec<String>>,
    /// Comment trailing each key's line
    pub inline_comments: IndexMap<String, String>,
    /// Keys found in the data but not covered by the schema
    pub extra_values: Vec<String>,
    /// Keys whose current value was injected from a schema default
    pub defaults: Vec<String>,
    /// Schema defaults recorded during validation
    pub default_values: IndexMap<String, Value>,
    pub(crate) created: bool,
}

impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

const TRUE_WORDS: [&str; 4] = ["true", "on", "yes", "1"];
const FALSE_WORDS: [&str; 4] = ["false", "off", "no", "0"];

impl Section {
    /// Creates an empty top-level section
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn named(name: impl Into<String>, depth: usize) -> Self {
        Self {
            name: name.into(),
            depth,
            ..Self::default()
        }
    }

    /// Key under which this section is stored in its parent
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nesting depth; the root is 0
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True when validation created this section because the schema required it
    pub fn was_created(&self) -> bool {
        self.created
    }

    fn relabel(&mut self, name: &str, depth: usize) {
        self.name = name.to_string();
        self.set_depth(depth);
    }

    fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
        for entry in self.entries.values_mut() {
            if let Entry::Section(child) = entry {
                child.set_depth(depth + 1);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Returns the value stored under `key`, if it is not a section
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).and_then(Entry::as_value)
    }

    pub fn value_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self.entries.get_mut(key) {
            Some(Entry::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Returns the subsection stored under `name`
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.entries.get(name).and_then(Entry::as_section)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        match self.entries.get_mut(name) {
            Some(Entry::Section(section)) => Some(section),
            _ => None,
        }
    }

    /// Stores an entry, keeping the position of an existing key
    ///
    /// A stored section takes the key as its name and sits one level below
    /// this one. The key stops being listed as holding a default.
    pub fn insert(&mut self, key: impl Into<String>, entry: impl Into<Entry>) -> Option<Entry> {
        let key = key.into();
        let mut entry = entry.into();
        if let Entry::Section(section) = &mut entry {
            section.relabel(&key, self.depth + 1);
        }
        self.comments.entry(key.clone()).or_default();
        self.inline_comments.entry(key.clone()).or_default();
        self.defaults.retain(|k| k != &key);
        self.entries.insert(key, entry)
    }

    /// Attaches a parsed section whose comments are already recorded
    pub(crate) fn attach_section(&mut self, name: String, section: Section, at: Option<usize>) {
        match at {
            Some(index) if index <= self.entries.len() => {
                self.entries.shift_insert(index, name, Entry::Section(section));
            }
            _ => {
                self.entries.insert(name, Entry::Section(section));
            }
        }
    }

    /// Detaches a section for reopening, returning its position
    pub(crate) fn detach_section(&mut self, name: &str) -> Option<(usize, Section)> {
        self.section(name)?;
        match self.entries.shift_remove_full(name) {
            Some((index, _, Entry::Section(section))) => Some((index, section)),
            _ => None,
        }
    }

    /// Removes a key together with its comments
    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        let removed = self.entries.shift_remove(key)?;
        self.comments.shift_remove(key);
        self.inline_comments.shift_remove(key);
        self.defaults.retain(|k| k != key);
        Some(removed)
    }

    /// Renames a key in place, keeping its position and comments
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), ConfigObjError> {
        let (index, _, mut entry) = self
            .entries
            .shift_remove_full(old)
            .ok_or_else(|| ConfigObjError::KeyNotFound(old.to_string()))?;
        if let Entry::Section(section) = &mut entry {
            section.name = new.to_string();
        }
        self.entries.shift_insert(index, new.to_string(), entry);

        let comments = self.comments.shift_remove(old).unwrap_or_default();
        self.comments.insert(new.to_string(), comments);
        let inline = self.inline_comments.shift_remove(old).unwrap_or_default();
        self.inline_comments.insert(new.to_string(), inline);
        for key in self.defaults.iter_mut().filter(|k| k.as_str() == old) {
            *key = new.to_string();
        }
        Ok(())
    }

    /// Scalar keys followed by section keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.scalars()
            .map(|(key, _)| key)
            .chain(self.sections().map(|(key, _)| key))
    }

    /// Entries in iteration order: scalars first, then sections
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        let scalars = self.entries.iter().filter(|(_, e)| !e.is_section());
        let sections = self.entries.iter().filter(|(_, e)| e.is_section());
        scalars.chain(sections).map(|(k, e)| (k.as_str(), e))
    }

    /// Keys holding values, in insertion order
    pub fn scalars(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.as_value().map(|v| (k.as_str(), v)))
    }

    /// Keys holding subsections, in insertion order
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.as_section().map(|s| (k.as_str(), s)))
    }

    pub(crate) fn sections_mut(&mut self) -> impl Iterator<Item = &mut Section> {
        self.entries.values_mut().filter_map(|entry| match entry {
            Entry::Section(section) => Some(section),
            Entry::Value(_) => None,
        })
    }

    pub fn scalar_keys(&self) -> Vec<String> {
        self.scalars().map(|(k, _)| k.to_string()).collect()
    }

    pub fn section_keys(&self) -> Vec<String> {
        self.sections().map(|(k, _)| k.to_string()).collect()
    }

    /// Drops every entry and all bookkeeping except recorded defaults
    pub fn clear(&mut self) {
        self.entries.clear();
        self.comments.clear();
        self.inline_comments.clear();
        self.extra_values.clear();
        self.defaults.clear();
    }

    fn require(&self, key: &str) -> Result<&Value, ConfigObjError> {
        self.value(key)
            .ok_or_else(|| ConfigObjError::KeyNotFound(key.to_string()))
    }

    fn invalid(key: &str, value: &Value, expected: &'static str) -> ConfigObjError {
        ConfigObjError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }
    }

    /// Reads a boolean; accepts true/on/yes/1 and false/off/no/0 in any case
    pub fn as_bool(&self, key: &str) -> Result<bool, ConfigObjError> {
        let value = self.require(key)?;
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::String(s) => {
                let lower = s.to_lowercase();
                if TRUE_WORDS.contains(&lower.as_str()) {
                    Ok(true)
                } else if FALSE_WORDS.contains(&lower.as_str()) {
                    Ok(false)
                } else {
                    Err(Self::invalid(key, value, "boolean"))
                }
            }
            _ => Err(Self::invalid(key, value, "boolean")),
        }
    }

    pub fn as_int(&self, key: &str) -> Result<i64, ConfigObjError> {
        let value = self.require(key)?;
        match value {
            Value::Integer(i) => Ok(*i),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Self::invalid(key, value, "integer")),
            _ => Err(Self::invalid(key, value, "integer")),
        }
    }

    pub fn as_float(&self, key: &str) -> Result<f64, ConfigObjError> {
        let value = self.require(key)?;
        match value {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Self::invalid(key, value, "float")),
            _ => Err(Self::invalid(key, value, "float")),
        }
    }

    /// Reads a value as a list; scalars become one-element lists
    pub fn as_list(&self, key: &str) -> Result<Vec<Value>, ConfigObjError> {
        Ok(match self.require(key)? {
            Value::List(items) => items.to_vec(),
            other => vec![other.clone()],
        })
    }

    /// Recursively merges `other` into this section
    ///
    /// Section-over-section merges descend; anything else replaces the entry.
    pub fn merge(&mut self, other: &Section) {
        for (key, entry) in &other.entries {
            match (self.entries.get_mut(key), entry) {
                (Some(Entry::Section(mine)), Entry::Section(theirs)) => mine.merge(theirs),
                _ => {
                    self.insert(key.clone(), entry.clone());
                }
            }
        }
    }

    /// Restores one key to its recorded default and marks it as defaulted
    pub fn restore_default(&mut self, key: &str) -> Result<Value, ConfigObjError> {
        let default = self
            .default_values
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigObjError::KeyNotFound(key.to_string()))?;
        self.put_default(key, default.clone());
        Ok(default)
    }

    fn put_default(&mut self, key: &str, default: Value) {
        self.comments.entry(key.to_string()).or_default();
        self.inline_comments.entry(key.to_string()).or_default();
        self.entries.insert(key.to_string(), Entry::Value(default));
        if !self.defaults.iter().any(|k| k == key) {
            self.defaults.push(key.to_string());
        }
    }

    /// Restores every recorded default, recursively
    pub fn restore_defaults(&mut self) {
        let defaults: Vec<(String, Value)> = self
            .default_values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, default) in defaults {
            self.put_default(&key, default);
        }
        for child in self.sections_mut() {
            child.restore_defaults();
        }
    }

    /// Calls `function` on every key in the tree, scalars before sections
    ///
    /// The callback receives the section holding the key and may rename it
    /// in place; the walk picks up the new name by position. With
    /// `call_on_sections` the callback also runs on each section key before
    /// descending into it.
    pub fn walk<T, E, F>(
        &mut self,
        call_on_sections: bool,
        function: &mut F,
    ) -> Result<IndexMap<String, Walked<T>>, E>
    where
        F: FnMut(&mut Section, &str) -> Result<T, E>,
    {
        let mut out = IndexMap::new();

        for (index, key) in self.scalar_keys().into_iter().enumerate() {
            let result = function(self, &key)?;
            let key = self.scalar_keys().get(index).cloned().unwrap_or(key);
            out.insert(key, Walked::Value(result));
        }

        for (index, name) in self.section_keys().into_iter().enumerate() {
            let mut name = name;
            if call_on_sections {
                function(self, &name)?;
                if let Some(current) = self.section_keys().get(index) {
                    name = current.clone();
                }
            }
            if let Some(child) = self.section_mut(&name) {
                let nested = child.walk(call_on_sections, function)?;
                out.insert(name, Walked::Section(nested));
            }
        }
        Ok(out)
    }
}

impl<K: Into<String>, E: Into<Entry>> FromIterator<(K, E)> for Section {
    fn from_iter<I: IntoIterator<Item = (K, E)>>(iter: I) -> Self {
        let mut section = Section::new();
        for (key, entry) in iter {
            section.insert(key, entry);
        }
        section
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Entry::Value(value) => value.serialize(serializer),
            Entry::Section(section) => section.serialize(serializer),
        }
    }
}

impl Serialize for Section {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, entry) in self.iter() {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}
