//! Built-in value checks
//!
//! [`Validator`] understands check specifications written as a function
//! call, for example `integer(0, 100, default=5)` or
//! `option('red', 'green', default='red')`. Positional and keyword
//! arguments are passed to the named check; `default` supplies the value used
//! when the key is missing. Custom checks can be registered by name.

use crate::error::ValidationError;
use crate::validation::Checker;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// One argument of a check specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckArg {
    /// The bare word `None`
    None,
    Str(String),
    /// A `list(...)` argument
    List(Vec<String>),
}

impl CheckArg {
    fn to_value(&self) -> Value {
        match self {
            CheckArg::None => Value::None,
            CheckArg::Str(s) => Value::from(s.as_str()),
            CheckArg::List(items) => Value::list(items.iter().map(String::as_str)),
        }
    }
}

impl fmt::Display for CheckArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckArg::None => f.write_str("None"),
            CheckArg::Str(s) => f.write_str(s),
            CheckArg::List(items) => write!(f, "list({})", items.join(", ")),
        }
    }
}

/// A parsed check specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSpec {
    pub name: String,
    pub args: Vec<CheckArg>,
    pub kwargs: IndexMap<String, CheckArg>,
    pub default: Option<CheckArg>,
}

impl CheckSpec {
    /// Parses `name`, `name()` or `name(arg, ..., key=value, ...)`
    ///
    /// Anything after the closing parenthesis, such as a comment kept by
    /// the schema reader, is ignored.
    pub fn parse(check: &str) -> Result<Self, ValidationError> {
        let check = check.trim();
        let (name, inner) = match (check.find('('), check.rfind(')')) {
            (Some(open), Some(close)) if open > 0 && close > open => {
                (&check[..open], Some(&check[open + 1..close]))
            }
            _ => (check, None),
        };

        let mut spec = CheckSpec {
            name: name.trim().to_string(),
            args: Vec::new(),
            kwargs: IndexMap::new(),
            default: None,
        };
        let Some(inner) = inner else {
            return Ok(spec);
        };

        let params =
            split_params(inner).ok_or_else(|| ValidationError::BadSyntax(check.to_string()))?;
        for param in params {
            match keyword(param) {
                Some((key, value)) => {
                    let value = parse_arg(value)
                        .ok_or_else(|| ValidationError::BadSyntax(check.to_string()))?;
                    spec.kwargs.insert(key.to_string(), value);
                }
                None => {
                    if !spec.kwargs.is_empty() {
                        return Err(ValidationError::BadSyntax(check.to_string()));
                    }
                    let value = parse_arg(param)
                        .ok_or_else(|| ValidationError::BadSyntax(check.to_string()))?;
                    spec.args.push(value);
                }
            }
        }
        spec.default = spec.kwargs.shift_remove("default");
        Ok(spec)
    }

    /// Positional argument `index`, or keyword `name`
    fn param(&self, index: usize, name: &str) -> Option<&CheckArg> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }
}

/// Splits on top-level commas, honouring quotes and parentheses
fn split_params(inner: &str) -> Option<Vec<&str>> {
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in inner.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.checked_sub(1)?,
            (None, ',') if depth == 0 => {
                params.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return None;
    }
    params.push(inner[start..].trim());
    params.retain(|p| !p.is_empty());
    Some(params)
}

fn keyword(param: &str) -> Option<(&str, &str)> {
    let eq = param.find('=')?;
    let key = param[..eq].trim();
    let mut chars = key.chars();
    let valid = chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');
    valid.then(|| (key, param[eq + 1..].trim()))
}

fn unquote_arg(text: &str) -> Option<&str> {
    let first = text.chars().next()?;
    if first == '"' || first == '\'' {
        if text.len() >= 2 && text.ends_with(first) {
            Some(&text[1..text.len() - 1])
        } else {
            None
        }
    } else {
        Some(text)
    }
}

fn parse_arg(text: &str) -> Option<CheckArg> {
    if text == "None" {
        return Some(CheckArg::None);
    }
    if let Some(inner) = text
        .strip_prefix("list(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let items = split_params(inner)?
            .into_iter()
            .map(|item| unquote_arg(item).map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        return Some(CheckArg::List(items));
    }
    unquote_arg(text).map(|s| CheckArg::Str(s.to_string()))
}

/// The built-in checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Integer,
    Float,
    Boolean,
    String,
    IpAddr,
    List,
    Tuple,
    IntList,
    FloatList,
    BoolList,
    StringList,
    IpAddrList,
    MixedList,
    Option,
    ForceList,
    Pass,
}

impl CheckKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "integer" => CheckKind::Integer,
            "float" => CheckKind::Float,
            "boolean" => CheckKind::Boolean,
            "string" => CheckKind::String,
            "ip_addr" => CheckKind::IpAddr,
            "list" => CheckKind::List,
            "tuple" => CheckKind::Tuple,
            "int_list" => CheckKind::IntList,
            "float_list" => CheckKind::FloatList,
            "bool_list" => CheckKind::BoolList,
            "string_list" => CheckKind::StringList,
            "ip_addr_list" => CheckKind::IpAddrList,
            "mixed_list" => CheckKind::MixedList,
            "option" => CheckKind::Option,
            "force_list" => CheckKind::ForceList,
            "pass" => CheckKind::Pass,
            _ => return None,
        })
    }

    /// Runs the check on a present value
    pub fn run(self, value: &Value, spec: &CheckSpec) -> Result<Value, ValidationError> {
        let min = spec.param(0, "min");
        let max = spec.param(1, "max");
        match self {
            CheckKind::Integer => check_integer(value, min, max),
            CheckKind::Float => check_float(value, min, max),
            CheckKind::Boolean => check_boolean(value),
            CheckKind::String => check_string(value, min, max),
            CheckKind::IpAddr => check_ip_addr(value),
            CheckKind::List | CheckKind::Tuple => check_list(value, min, max),
            CheckKind::IntList => map_list(value, min, max, |item| check_integer(item, None, None)),
            CheckKind::FloatList => map_list(value, min, max, |item| check_float(item, None, None)),
            CheckKind::BoolList => map_list(value, min, max, check_boolean),
            CheckKind::StringList => {
                if value.is_string() {
                    return Err(ValidationError::WrongType(value.to_string()));
                }
                map_list(value, min, max, |item| check_string(item, None, None))
            }
            CheckKind::IpAddrList => map_list(value, min, max, check_ip_addr),
            CheckKind::MixedList => check_mixed_list(value, &spec.args),
            CheckKind::Option => check_option(value, &spec.args),
            CheckKind::ForceList => {
                let forced = if value.is_list() {
                    value.clone()
                } else {
                    Value::list(vec![value.clone()])
                };
                check_list(&forced, min, max)
            }
            CheckKind::Pass => Ok(value.clone()),
        }
    }
}

fn bound_int(name: &str, arg: Option<&CheckArg>) -> Result<Option<i64>, ValidationError> {
    match arg {
        None | Some(CheckArg::None) => Ok(None),
        Some(other) => {
            let text = other.to_string();
            text.trim().parse().map(Some).map_err(|_| ValidationError::Param {
                param: name.to_string(),
                value: text,
            })
        }
    }
}

fn bound_float(name: &str, arg: Option<&CheckArg>) -> Result<Option<f64>, ValidationError> {
    match arg {
        None | Some(CheckArg::None) => Ok(None),
        Some(other) => {
            let text = other.to_string();
            text.trim().parse().map(Some).map_err(|_| ValidationError::Param {
                param: name.to_string(),
                value: text,
            })
        }
    }
}

fn check_integer(
    value: &Value,
    min: Option<&CheckArg>,
    max: Option<&CheckArg>,
) -> Result<Value, ValidationError> {
    let (min, max) = (bound_int("min", min)?, bound_int("max", max)?);
    let number = match value {
        Value::Integer(i) => *i,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| ValidationError::WrongType(value.to_string()))?,
        _ => return Err(ValidationError::WrongType(value.to_string())),
    };
    if min.is_some_and(|min| number < min) {
        return Err(ValidationError::TooSmall(number.to_string()));
    }
    if max.is_some_and(|max| number > max) {
        return Err(ValidationError::TooBig(number.to_string()));
    }
    Ok(Value::Integer(number))
}

fn check_float(
    value: &Value,
    min: Option<&CheckArg>,
    max: Option<&CheckArg>,
) -> Result<Value, ValidationError> {
    let (min, max) = (bound_float("min", min)?, bound_float("max", max)?);
    let number = match value {
        Value::Float(f) => *f,
        Value::Integer(i) => *i as f64,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| ValidationError::WrongType(value.to_string()))?,
        _ => return Err(ValidationError::WrongType(value.to_string())),
    };
    let shown = Value::Float(number).to_string();
    if min.is_some_and(|min| number < min) {
        return Err(ValidationError::TooSmall(shown));
    }
    if max.is_some_and(|max| number > max) {
        return Err(ValidationError::TooBig(shown));
    }
    Ok(Value::Float(number))
}

fn check_boolean(value: &Value) -> Result<Value, ValidationError> {
    match value {
        Value::Boolean(b) => Ok(Value::Boolean(*b)),
        Value::Integer(0) => Ok(Value::Boolean(false)),
        Value::Integer(1) => Ok(Value::Boolean(true)),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(Value::Boolean(true)),
            "false" | "off" | "no" | "0" => Ok(Value::Boolean(false)),
            _ => Err(ValidationError::WrongType(value.to_string())),
        },
        _ => Err(ValidationError::WrongType(value.to_string())),
    }
}

fn check_string(
    value: &Value,
    min: Option<&CheckArg>,
    max: Option<&CheckArg>,
) -> Result<Value, ValidationError> {
    let (min, max) = (bound_int("min", min)?, bound_int("max", max)?);
    let Value::String(s) = value else {
        return Err(ValidationError::WrongType(value.to_string()));
    };
    let length = s.chars().count() as i64;
    if min.is_some_and(|min| length < min) {
        return Err(ValidationError::TooShort(s.clone()));
    }
    if max.is_some_and(|max| length > max) {
        return Err(ValidationError::TooLong(s.clone()));
    }
    Ok(value.clone())
}

fn check_ip_addr(value: &Value) -> Result<Value, ValidationError> {
    let Value::String(s) = value else {
        return Err(ValidationError::WrongType(value.to_string()));
    };
    let address = s.trim();
    let parts: Vec<&str> = address.split('.').collect();
    let valid = parts.len() == 4
        && parts
            .iter()
            .all(|part| {
                !part.is_empty()
                    && part.chars().all(|c| c.is_ascii_digit())
                    && part.parse::<u8>().is_ok()
            });
    if valid {
        Ok(Value::from(address))
    } else {
        Err(ValidationError::Unacceptable(address.to_string()))
    }
}

fn check_list(
    value: &Value,
    min: Option<&CheckArg>,
    max: Option<&CheckArg>,
) -> Result<Value, ValidationError> {
    let (min, max) = (bound_int("min", min)?, bound_int("max", max)?);
    let Some(items) = value.as_list() else {
        return Err(ValidationError::WrongType(value.to_string()));
    };
    let length = items.len() as i64;
    if min.is_some_and(|min| length < min) {
        return Err(ValidationError::TooShort(value.to_string()));
    }
    if max.is_some_and(|max| length > max) {
        return Err(ValidationError::TooLong(value.to_string()));
    }
    Ok(value.clone())
}

fn map_list<F>(
    value: &Value,
    min: Option<&CheckArg>,
    max: Option<&CheckArg>,
    check: F,
) -> Result<Value, ValidationError>
where
    F: Fn(&Value) -> Result<Value, ValidationError>,
{
    let checked = check_list(value, min, max)?;
    let items = checked.as_list().unwrap_or_default();
    let converted = items.iter().map(check).collect::<Result<Vec<_>, _>>()?;
    Ok(Value::list(converted))
}

fn check_mixed_list(value: &Value, types: &[CheckArg]) -> Result<Value, ValidationError> {
    let Some(items) = value.as_list() else {
        return Err(ValidationError::WrongType(value.to_string()));
    };
    if items.len() < types.len() {
        return Err(ValidationError::TooShort(value.to_string()));
    }
    if items.len() > types.len() {
        return Err(ValidationError::TooLong(value.to_string()));
    }
    let converted = items
        .iter()
        .zip(types)
        .map(|(item, kind)| match kind.to_string().as_str() {
            "integer" => check_integer(item, None, None),
            "float" => check_float(item, None, None),
            "ip_addr" => check_ip_addr(item),
            "string" => check_string(item, None, None),
            "boolean" => check_boolean(item),
            other => Err(ValidationError::UnknownCheck(other.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::list(converted))
}

fn check_option(value: &Value, options: &[CheckArg]) -> Result<Value, ValidationError> {
    let Value::String(s) = value else {
        return Err(ValidationError::WrongType(value.to_string()));
    };
    if options.iter().any(|option| option.to_string() == *s) {
        Ok(value.clone())
    } else {
        Err(ValidationError::Unacceptable(s.clone()))
    }
}

/// A user-supplied check
pub trait CheckFunction {
    fn check(&self, value: &Value, spec: &CheckSpec) -> Result<Value, ValidationError>;
}

impl<F> CheckFunction for F
where
    F: Fn(&Value, &CheckSpec) -> Result<Value, ValidationError>,
{
    fn check(&self, value: &Value, spec: &CheckSpec) -> Result<Value, ValidationError> {
        self(value, spec)
    }
}

/// Checker backed by the built-in checks plus registered custom ones
#[derive(Default)]
pub struct Validator {
    custom: HashMap<String, Box<dyn CheckFunction>>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.custom.keys().collect();
        names.sort();
        f.debug_struct("Validator").field("custom", &names).finish()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a check under `name`, replacing any built-in of that name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        check: impl CheckFunction + 'static,
    ) -> &mut Self {
        self.custom.insert(name.into(), Box::new(check));
        self
    }

    fn run(&self, spec: &CheckSpec, value: &Value) -> Result<Value, ValidationError> {
        if let Some(custom) = self.custom.get(&spec.name) {
            return custom.check(value, spec);
        }
        let kind = CheckKind::from_name(&spec.name)
            .ok_or_else(|| ValidationError::UnknownCheck(spec.name.clone()))?;
        kind.run(value, spec)
    }
}

impl Checker for Validator {
    fn check(&self, check: &str, value: Option<&Value>) -> Result<Value, ValidationError> {
        let spec = CheckSpec::parse(check)?;
        let value = match (value, &spec.default) {
            (Some(value), _) => value.clone(),
            (None, None) => return Err(ValidationError::Missing),
            (None, Some(default)) => default.to_value(),
        };
        if value.is_none() {
            return Ok(Value::None);
        }
        self.run(&spec, &value)
    }

    fn default_value(&self, check: &str) -> Option<Value> {
        let spec = CheckSpec::parse(check).ok()?;
        let default = spec.default.as_ref()?.to_value();
        if default.is_none() {
            return Some(Value::None);
        }
        self.run(&spec, &default).ok()
    }
}
