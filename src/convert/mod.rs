//! Value conversion layer for the settings tree
//!
//! Pure, deterministic coercion of weakly-typed external input (chat text,
//! JSON payloads, already-typed values) into the typed values a parameter
//! stores. Conversion never touches tree state; validation and commit happen
//! elsewhere.

use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;

/// Type tag of a parameter, driving conversion and UI rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Boolean switch
    Toggle,
    /// Free-form text
    Text,
    /// Signed integer
    Int,
    /// Floating-point number
    Float,
    /// One option out of a fixed ordered set
    Choice,
    /// Ordered list of strings
    List,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamKind::Toggle => "toggle",
            ParamKind::Text => "text",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::Choice => "choice",
            ParamKind::List => "list",
        };
        write!(f, "{}", name)
    }
}

/// A committed, validated parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Toggle(bool),
    Text(String),
    Int(i64),
    Float(f64),
    /// Selected option of a choice parameter
    Choice(String),
    List(Vec<String>),
}

impl ParamValue {
    /// Type tag of this value.
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Toggle(_) => ParamKind::Toggle,
            ParamValue::Text(_) => ParamKind::Text,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Choice(_) => ParamKind::Choice,
            ParamValue::List(_) => ParamKind::List,
        }
    }

    /// Human-readable rendering for menus and change events.
    pub fn render(&self) -> String {
        match self {
            ParamValue::Toggle(b) => b.to_string(),
            ParamValue::Text(s) | ParamValue::Choice(s) => s.clone(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::List(items) => items.join(", "),
        }
    }

    /// Primitive serialization for the backing files. The parameter kind is
    /// reconstructed from the in-memory schema on load, never stored.
    pub fn to_toml(&self) -> toml::Value {
        match self {
            ParamValue::Toggle(b) => toml::Value::Boolean(*b),
            ParamValue::Text(s) | ParamValue::Choice(s) => toml::Value::String(s.clone()),
            ParamValue::Int(i) => toml::Value::Integer(*i),
            ParamValue::Float(f) => toml::Value::Float(*f),
            ParamValue::List(items) => toml::Value::Array(
                items
                    .iter()
                    .map(|s| toml::Value::String(s.clone()))
                    .collect(),
            ),
        }
    }
}

/// Weakly-typed input as it arrives from chat handlers, JSON payloads or
/// backing files.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<RawValue>),
    Json(JsonValue),
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Int(i)
    }
}

impl From<f64> for RawValue {
    fn from(f: f64) -> Self {
        RawValue::Float(f)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<Vec<String>> for RawValue {
    fn from(items: Vec<String>) -> Self {
        RawValue::List(items.into_iter().map(RawValue::Text).collect())
    }
}

impl From<JsonValue> for RawValue {
    fn from(value: JsonValue) -> Self {
        RawValue::Json(value)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Text(s) => write!(f, "{}", s),
            RawValue::Int(i) => write!(f, "{}", i),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(|r| r.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            RawValue::Json(JsonValue::String(s)) => write!(f, "{}", s),
            RawValue::Json(value) => write!(f, "{}", value),
        }
    }
}

/// Raw input could not be coerced to the parameter's declared type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert {raw:?} to {target}")]
pub struct ConversionError {
    pub target: ParamKind,
    pub raw: String,
}

impl ConversionError {
    fn new(target: ParamKind, raw: &RawValue) -> Self {
        Self {
            target,
            raw: raw.to_string(),
        }
    }
}

/// Convert raw external input to a value of the target kind.
///
/// Deterministic and side-effect free. `Choice` conversion only types the
/// input; membership in the option set is a validation concern.
pub fn convert(target: ParamKind, raw: &RawValue) -> Result<ParamValue, ConversionError> {
    match target {
        ParamKind::Toggle => Ok(ParamValue::Toggle(convert_toggle(raw))),
        ParamKind::Text => Ok(ParamValue::Text(raw.to_string())),
        ParamKind::Choice => Ok(ParamValue::Choice(raw.to_string())),
        ParamKind::Int => convert_int(raw).ok_or_else(|| ConversionError::new(target, raw)),
        ParamKind::Float => convert_float(raw).ok_or_else(|| ConversionError::new(target, raw)),
        ParamKind::List => convert_list(raw).ok_or_else(|| ConversionError::new(target, raw)),
    }
}

/// Toggle conversion contract: an already-typed boolean passes through; any
/// other input is stringified and matched case-insensitively against
/// `{"true", "on"}` (true) and `{"off", "false", "none", "null"}` (false).
/// The empty string is false and every other non-empty string is true.
/// Numeric strings get no special casing: `"1"` and `"0"` are both truthy.
fn convert_toggle(raw: &RawValue) -> bool {
    if let RawValue::Bool(b) = raw {
        return *b;
    }
    if let RawValue::Json(JsonValue::Bool(b)) = raw {
        return *b;
    }
    let text = raw.to_string();
    let lowered = text.trim().to_lowercase();
    match lowered.as_str() {
        "true" | "on" => true,
        "off" | "false" | "none" | "null" => false,
        "" => false,
        _ => true,
    }
}

fn convert_int(raw: &RawValue) -> Option<ParamValue> {
    match raw {
        RawValue::Int(i) => Some(ParamValue::Int(*i)),
        RawValue::Float(f) => int_from_float(*f),
        RawValue::Text(s) => s.trim().parse::<i64>().ok().map(ParamValue::Int),
        RawValue::Json(JsonValue::Number(n)) => match n.as_i64() {
            Some(i) => Some(ParamValue::Int(i)),
            None => n.as_f64().and_then(int_from_float),
        },
        RawValue::Json(JsonValue::String(s)) => s.trim().parse::<i64>().ok().map(ParamValue::Int),
        _ => None,
    }
}

// Whole-valued floats are accepted as integers, anything fractional is not.
fn int_from_float(f: f64) -> Option<ParamValue> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(ParamValue::Int(f as i64))
    } else {
        None
    }
}

fn convert_float(raw: &RawValue) -> Option<ParamValue> {
    match raw {
        RawValue::Float(f) => Some(ParamValue::Float(*f)),
        RawValue::Int(i) => Some(ParamValue::Float(*i as f64)),
        RawValue::Text(s) => s.trim().parse::<f64>().ok().map(ParamValue::Float),
        RawValue::Json(JsonValue::Number(n)) => n.as_f64().map(ParamValue::Float),
        RawValue::Json(JsonValue::String(s)) => s.trim().parse::<f64>().ok().map(ParamValue::Float),
        _ => None,
    }
}

fn convert_list(raw: &RawValue) -> Option<ParamValue> {
    match raw {
        RawValue::List(items) => items
            .iter()
            .map(element_to_string)
            .collect::<Option<Vec<_>>>()
            .map(ParamValue::List),
        RawValue::Text(s) => {
            let parsed: JsonValue = serde_json::from_str(s).ok()?;
            json_array_to_list(&parsed)
        }
        RawValue::Json(value) => json_array_to_list(value),
        _ => None,
    }
}

fn json_array_to_list(value: &JsonValue) -> Option<ParamValue> {
    let items = value.as_array()?;
    items
        .iter()
        .map(json_element_to_string)
        .collect::<Option<Vec<_>>>()
        .map(ParamValue::List)
}

fn element_to_string(raw: &RawValue) -> Option<String> {
    match raw {
        RawValue::Text(s) => Some(s.clone()),
        RawValue::Int(i) => Some(i.to_string()),
        RawValue::Float(f) => Some(f.to_string()),
        RawValue::Bool(b) => Some(b.to_string()),
        RawValue::Json(value) => json_element_to_string(value),
        RawValue::List(_) => None,
    }
}

fn json_element_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
