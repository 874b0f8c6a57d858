//! Parameter leaf nodes and their validators

use regex::Regex;
use thiserror::Error;

use crate::convert::{convert, ConversionError, ParamKind, ParamValue, RawValue};
use crate::notify::hooks::HookChannel;

/// A converted value violated a constraint; the parameter keeps its value.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("value {value:?} violates constraint: {constraint}")]
pub struct ValidationError {
    pub constraint: String,
    pub value: String,
}

impl ValidationError {
    pub fn new(constraint: impl Into<String>, value: &ParamValue) -> Self {
        Self {
            constraint: constraint.into(),
            value: value.render(),
        }
    }
}

/// Mutation failure of a single parameter. The committed value is untouched
/// in either case.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Declarative constraint checked against a converted value before commit.
///
/// A validator only constrains values of its own kind and passes anything
/// else through, so a mixed validator list stays order-insensitive.
#[derive(Debug, Clone)]
pub enum Validator {
    IntRange { min: i64, max: i64 },
    FloatRange { min: f64, max: f64 },
    NonEmpty,
    MaxLen(usize),
    Matches { pattern: Regex, hint: String },
    OneOf(Vec<String>),
    /// Every list element must name a known hook channel.
    HookNames,
}

impl Validator {
    /// Compile a regex constraint. `hint` is the human-facing description of
    /// what the pattern expects.
    pub fn matches(pattern: &str, hint: &str) -> Result<Self, regex::Error> {
        Ok(Validator::Matches {
            pattern: Regex::new(pattern)?,
            hint: hint.to_string(),
        })
    }

    pub fn check(&self, value: &ParamValue) -> Result<(), ValidationError> {
        match (self, value) {
            (Validator::IntRange { min, max }, ParamValue::Int(i)) => {
                if i < min || i > max {
                    return Err(ValidationError::new(
                        format!("expected integer in {}..={}", min, max),
                        value,
                    ));
                }
            }
            (Validator::FloatRange { min, max }, ParamValue::Float(f)) => {
                if f < min || f > max {
                    return Err(ValidationError::new(
                        format!("expected number in {}..={}", min, max),
                        value,
                    ));
                }
            }
            (Validator::NonEmpty, ParamValue::Text(s))
            | (Validator::NonEmpty, ParamValue::Choice(s)) => {
                if s.trim().is_empty() {
                    return Err(ValidationError::new("value must not be empty", value));
                }
            }
            (Validator::NonEmpty, ParamValue::List(items)) => {
                if items.is_empty() {
                    return Err(ValidationError::new("list must not be empty", value));
                }
            }
            (Validator::MaxLen(max), ParamValue::Text(s))
            | (Validator::MaxLen(max), ParamValue::Choice(s)) => {
                if s.chars().count() > *max {
                    return Err(ValidationError::new(
                        format!("value longer than {} characters", max),
                        value,
                    ));
                }
            }
            (Validator::MaxLen(max), ParamValue::List(items)) => {
                if items.len() > *max {
                    return Err(ValidationError::new(
                        format!("list longer than {} entries", max),
                        value,
                    ));
                }
            }
            (Validator::Matches { pattern, hint }, ParamValue::Text(s)) => {
                if !pattern.is_match(s) {
                    return Err(ValidationError::new(hint.clone(), value));
                }
            }
            (Validator::OneOf(options), ParamValue::Choice(s))
            | (Validator::OneOf(options), ParamValue::Text(s)) => {
                if !options.iter().any(|o| o == s) {
                    return Err(ValidationError::new(
                        format!("expected one of: {}", options.join(", ")),
                        value,
                    ));
                }
            }
            (Validator::HookNames, ParamValue::List(items)) => {
                for item in items {
                    if item.parse::<HookChannel>().is_err() {
                        return Err(ValidationError::new(
                            format!("unknown hook channel: {}", item),
                            value,
                        ));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Typed leaf node of the settings tree.
///
/// `value` always satisfies every validator; a failed mutation never
/// partially updates it.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub kind: ParamKind,
    value: ParamValue,
    pub default: ParamValue,
    pub validators: Vec<Validator>,
    /// Redacted in snapshots and change events (tokens, API hashes).
    pub sensitive: bool,
    /// Fixed ordered option set of a choice parameter.
    pub options: Vec<String>,
}

impl Parameter {
    pub fn new(kind: ParamKind, default: ParamValue, validators: Vec<Validator>) -> Self {
        Self {
            kind,
            value: default.clone(),
            default,
            validators,
            sensitive: false,
            options: Vec::new(),
        }
    }

    /// Choice parameter over a fixed option set, selecting `default_index`.
    /// Membership is enforced through an implicit `OneOf` validator.
    pub fn choice(options: Vec<String>, default_index: usize) -> Self {
        let default = ParamValue::Choice(options[default_index].clone());
        Self {
            kind: ParamKind::Choice,
            value: default.clone(),
            default,
            validators: vec![Validator::OneOf(options.clone())],
            sensitive: false,
            options,
        }
    }

    /// Last committed value.
    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    /// Selected option index of a choice parameter.
    pub fn selected_index(&self) -> Option<usize> {
        match &self.value {
            ParamValue::Choice(current) => self.options.iter().position(|o| o == current),
            _ => None,
        }
    }

    /// Convert, validate and commit a raw input.
    ///
    /// Returns `(old, new)` on success; on failure the committed value is
    /// untouched. Persistence and notification are the caller's concern.
    pub fn apply_raw(&mut self, raw: &RawValue) -> Result<(ParamValue, ParamValue), ParamError> {
        let converted = convert(self.kind, raw)?;
        self.commit(converted)
    }

    /// Validate and commit an already-typed value.
    pub fn commit(&mut self, converted: ParamValue) -> Result<(ParamValue, ParamValue), ParamError> {
        for validator in &self.validators {
            validator.check(&converted)?;
        }
        let old = std::mem::replace(&mut self.value, converted.clone());
        Ok((old, converted))
    }

    /// Select a choice option by index. Fails with a `ValidationError` when
    /// the index is out of range or the parameter is not a choice.
    pub fn select(&mut self, index: usize) -> Result<(ParamValue, ParamValue), ParamError> {
        match self.options.get(index) {
            Some(option) => self.commit(ParamValue::Choice(option.clone())),
            None => Err(ValidationError::new(
                format!("expected option index below {}", self.options.len()),
                &self.value,
            )
            .into()),
        }
    }

    /// Restore the default value through the normal commit pipeline.
    pub fn reset(&mut self) -> Result<(ParamValue, ParamValue), ParamError> {
        self.commit(self.default.clone())
    }

    /// Value rendering with sensitive redaction applied.
    pub fn render_value(&self) -> String {
        if self.sensitive {
            "\u{2022}\u{2022}\u{2022}".to_string()
        } else {
            self.value.render()
        }
    }
}
