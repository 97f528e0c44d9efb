//! Named, bounded node parameters.
//!
//! Every node kind publishes a static table of [`ParamSpec`]s. Values come
//! in as [`ParamValue`]s from any control surface (CLI, UI, tests) and are
//! normalized against their `ParamSpec` before they reach the node: numbers are
//! clamped and snapped, choices are matched case-insensitively.

use std::fmt;

use crate::error::ParamError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamRange {
    /// `step == 0.0` means continuous.
    Number { min: f32, max: f32, step: f32 },
    Choice(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub range: ParamRange,
}

impl ParamSpec {
    pub const fn number(name: &'static str, min: f32, max: f32) -> Self {
        Self {
            name,
            range: ParamRange::Number { min, max, step: 0.0 },
        }
    }

    pub const fn stepped(name: &'static str, min: f32, max: f32, step: f32) -> Self {
        Self {
            name,
            range: ParamRange::Number { min, max, step },
        }
    }

    pub const fn choice(name: &'static str, options: &'static [&'static str]) -> Self {
        Self {
            name,
            range: ParamRange::Choice(options),
        }
    }

    /// Normalize `value` against this spec.
    pub fn accept(&self, value: ParamValue) -> Result<ParamValue, ParamError> {
        match (self.range, value) {
            (ParamRange::Number { min, max, step }, ParamValue::Number(x)) => {
                let x = if x.is_nan() { min } else { x };
                let x = if step > 0.0 {
                    min + ((x - min) / step).round() * step
                } else {
                    x
                };
                Ok(ParamValue::Number(x.clamp(min, max)))
            }
            (ParamRange::Choice(options), ParamValue::Choice(choice)) => {
                let wanted = normalize_choice(&choice);
                options
                    .iter()
                    .find(|option| **option == wanted)
                    .map(|option| ParamValue::Choice((*option).to_string()))
                    .ok_or(ParamError::InvalidChoice {
                        name: self.name,
                        value: choice,
                    })
            }
            _ => Err(ParamError::WrongKind { name: self.name }),
        }
    }

    /// Parse text typed by a user: a number for numeric parameters, an
    /// option name for choices.
    pub fn parse(&self, text: &str) -> Result<ParamValue, ParamError> {
        let value = match self.range {
            ParamRange::Number { .. } => text
                .trim()
                .parse::<f32>()
                .map(ParamValue::Number)
                .map_err(|_| ParamError::WrongKind { name: self.name })?,
            ParamRange::Choice(_) => ParamValue::Choice(text.to_string()),
        };
        self.accept(value)
    }
}

/// Find `name` in a parameter table.
pub fn lookup<'a>(specs: &'a [ParamSpec], name: &str) -> Result<&'a ParamSpec, ParamError> {
    specs
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| ParamError::Unknown(name.to_string()))
}

fn normalize_choice(choice: &str) -> String {
    choice.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f32),
    Choice(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f32> {
        match self {
            ParamValue::Number(x) => Some(*x),
            ParamValue::Choice(_) => None,
        }
    }

    pub fn as_choice(&self) -> Option<&str> {
        match self {
            ParamValue::Choice(choice) => Some(choice),
            ParamValue::Number(_) => None,
        }
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Choice(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Choice(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(x) => write!(f, "{x}"),
            ParamValue::Choice(choice) => f.write_str(choice),
        }
    }
}
