//! Primitive value types and typed cell values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Built-in primitive value types every user-defined type refines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Integer,
    Decimal,
    Text,
    Boolean,
}

impl Primitive {
    pub const ALL: [Primitive; 4] = [
        Primitive::Integer,
        Primitive::Decimal,
        Primitive::Text,
        Primitive::Boolean,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::Boolean => "boolean",
        }
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Decimal)
    }

    /// Parse raw cell text into a value of this primitive.
    ///
    /// Returns `None` when the text is not a valid literal. Every primitive
    /// except [`Primitive::Text`] trims surrounding whitespace first and
    /// rejects empty cells.
    #[must_use]
    pub fn parse(self, raw: &str) -> Option<Value> {
        if self == Self::Text {
            return Some(Value::Text(raw.to_string()));
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match self {
            Self::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
            Self::Decimal => parse_decimal(trimmed).map(Value::Decimal),
            Self::Boolean => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Some(Value::Boolean(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Some(Value::Boolean(false))
                } else {
                    None
                }
            }
            Self::Text => unreachable!("handled above"),
        }
    }
}

/// Accepts `.` as the decimal separator, or a single `,` when no `.` is
/// present and the comma is not followed by exactly three digits. `1,000`
/// reads as a thousands group and is rejected rather than guessed.
fn parse_decimal(text: &str) -> Option<f64> {
    let normalized;
    let candidate = match text.split_once(',') {
        Some((_, fraction)) if !text.contains('.') && !fraction.contains(',') => {
            if fraction.len() == 3 && fraction.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            normalized = text.replacen(',', ".", 1);
            normalized.as_str()
        }
        _ => text,
    };
    candidate.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Primitive {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(Self::Integer),
            "decimal" => Ok(Self::Decimal),
            "text" => Ok(Self::Text),
            "boolean" => Ok(Self::Boolean),
            other => Err(format!("unknown primitive type '{other}'")),
        }
    }
}

/// A typed value: a validated table cell or a configuration literal.
///
/// Deserializes untagged, so YAML `1925` is an integer, `1.5` a decimal,
/// `true` a boolean and anything quoted a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub fn primitive(&self) -> Primitive {
        match self {
            Self::Boolean(_) => Primitive::Boolean,
            Self::Integer(_) => Primitive::Integer,
            Self::Decimal(_) => Primitive::Decimal,
            Self::Text(_) => Primitive::Text,
        }
    }

    /// Numeric view of integers and decimals.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Decimal(v) => Some(*v),
            Self::Boolean(_) | Self::Text(_) => None,
        }
    }

    /// Typed equality: numbers compare numerically across integer/decimal,
    /// text only equals text and booleans only equal booleans.
    #[must_use]
    pub fn typed_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}
