use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref VERSION_NUMERIC_COMPONENTS_REGEX: Regex =
        Regex::new(r"^\d+(\.\d+)?(\.\d+)?").unwrap();
}

/// A single workspace or user value: a tagged union over the scalar types that
/// targeting conditions can compare.
///
/// Exactly one case carries a payload; [HackleValue::Null] represents an
/// explicitly absent value, which is distinct from a failed coercion (the
/// `as_*` methods returning `None`).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HackleValue {
    /// Stores a string value.
    String(String),
    /// Stores a number. Integers are represented losslessly up to 2^53.
    Number(f64),
    /// Stores a boolean.
    Bool(bool),
    /// Stores an explicit null.
    Null,
}

impl From<&str> for HackleValue {
    fn from(s: &str) -> HackleValue {
        HackleValue::String(s.to_owned())
    }
}

impl From<String> for HackleValue {
    fn from(s: String) -> HackleValue {
        HackleValue::String(s)
    }
}

impl From<f64> for HackleValue {
    fn from(f: f64) -> HackleValue {
        HackleValue::Number(f)
    }
}

impl From<i64> for HackleValue {
    fn from(i: i64) -> HackleValue {
        HackleValue::Number(i as f64)
    }
}

impl From<bool> for HackleValue {
    fn from(b: bool) -> HackleValue {
        HackleValue::Bool(b)
    }
}

impl fmt::Display for HackleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HackleValue::String(s) => write!(f, "{}", s),
            HackleValue::Number(n) => write!(f, "{}", n),
            HackleValue::Bool(b) => write!(f, "{}", b),
            HackleValue::Null => write!(f, "null"),
        }
    }
}

impl HackleValue {
    pub fn is_null(&self) -> bool {
        matches!(self, HackleValue::Null)
    }

    /// Coerce to a string. Numbers convert to their decimal representation;
    /// booleans and null do not convert.
    pub fn as_string(&self) -> Option<String> {
        match self {
            HackleValue::String(s) => Some(s.clone()),
            HackleValue::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }

    /// Coerce to a number. Numeric strings convert; booleans and null do not.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            HackleValue::Number(n) => Some(*n),
            HackleValue::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Returns the wrapped boolean. It will not convert.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HackleValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempt to parse a string value into a semantic version.
    ///
    /// Missing minor/patch components are filled in with zeroes, so "2.1" is
    /// parsed as "2.1.0". Returns `None` for non-string values and for
    /// strings that cannot be parsed even loosely.
    pub fn as_version(&self) -> Option<semver::Version> {
        let version_str = match self {
            HackleValue::String(s) => s,
            _ => return None,
        };
        semver::Version::parse(version_str)
            .ok()
            .or_else(|| parse_version_loose(version_str))
            .map(|mut version| {
                version.build = semver::BuildMetadata::EMPTY;
                version
            })
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9007199254740992.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn parse_version_loose(version_str: &str) -> Option<semver::Version> {
    let parts = VERSION_NUMERIC_COMPONENTS_REGEX.captures(version_str)?;

    let numeric_parts = parts.get(0).unwrap();
    let mut transformed_version_str = numeric_parts.as_str().to_string();

    for i in 1..parts.len() {
        if parts.get(i).is_none() {
            transformed_version_str.push_str(".0");
        }
    }

    let rest = &version_str[numeric_parts.end()..];
    transformed_version_str.push_str(rest);

    semver::Version::parse(&transformed_version_str).ok()
}

/// A value resolved from the user side of a condition: either a single scalar
/// or an array of scalars. Arrays match with OR semantics over their elements.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UserValue {
    /// An array of scalar values.
    Array(Vec<HackleValue>),
    /// A single scalar value.
    Single(HackleValue),
}

impl From<HackleValue> for UserValue {
    fn from(value: HackleValue) -> UserValue {
        UserValue::Single(value)
    }
}

impl From<&str> for UserValue {
    fn from(s: &str) -> UserValue {
        UserValue::Single(s.into())
    }
}

impl From<String> for UserValue {
    fn from(s: String) -> UserValue {
        UserValue::Single(s.into())
    }
}

impl From<f64> for UserValue {
    fn from(f: f64) -> UserValue {
        UserValue::Single(f.into())
    }
}

impl From<i64> for UserValue {
    fn from(i: i64) -> UserValue {
        UserValue::Single(i.into())
    }
}

impl From<bool> for UserValue {
    fn from(b: bool) -> UserValue {
        UserValue::Single(b.into())
    }
}

impl From<Vec<HackleValue>> for UserValue {
    fn from(values: Vec<HackleValue>) -> UserValue {
        UserValue::Array(values)
    }
}
