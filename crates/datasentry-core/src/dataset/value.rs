//! Cell values and column kinds of a [`Dataset`](super::Dataset).

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::fmt;

use crate::utils;

/// A single normalized cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Str(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Strings are parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Str(s) => utils::parse_float(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Hashable identity used for grouping, joins and duplicate checks.
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int(v) => ValueKey::Int(*v),
            Value::Float(v) => {
                if v.fract() == 0.0 && v.abs() < 9.0e15 {
                    ValueKey::Int(*v as i64)
                } else {
                    ValueKey::Float(v.to_bits())
                }
            }
            Value::Timestamp(ts) => ValueKey::Timestamp(ts.and_utc().timestamp_micros()),
            Value::Str(s) => ValueKey::Str(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Value::Str(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            Value::Float(_) | Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Timestamp(_) => serializer.collect_str(self),
            Value::Str(s) => serializer.serialize_str(s),
        }
    }
}

/// Hashable, totally ordered identity of a [`Value`].
///
/// Integral floats share the integer key, so `2` and `2.0` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Timestamp(i64),
    Str(String),
}

/// Storage kind of a column after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Text,
    /// Every cell is missing.
    Empty,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::Text => "string",
            ColumnKind::Empty => "empty",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize raw cells and settle the column kind.
///
/// Null markers and NaN become [`Value::Null`]. A text column whose
/// remaining cells all parse as integers (or floats) is re-typed, so a
/// numeric column carrying `"NULL"` strings ends up identical to one with
/// real missing cells. Any other mix of kinds falls back to text.
pub(crate) fn normalize(values: Vec<Value>) -> (ColumnKind, Vec<Value>) {
    let values: Vec<Value> = values
        .into_iter()
        .map(|v| match v {
            Value::Str(s) if utils::is_null_marker(&s) => Value::Null,
            Value::Float(f) if f.is_nan() => Value::Null,
            other => other,
        })
        .collect();

    let mut ints = 0usize;
    let mut floats = 0usize;
    let mut bools = 0usize;
    let mut stamps = 0usize;
    let mut strings = 0usize;
    for v in &values {
        match v {
            Value::Int(_) => ints += 1,
            Value::Float(_) => floats += 1,
            Value::Bool(_) => bools += 1,
            Value::Timestamp(_) => stamps += 1,
            Value::Str(_) => strings += 1,
            Value::Null => {}
        }
    }
    let non_null = ints + floats + bools + stamps + strings;

    if non_null == 0 {
        return (ColumnKind::Empty, values);
    }
    if ints == non_null {
        return (ColumnKind::Integer, values);
    }
    if ints + floats == non_null {
        return (ColumnKind::Float, to_floats(values));
    }
    if bools == non_null {
        return (ColumnKind::Boolean, values);
    }
    if stamps == non_null {
        return (ColumnKind::Timestamp, values);
    }
    if strings == non_null {
        let all_int = values
            .iter()
            .filter_map(Value::as_str)
            .all(|s| utils::parse_int(s).is_some());
        let all_float = values
            .iter()
            .filter_map(Value::as_str)
            .all(|s| utils::parse_float(s).is_some());
        if all_int {
            let ints = values
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => utils::parse_int(&s).map_or(Value::Null, Value::Int),
                    other => other,
                })
                .collect();
            return (ColumnKind::Integer, ints);
        }
        if all_float {
            let floats = values
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => utils::parse_float(&s).map_or(Value::Null, Value::Float),
                    other => other,
                })
                .collect();
            return (ColumnKind::Float, floats);
        }
        return (ColumnKind::Text, values);
    }

    let text = values
        .into_iter()
        .map(|v| match v {
            Value::Null => Value::Null,
            Value::Str(s) => Value::Str(s),
            other => Value::Str(other.to_string()),
        })
        .collect();
    (ColumnKind::Text, text)
}

fn to_floats(values: Vec<Value>) -> Vec<Value> {
    values
        .into_iter()
        .map(|v| match v {
            Value::Int(i) => Value::Float(i as f64),
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(cells: &[&str]) -> Vec<Value> {
        cells.iter().map(|s| Value::Str(s.to_string())).collect()
    }

    #[test]
    fn test_normalize_null_markers() {
        let (kind, values) = normalize(strs(&["a", "NULL", "null", "b"]));
        assert_eq!(kind, ColumnKind::Text);
        assert!(values[1].is_null());
        assert!(values[2].is_null());
    }

    #[test]
    fn test_normalize_numeric_strings() {
        let (kind, values) = normalize(strs(&["1", "NULL", "3"]));
        assert_eq!(kind, ColumnKind::Integer);
        assert_eq!(values, vec![Value::Int(1), Value::Null, Value::Int(3)]);

        let (kind, _) = normalize(strs(&["1.5", "2", "Null"]));
        assert_eq!(kind, ColumnKind::Float);
    }

    #[test]
    fn test_normalize_mixed_falls_back_to_text() {
        let (kind, values) = normalize(vec![Value::Int(1), Value::Str("x".to_string())]);
        assert_eq!(kind, ColumnKind::Text);
        assert_eq!(values[0], Value::Str("1".to_string()));
    }

    #[test]
    fn test_normalize_int_float_mix() {
        let (kind, values) = normalize(vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::Float(f64::NAN),
        ]);
        assert_eq!(kind, ColumnKind::Float);
        assert_eq!(values, vec![Value::Float(1.0), Value::Float(2.5), Value::Null]);
    }

    #[test]
    fn test_all_null_is_empty() {
        let (kind, _) = normalize(vec![Value::Null, Value::Str("NULL".to_string())]);
        assert_eq!(kind, ColumnKind::Empty);
    }

    #[test]
    fn test_value_key_integral_float() {
        assert_eq!(Value::Float(2.0).key(), Value::Int(2).key());
        assert_ne!(Value::Float(2.5).key(), Value::Int(2).key());
        assert_eq!(Value::Null.key(), ValueKey::Null);
    }
}
