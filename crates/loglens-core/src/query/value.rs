use std::cmp::Ordering;

use serde::ser::{Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Scalar produced by SLAQ evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Time(OffsetDateTime),
    Bool(bool),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view when the value "looks numeric": ints, floats, bools,
    /// and strings that parse as a number.
    pub(crate) fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(v) => Some(f64::from(u8::from(*v))),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            Value::Time(_) | Value::Null => None,
        }
    }

    /// Boolean view used by WHERE/HAVING: only `true` passes a filter.
    pub(crate) fn truthy(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Stable text rendering used for output, string comparison, and
    /// group keys.
    pub fn render(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    format!("{v:.1}")
                } else {
                    format!("{v}")
                }
            }
            Value::Str(s) => s.clone(),
            Value::Time(t) => t
                .format(&Rfc3339)
                .unwrap_or_else(|_| "invalid-time".to_string()),
            Value::Bool(v) => v.to_string(),
            Value::Null => "null".to_string(),
        }
    }

    /// Ordering used by comparisons and MIN/MAX/ORDER BY.
    ///
    /// Same-type values compare natively; mismatched types coerce to
    /// numbers when both sides look numeric, otherwise they compare by
    /// string rendering. Null never compares (`None`).
    pub(crate) fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Some(a.total_cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => match (self.as_numeric(), other.as_numeric()) {
                (Some(a), Some(b)) => Some(a.total_cmp(&b)),
                _ => Some(self.render().cmp(&other.render())),
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Time(_) => serializer.serialize_str(&self.render()),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Null => serializer.serialize_none(),
        }
    }
}
