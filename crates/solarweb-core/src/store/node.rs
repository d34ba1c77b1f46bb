// ── Node descriptors and scalar values ──

use std::fmt;

use serde::Serialize;
use serde_json::{Number, Value};
use strum::{Display, EnumString};

/// Scalar type of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScalarType {
    Boolean,
    Number,
    Text,
}

/// A typed leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::Boolean,
            Self::Number(_) => ScalarType::Number,
            Self::Text(_) => ScalarType::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON scalar. Objects, arrays and `null` yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            // Every finite JSON number fits an f64 (possibly rounded).
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Container or leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Container,
    Leaf,
}

/// What to create when a node does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub label: String,
    /// Set for leaves.
    pub scalar_type: Option<ScalarType>,
    /// Whether external writers may set the value (command leaves).
    pub writable: bool,
}

impl NodeSpec {
    pub fn container(label: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Container,
            label: label.into(),
            scalar_type: None,
            writable: false,
        }
    }

    pub fn leaf(label: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            kind: NodeKind::Leaf,
            label: label.into(),
            scalar_type: Some(scalar_type),
            writable: false,
        }
    }

    #[must_use]
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_keep_native_type() {
        assert_eq!(ScalarValue::from_json(&json!(1234.5)), Some(ScalarValue::Number(1234.5)));
        assert_eq!(ScalarValue::from_json(&json!(7)), Some(ScalarValue::Number(7.0)));
        assert_eq!(ScalarValue::from_json(&json!("OK")), Some(ScalarValue::Text("OK".into())));
        assert_eq!(ScalarValue::from_json(&json!(false)), Some(ScalarValue::Bool(false)));
        assert_eq!(ScalarValue::from_json(&json!(null)), None);
        assert_eq!(ScalarValue::from_json(&json!({})), None);
    }

    #[test]
    fn scalar_type_names() {
        assert_eq!(ScalarType::Boolean.to_string(), "boolean");
        assert_eq!(ScalarValue::from("x").scalar_type(), ScalarType::Text);
        assert_eq!(NodeKind::Container.to_string(), "container");
    }
}
