//! Declared property values

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A plain property value as produced by the descriptor source
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float; integers widen
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get as map
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// Kind of a reference slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// The referencing object owns the target's lifetime
    Embed,
    /// The referencing object only uses the target
    Link,
}

/// One declared property: a plain value or references by identifier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    /// Plain data
    Value(Value),
    /// Owning reference to an object declared in the same batch
    Embed(String),
    /// Aliasing reference
    Link(String),
    /// Ordered list of aliasing references
    Links(Vec<String>),
}

impl Property {
    /// Reference targets in slot order, with their kind
    pub fn targets(&self) -> Vec<(RefKind, &str)> {
        match self {
            Property::Value(_) => Vec::new(),
            Property::Embed(target) => vec![(RefKind::Embed, target.as_str())],
            Property::Link(target) => vec![(RefKind::Link, target.as_str())],
            Property::Links(targets) => targets.iter().map(|t| (RefKind::Link, t.as_str())).collect(),
        }
    }

    /// Whether this property is a reference of any kind
    pub fn is_reference(&self) -> bool {
        !matches!(self, Property::Value(_))
    }
}

impl From<Value> for Property {
    fn from(v: Value) -> Self {
        Property::Value(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from(3).as_f64(), Some(3.0));
        assert_eq!(Value::from("a").as_str(), Some("a"));
        assert_eq!(Value::from(true).as_i64(), None);
        assert!(Value::default().is_null());
    }

    #[test]
    fn test_property_json_shape() {
        let props: BTreeMap<String, Property> = serde_json::from_str(
            r#"{ "size": { "value": 4 }, "mesh": { "link": "cube" }, "lights": { "links": ["a", "b"] } }"#,
        )
        .unwrap();

        assert_eq!(props["size"], Property::Value(Value::Int(4)));
        assert_eq!(props["mesh"].targets(), vec![(RefKind::Link, "cube")]);
        assert_eq!(props["lights"].targets().len(), 2);
    }
}
