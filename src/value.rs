//! Dynamic value type shared across the document model, expression sandbox,
//! and task parameter envelopes.
//!
//! CWL inputs/outputs are loosely typed (a step's input can be a scalar, a
//! list, a File/Directory object, or nested combinations of these). Rather
//! than thread `serde_json::Value` through every public boundary, we give
//! the domain its own sum type so call sites read as CWL concepts instead
//! of generic JSON shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A CWL runtime value: null, boolean, number, string, list, or map.
///
/// File and Directory objects are represented as `Value::Map` with a
/// `class` key of `"File"` or `"Directory"` per the CWL data model; there is
/// no dedicated variant because the set of recognized keys varies by
/// context (see [`crate::document::model::FileObject`] for the typed view
/// used once a value is known to be a file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the `class` field of a Map value, if any (`"File"` / `"Directory"`).
    pub fn class(&self) -> Option<&str> {
        self.as_map()?.get("class")?.as_str()
    }

    pub fn is_file(&self) -> bool {
        self.class() == Some("File")
    }

    pub fn is_directory(&self) -> bool {
        self.class() == Some("Directory")
    }

    /// JS-style truthiness used by condition (`when`) evaluation.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) => true,
            Value::Map(_) => true,
        }
    }

    pub fn map_get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Num(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_js_semantics() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Num(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("0".into()).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn json_roundtrip_preserves_shape() {
        let j = serde_json::json!({"a": [1, 2, "x"], "b": null});
        let v = Value::from_json(j.clone());
        assert_eq!(v.to_json(), j);
    }

    #[test]
    fn file_class_detection() {
        let mut m = BTreeMap::new();
        m.insert("class".to_string(), Value::Str("File".to_string()));
        m.insert("path".to_string(), Value::Str("/a/b.fa".to_string()));
        let v = Value::Map(m);
        assert!(v.is_file());
        assert!(!v.is_directory());
    }
}
