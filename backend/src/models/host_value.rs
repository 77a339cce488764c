//! Host value model
//!
//! The dynamic data model of the calling program: a closed recursive sum
//! over null, booleans, integers, floats, text, lists and string-keyed maps.
//! Host values have plain value semantics; they never share state with the
//! engine.
//!
//! Integers and floats are distinct variants. A number the engine considers
//! integral always comes back as [`HostValue::Int`], so `Float(2.0)` does not
//! survive a trip through the engine unchanged: it returns as `Int(2)`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A value of the host data model
///
/// Serializes to and from JSON in the natural way (`untagged`), which makes
/// test fixtures and configuration easy to write as JSON literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<HostValue>),
    Map(HashMap<String, HostValue>),
}

impl HostValue {
    /// Build a map from key/value pairs
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        HostValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(fmt::Error),
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Int(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        HostValue::Int(n as i64)
    }
}

impl From<f64> for HostValue {
    fn from(x: f64) -> Self {
        HostValue::Float(x)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Text(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Text(s)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(HostValue::Null)
    }
}

impl From<HashMap<String, HostValue>> for HostValue {
    fn from(map: HashMap<String, HostValue>) -> Self {
        HostValue::Map(map)
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => HostValue::Int(i),
                None => HostValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => HostValue::Text(s),
            Value::Array(items) => HostValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => {
                HostValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}
