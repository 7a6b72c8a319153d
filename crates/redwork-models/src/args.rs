//! Job arguments.
//!
//! Arguments are an open mapping from string keys to JSON values. The map is
//! key-sorted, so two equal argument sets always produce the same text, which
//! the uniqueness key relies on.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A single argument value: null, bool, number, string, array or object.
pub type ArgValue = Value;

/// Errors returned by the typed argument accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("missing argument: {0}")]
    Missing(String),

    #[error("argument {key} is not a {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Key-sorted argument map attached to a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Args(Map<String, Value>);

impl Args {
    /// Create an empty argument map.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    ///
    /// ```
    /// use redwork_models::Args;
    ///
    /// let args = Args::new().with("addr", "a@b.com").with("retries", 3);
    /// assert_eq!(args.len(), 2);
    /// ```
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, returning the previous one if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Build arguments from any serializable value that encodes to a JSON object.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(serde::ser::Error::custom(format!(
                "job arguments must encode to an object, got {}",
                value_kind(&other)
            ))),
        }
    }

    /// Compact, key-sorted JSON text of the arguments.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn require(&self, key: &str) -> Result<&Value, ArgError> {
        self.0
            .get(key)
            .ok_or_else(|| ArgError::Missing(key.to_string()))
    }

    pub fn string(&self, key: &str) -> Result<&str, ArgError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| wrong_type(key, "string"))
    }

    /// Integer argument. Floats without a fractional part are accepted,
    /// since some decoders widen every JSON number to a float.
    pub fn i64(&self, key: &str) -> Result<i64, ArgError> {
        let value = self.require(key)?;
        if let Some(n) = value.as_i64() {
            return Ok(n);
        }
        match value.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Ok(f as i64)
            }
            _ => Err(wrong_type(key, "integer")),
        }
    }

    pub fn f64(&self, key: &str) -> Result<f64, ArgError> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| wrong_type(key, "number"))
    }

    pub fn bool(&self, key: &str) -> Result<bool, ArgError> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| wrong_type(key, "bool"))
    }
}

// Producers in other languages write `"args": null` for a job without arguments.
impl<'de> Deserialize<'de> for Args {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Option::<Map<String, Value>>::deserialize(deserializer)?;
        Ok(Self(map.unwrap_or_default()))
    }
}

impl From<Map<String, Value>> for Args {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn wrong_type(key: &str, expected: &'static str) -> ArgError {
    ArgError::WrongType {
        key: key.to_string(),
        expected,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
