// src/decision.rs
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Attributes attached to a decision context. The access check never sets any.
pub type Attributes = HashMap<String, Value>;

/// A variable value as carried by a decision.
///
/// Flag variables are authored remotely and arrive in several shapes. Each
/// shape is a separate variant so callers match on it instead of probing types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    /// A JSON object variable.
    Structured(Map<String, Value>),
    /// A string variable, possibly holding encoded JSON.
    JsonString(String),
    /// A mapping built in-process rather than decoded from the wire.
    Mapping(HashMap<String, VariableValue>),
    /// A bare list of strings.
    List(Vec<String>),
    /// Numbers, booleans, null and mixed arrays.
    Other(Value),
}

impl From<Value> for VariableValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => VariableValue::Structured(map),
            Value::String(s) => VariableValue::JsonString(s),
            Value::Array(items) if items.iter().all(Value::is_string) => VariableValue::List(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            other => VariableValue::Other(other),
        }
    }
}

impl From<Vec<String>> for VariableValue {
    fn from(value: Vec<String>) -> Self {
        VariableValue::List(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::JsonString(value.to_string())
    }
}

impl<'de> Deserialize<'de> for VariableValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(VariableValue::from)
    }
}

/// The evaluated outcome of a flag for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Decision {
    pub flag_key: String,
    pub enabled: bool,
    pub variables: HashMap<String, VariableValue>,
}

impl Decision {
    /// Decision returned for a flag the datafile does not know about.
    pub fn disabled(flag_key: &str) -> Self {
        Self {
            flag_key: flag_key.to_string(),
            enabled: false,
            variables: HashMap::new(),
        }
    }

    pub fn variable(&self, key: &str) -> Option<&VariableValue> {
        self.variables.get(key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagConfig {
    pub key: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub variables: HashMap<String, VariableValue>,
}

/// The configuration payload fetched when a client starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datafile {
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub feature_flags: Vec<FlagConfig>,
}
