//! Typed access to tool call arguments.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::GlimpseError;

/// Parsed arguments of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    fn missing(kind: &str, key: &str) -> GlimpseError {
        GlimpseError::InvalidArgument(format!("Missing {kind} argument: {key}"))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, GlimpseError> {
        self.get_str_opt(key).ok_or_else(|| Self::missing("string", key))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, GlimpseError> {
        self.value
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| Self::missing("integer", key))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, GlimpseError> {
        self.value
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| Self::missing("number", key))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, GlimpseError> {
        self.value
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| Self::missing("boolean", key))
    }

    /// Deserialize all arguments into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, GlimpseError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| GlimpseError::InvalidArgument(format!("Failed to deserialize arguments: {e}")))
    }
}
