//! Typed access to tool call arguments.

use crate::error::EncoreError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    /// Wrap raw arguments.
    ///
    /// Some models send arguments as a JSON-encoded string; those are decoded
    /// here so tools always see an object. An empty string becomes `{}`.
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(trimmed).unwrap_or(serde_json::Value::String(raw))
                }
            }
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, EncoreError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| EncoreError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, EncoreError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| EncoreError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a float argument. Integers are accepted.
    pub fn get_f64(&self, key: &str) -> Result<f64, EncoreError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| EncoreError::InvalidArgument(format!("Missing number argument: {key}")))
    }

    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        self.value.get(key).and_then(|v| v.as_bool())
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, EncoreError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            EncoreError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
