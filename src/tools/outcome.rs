//! Tool results, declared artifacts and condensed history summaries.

use serde::{Deserialize, Serialize};

use crate::util::truncate;

/// Longest string kept verbatim when condensing a result.
const MAX_CONDENSED_STRING: usize = 160;
/// Upper bound on a condensed summary.
const MAX_CONDENSED_LEN: usize = 600;

/// A file or structured byproduct declared by a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub kind: String,
    pub path: String,
}

impl Artifact {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: "file".to_string(),
            path: path.into(),
        }
    }

    /// Payload of the `Part` event announcing this artifact.
    pub fn to_part_data(&self) -> serde_json::Value {
        serde_json::json!({ "path": self.path })
    }
}

/// Result of dispatching one tool call. Errors are data, never `Err`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub value: serde_json::Value,
    pub is_error: bool,
    pub artifacts: Vec<Artifact>,
}

impl ToolOutcome {
    /// Successful result; artifacts are extracted from the value.
    pub fn success(value: serde_json::Value) -> Self {
        let artifacts = extract_artifacts(&value);
        Self {
            value,
            is_error: false,
            artifacts,
        }
    }

    /// Structured error result `{"error": message}`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            value: serde_json::json!({ "error": message.into() }),
            is_error: true,
            artifacts: Vec::new(),
        }
    }

    /// Full-fidelity content for the current model call.
    pub fn to_content(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Token-economical summary for persisted history.
    ///
    /// Scalars survive (long strings truncated), arrays collapse to their
    /// length and nested objects to their key count.
    pub fn condense(&self) -> String {
        let condensed = match &self.value {
            serde_json::Value::Object(map) => {
                let fields = map
                    .iter()
                    .map(|(k, v)| (k.clone(), condense_value(v)))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(fields).to_string()
            }
            other => condense_value(other).to_string(),
        };
        truncate(&condensed, MAX_CONDENSED_LEN)
    }
}

fn condense_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(truncate(s, MAX_CONDENSED_STRING)),
        serde_json::Value::Array(items) => serde_json::Value::String(format!("[{} items]", items.len())),
        serde_json::Value::Object(map) => serde_json::Value::String(format!("{{{} fields}}", map.len())),
        other => other.clone(),
    }
}

/// Collect artifacts from a top-level `file_path` string or an `artifacts`
/// array of strings or `{path, kind}` objects.
pub fn extract_artifacts(value: &serde_json::Value) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    if let Some(path) = value.get("file_path").and_then(|v| v.as_str()) {
        artifacts.push(Artifact::file(path));
    }
    if let Some(items) = value.get("artifacts").and_then(|v| v.as_array()) {
        for item in items {
            match item {
                serde_json::Value::String(path) => artifacts.push(Artifact::file(path.as_str())),
                serde_json::Value::Object(obj) => {
                    if let Some(path) = obj.get("path").and_then(|v| v.as_str()) {
                        let kind = obj.get("kind").and_then(|v| v.as_str()).unwrap_or("file");
                        artifacts.push(Artifact {
                            kind: kind.to_string(),
                            path: path.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
    }
    artifacts
}
