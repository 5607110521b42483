//! Recorded responses for test mode.
//!
//! A recordings file maps `"capability.operation"` to a list of entries. The
//! first entry whose `match` object is a subset of the call params answers
//! the call; an entry without `match` answers anything.
//!
//! ```json
//! {
//!   "brave-search.web_search": [
//!     { "match": { "query": "rust" }, "data": { "results": [] } },
//!     { "success": false, "error": "HTTP 503" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RecordingsError {
    #[error("Failed to read recordings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse recordings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One recorded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub matcher: Option<Value>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl Recording {
    pub fn ok(data: Value) -> Self {
        Self {
            matcher: None,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            matcher: None,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Only answer calls whose params contain `pattern`.
    pub fn when(mut self, pattern: Value) -> Self {
        self.matcher = Some(pattern);
        self
    }

    pub fn matches(&self, params: &Value) -> bool {
        self.matcher
            .as_ref()
            .is_none_or(|pattern| is_subset(pattern, params))
    }
}

/// Whether every field of `pattern` appears in `value` with an equal (or,
/// for nested objects, recursively contained) value.
pub fn is_subset(pattern: &Value, value: &Value) -> bool {
    match (pattern, value) {
        (Value::Object(p), Value::Object(v)) => p
            .iter()
            .all(|(k, pv)| v.get(k).is_some_and(|vv| is_subset(pv, vv))),
        (Value::Null, _) => true,
        _ => pattern == value,
    }
}

/// All recordings, keyed by `capability.operation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recordings {
    entries: HashMap<String, Vec<Recording>>,
}

impl Recordings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, RecordingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RecordingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, RecordingsError> {
        Ok(serde_json::from_str(raw)?)
    }

    fn key(capability: &str, operation: &str) -> String {
        format!("{capability}.{operation}")
    }

    pub fn insert(&mut self, capability: &str, operation: &str, recording: Recording) {
        self.entries
            .entry(Self::key(capability, operation))
            .or_default()
            .push(recording);
    }

    pub fn with(mut self, capability: &str, operation: &str, recording: Recording) -> Self {
        self.insert(capability, operation, recording);
        self
    }

    /// First recording for this call whose matcher accepts `params`.
    pub fn lookup(&self, capability: &str, operation: &str, params: &Value) -> Option<&Recording> {
        self.entries
            .get(&Self::key(capability, operation))?
            .iter()
            .find(|r| r.matches(params))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
