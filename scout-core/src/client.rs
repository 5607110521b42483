//! Tool client abstraction.
//!
//! The pipeline talks to every external capability (search providers, the
//! fetcher, research tools) through [`ToolClient`]. The concrete client lives
//! in `scout-tools`; tests script their own.

use crate::error::ToolError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Well-known capability names.
pub mod capabilities {
    pub const BRAVE_SEARCH: &str = "brave-search";
    pub const SERPAPI: &str = "serpapi";
    pub const WEB_FETCH: &str = "web-fetch";
    pub const RESEARCH_TOOLS: &str = "research-tools";
}

/// Well-known operation names.
pub mod operations {
    pub const WEB_SEARCH: &str = "web_search";
    pub const FETCH: &str = "fetch";
    pub const EXTRACT_READABLE: &str = "extract_readable";
    pub const NORMALIZE: &str = "normalize";
    pub const QUALITY_SCORE: &str = "quality_score";
}

/// How a tool client satisfies calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Delegate to the actual service.
    Real,
    /// Deterministic synthetic data, tagged `mocked`.
    #[default]
    Mock,
    /// Fixed recorded responses, tagged `recorded`.
    Test,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Real => write!(f, "real"),
            ExecutionMode::Mock => write!(f, "mock"),
            ExecutionMode::Test => write!(f, "test"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "real" => Ok(ExecutionMode::Real),
            "mock" => Ok(ExecutionMode::Mock),
            "test" => Ok(ExecutionMode::Test),
            other => Err(format!(
                "unknown execution mode '{other}' (expected real, mock or test)"
            )),
        }
    }
}

/// Coarse classification of a failed call, so callers can tell a missing
/// capability from a flaky network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorKind {
    Unavailable,
    NotConfigured,
    InvalidRequest,
    Failed,
    Timeout,
    NoRecording,
}

impl From<&ToolError> for CallErrorKind {
    fn from(err: &ToolError) -> Self {
        match err {
            ToolError::CapabilityUnavailable { .. } => CallErrorKind::Unavailable,
            ToolError::NotConfigured { .. } => CallErrorKind::NotConfigured,
            ToolError::UnknownOperation { .. } | ToolError::InvalidArguments { .. } => {
                CallErrorKind::InvalidRequest
            }
            ToolError::CallFailed { .. } | ToolError::MalformedPayload { .. } => {
                CallErrorKind::Failed
            }
            ToolError::Timeout { .. } => CallErrorKind::Timeout,
            ToolError::NoRecording { .. } => CallErrorKind::NoRecording,
        }
    }
}

/// Uniform envelope returned by every capability call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<CallErrorKind>,
    pub capability: String,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    pub mode: ExecutionMode,
}

impl ToolCallResult {
    pub fn ok(capability: &str, operation: &str, mode: ExecutionMode, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            capability: capability.to_string(),
            operation: operation.to_string(),
            timestamp: Utc::now(),
            mode,
        }
    }

    pub fn failed(
        capability: &str,
        operation: &str,
        mode: ExecutionMode,
        kind: CallErrorKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            capability: capability.to_string(),
            operation: operation.to_string(),
            timestamp: Utc::now(),
            mode,
        }
    }

    pub fn from_error(mode: ExecutionMode, err: &ToolError) -> Self {
        let (capability, operation) = err.origin();
        Self::failed(capability, operation, mode, err.into(), err.to_string())
    }

    /// Unwrap the payload, turning a failed envelope back into a typed error.
    pub fn into_data(self) -> Result<Value, ToolError> {
        if self.success {
            return self.data.ok_or_else(|| ToolError::MalformedPayload {
                capability: self.capability.clone(),
                operation: self.operation.clone(),
                reason: "successful call carried no data".into(),
            });
        }
        let message = self
            .error
            .unwrap_or_else(|| "call failed without an error message".into());
        Err(match self.error_kind {
            Some(CallErrorKind::Unavailable) => ToolError::CapabilityUnavailable {
                capability: self.capability,
            },
            Some(CallErrorKind::NotConfigured) => ToolError::NotConfigured {
                capability: self.capability,
                hint: message,
            },
            Some(CallErrorKind::InvalidRequest) => ToolError::InvalidArguments {
                capability: self.capability,
                operation: self.operation,
                reason: message,
            },
            Some(CallErrorKind::NoRecording) => ToolError::NoRecording {
                capability: self.capability,
                operation: self.operation,
            },
            Some(CallErrorKind::Failed) | Some(CallErrorKind::Timeout) | None => {
                ToolError::CallFailed {
                    capability: self.capability,
                    operation: self.operation,
                    message,
                }
            }
        })
    }

    /// Unwrap and deserialize the payload into `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(self) -> Result<T, ToolError> {
        let capability = self.capability.clone();
        let operation = self.operation.clone();
        let data = self.into_data()?;
        serde_json::from_value(data).map_err(|e| ToolError::MalformedPayload {
            capability,
            operation,
            reason: e.to_string(),
        })
    }
}

impl ToolError {
    /// The capability and operation an error refers to, where known.
    pub fn origin(&self) -> (&str, &str) {
        let (capability, operation) = match self {
            ToolError::CapabilityUnavailable { capability }
            | ToolError::NotConfigured { capability, .. } => return (capability.as_str(), ""),
            ToolError::UnknownOperation {
                capability,
                operation,
            }
            | ToolError::InvalidArguments {
                capability,
                operation,
                ..
            }
            | ToolError::CallFailed {
                capability,
                operation,
                ..
            }
            | ToolError::Timeout {
                capability,
                operation,
                ..
            }
            | ToolError::MalformedPayload {
                capability,
                operation,
                ..
            }
            | ToolError::NoRecording {
                capability,
                operation,
            } => (capability, operation),
        };
        (capability.as_str(), operation.as_str())
    }
}

/// Calls named external capabilities and reports back in a uniform envelope.
///
/// Implementations never panic or return `Err` for a failed call: failures are
/// carried in [`ToolCallResult::error`].
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn call(&self, capability: &str, operation: &str, params: Value) -> ToolCallResult;

    /// Whether the capability is registered. Never touches the network.
    fn is_available(&self, capability: &str) -> bool;

    fn mode(&self) -> ExecutionMode;
}
