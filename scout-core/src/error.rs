//! Error types for the Scout research pipeline.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering input validation, tool invocation, stage execution, configuration,
//! and pipeline state domains.

use crate::types::StageKind;
use std::fmt;

/// Top-level error type for the Scout core library.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScoutError {
    /// Whether a mandatory stage may try again after this error.
    ///
    /// Input, configuration and capability-availability problems will not go
    /// away on their own and end the retry loop immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoutError::Validation(_) | ScoutError::Config(_) | ScoutError::Pipeline(_) => false,
            ScoutError::Serialization(_) => false,
            ScoutError::Tool(e) => e.is_retryable(),
            ScoutError::Stage(e) => e.is_retryable(),
            ScoutError::Io(_) => true,
        }
    }
}

/// Malformed topic or research options, rejected before any stage runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Research topic must not be empty")]
    EmptyTopic,

    #[error("Research topic is too long: {len} characters (max {max})")]
    TopicTooLong { len: usize, max: usize },

    #[error("At least one search language is required")]
    NoLanguages,

    #[error("Unsupported search language: {lang}")]
    UnsupportedLanguage { lang: String },

    #[error("Search depth {depth} is out of range ({min}-{max})")]
    DepthOutOfRange { depth: u8, min: u8, max: u8 },

    #[error("Invalid since date '{value}', expected YYYY-MM-DD")]
    InvalidSince { value: String },

    #[error("Cannot enrich more than {max} sources (requested {requested})")]
    TooManySources { requested: usize, max: usize },
}

/// Errors from calling external capabilities through a tool client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("Capability '{capability}' is not registered")]
    CapabilityUnavailable { capability: String },

    #[error("Capability '{capability}' is not configured: {hint}")]
    NotConfigured { capability: String, hint: String },

    #[error("Capability '{capability}' does not support operation '{operation}'")]
    UnknownOperation {
        capability: String,
        operation: String,
    },

    #[error("Invalid arguments for '{capability}.{operation}': {reason}")]
    InvalidArguments {
        capability: String,
        operation: String,
        reason: String,
    },

    #[error("'{capability}.{operation}' failed: {message}")]
    CallFailed {
        capability: String,
        operation: String,
        message: String,
    },

    #[error("'{capability}.{operation}' timed out after {timeout_secs}s")]
    Timeout {
        capability: String,
        operation: String,
        timeout_secs: u64,
    },

    #[error("'{capability}.{operation}' returned a malformed payload: {reason}")]
    MalformedPayload {
        capability: String,
        operation: String,
        reason: String,
    },

    #[error("No recorded response for '{capability}.{operation}'")]
    NoRecording {
        capability: String,
        operation: String,
    },
}

impl ToolError {
    /// Transient failures (network, timeouts) may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolError::CallFailed { .. } | ToolError::Timeout { .. }
        )
    }
}

/// Why a single search provider could not serve a query.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The provider's capability is not registered with the client.
    Unavailable,
    /// The provider is registered but not usable (missing credentials, no recording).
    NotConfigured(String),
    /// The call was attempted and failed; may succeed later.
    Transient(String),
    /// The provider answered with something that is not a hit list.
    Malformed(String),
    /// The provider answered with zero usable hits.
    Empty,
}

/// One provider's failure for one query, collected for the aggregate error.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub query: String,
    pub reason: FailureReason,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FailureReason::Unavailable => {
                write!(f, "{} unavailable for \"{}\"", self.provider, self.query)
            }
            FailureReason::NotConfigured(hint) => {
                write!(f, "{} not configured ({})", self.provider, hint)
            }
            FailureReason::Transient(msg) => {
                write!(f, "{} failed for \"{}\": {}", self.provider, self.query, msg)
            }
            FailureReason::Malformed(msg) => write!(
                f,
                "{} returned malformed results for \"{}\": {}",
                self.provider, self.query, msg
            ),
            FailureReason::Empty => {
                write!(f, "{} returned no results for \"{}\"", self.provider, self.query)
            }
        }
    }
}

/// Errors raised by a pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(
        "No search provider available: providers unavailable or empty for all {queries} queries (tried: {}){}",
        .providers.join(", "),
        summarize_failures(.failures)
    )]
    ProvidersExhausted {
        providers: Vec<String>,
        queries: usize,
        failures: Vec<ProviderFailure>,
    },

    #[error("Stage '{stage}' failed after {attempts} attempt(s): {source}")]
    Exhausted {
        stage: StageKind,
        attempts: u32,
        source: Box<ScoutError>,
    },

    #[error("Stage '{stage}' failed: {message}")]
    Failed { stage: StageKind, message: String },
}

impl StageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::ProvidersExhausted { failures, .. } => failures
                .iter()
                .any(|f| matches!(f.reason, FailureReason::Transient(_))),
            StageError::Exhausted { .. } => false,
            StageError::Failed { .. } => true,
        }
    }
}

fn summarize_failures(failures: &[ProviderFailure]) -> String {
    const SHOWN: usize = 4;
    if failures.is_empty() {
        return String::new();
    }
    let mut out = String::from("; ");
    let shown: Vec<String> = failures.iter().take(SHOWN).map(|f| f.to_string()).collect();
    out.push_str(&shown.join("; "));
    if failures.len() > SHOWN {
        out.push_str(&format!("; and {} more", failures.len() - SHOWN));
    }
    out
}

/// Errors from the configuration system.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the orchestrator's own bookkeeping.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Stage '{stage}' produced an artifact of kind '{produced}'")]
    UnexpectedArtifact { stage: StageKind, produced: StageKind },

    #[error("Stage '{stage}' requires the {artifact} artifact, which is missing")]
    MissingArtifact {
        stage: StageKind,
        artifact: &'static str,
    },
}

/// A type alias for results using the top-level `ScoutError`.
pub type Result<T> = std::result::Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = ScoutError::Validation(ValidationError::DepthOutOfRange {
            depth: 9,
            min: 1,
            max: 5,
        });
        assert_eq!(
            err.to_string(),
            "Validation error: Search depth 9 is out of range (1-5)"
        );
    }

    #[test]
    fn test_error_display_tool() {
        let err = ScoutError::Tool(ToolError::CapabilityUnavailable {
            capability: "bing".into(),
        });
        assert_eq!(
            err.to_string(),
            "Tool error: Capability 'bing' is not registered"
        );
    }

    #[test]
    fn test_providers_exhausted_names_providers() {
        let err = StageError::ProvidersExhausted {
            providers: vec!["brave-search".into(), "serpapi".into()],
            queries: 2,
            failures: vec![
                ProviderFailure {
                    provider: "brave-search".into(),
                    query: "rust".into(),
                    reason: FailureReason::Empty,
                },
                ProviderFailure {
                    provider: "serpapi".into(),
                    query: "rust".into(),
                    reason: FailureReason::Unavailable,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("No search provider available"));
        assert!(msg.contains("providers unavailable"));
        assert!(msg.contains("brave-search, serpapi"));
        assert!(msg.contains("serpapi unavailable for \"rust\""));
    }

    #[test]
    fn test_failure_summary_is_capped() {
        let failures: Vec<ProviderFailure> = (0..6)
            .map(|i| ProviderFailure {
                provider: "p".into(),
                query: format!("q{i}"),
                reason: FailureReason::Empty,
            })
            .collect();
        let summary = summarize_failures(&failures);
        assert!(summary.ends_with("and 2 more"));
    }

    #[test]
    fn test_exhausted_wraps_stage_and_cause() {
        let err = StageError::Exhausted {
            stage: StageKind::Search,
            attempts: 2,
            source: Box::new(ScoutError::Tool(ToolError::CallFailed {
                capability: "serpapi".into(),
                operation: "web_search".into(),
                message: "HTTP 503".into(),
            })),
        };
        assert_eq!(
            err.to_string(),
            "Stage 'search' failed after 2 attempt(s): Tool error: 'serpapi.web_search' failed: HTTP 503"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(!ScoutError::Validation(ValidationError::EmptyTopic).is_retryable());
        assert!(
            !ScoutError::Tool(ToolError::CapabilityUnavailable {
                capability: "x".into()
            })
            .is_retryable()
        );
        assert!(
            ScoutError::Tool(ToolError::Timeout {
                capability: "x".into(),
                operation: "y".into(),
                timeout_secs: 5,
            })
            .is_retryable()
        );

        let empty_only = StageError::ProvidersExhausted {
            providers: vec!["a".into()],
            queries: 1,
            failures: vec![ProviderFailure {
                provider: "a".into(),
                query: "q".into(),
                reason: FailureReason::Empty,
            }],
        };
        assert!(!empty_only.is_retryable());

        let transient = StageError::ProvidersExhausted {
            providers: vec!["a".into()],
            queries: 1,
            failures: vec![ProviderFailure {
                provider: "a".into(),
                query: "q".into(),
                reason: FailureReason::Transient("reset".into()),
            }],
        };
        assert!(transient.is_retryable());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ScoutError = io_err.into();
        assert!(matches!(err, ScoutError::Io(_)));
        assert!(err.is_retryable());
    }
}
