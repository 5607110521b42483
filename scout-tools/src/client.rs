//! The invocation client: one [`ToolClient`] for all three execution modes.
//!
//! Availability is decided by the [`CapabilityRegistry`] alone. A call to an
//! unregistered capability, or an operation the capability does not list,
//! fails without doing anything else. Every accepted call runs under the
//! configured timeout.

use crate::fetch::WebFetch;
use crate::mock;
use crate::recordings::{Recordings, RecordingsError};
use crate::registry::CapabilityRegistry;
use crate::research_tools::ResearchTools;
use crate::search::{BraveSearch, SerpApiSearch};
use async_trait::async_trait;
use chrono::Utc;
use scout_core::client::{ExecutionMode, ToolCallResult, ToolClient};
use scout_core::config::ScoutConfig;
use scout_core::error::{ConfigError, ToolError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Register every built-in capability.
pub fn default_registry(config: &ScoutConfig) -> Result<CapabilityRegistry, ToolError> {
    let brave = BraveSearch::from_config(&config.tools)?;
    let serpapi = SerpApiSearch::from_config(&config.tools)?;
    if config.tools.mode == ExecutionMode::Real {
        if !brave.is_configured() {
            warn!("brave-search has no usable API key; its calls will fail");
        }
        if !serpapi.is_configured() {
            warn!("serpapi has no usable API key; its calls will fail");
        }
    }
    Ok(CapabilityRegistry::new()
        .with(Arc::new(brave))
        .with(Arc::new(serpapi))
        .with(Arc::new(WebFetch::from_config(&config.tools)?))
        .with(Arc::new(ResearchTools::from_config(&config.enrichment))))
}

/// Dispatches capability calls according to its [`ExecutionMode`].
pub struct InvocationClient {
    mode: ExecutionMode,
    registry: CapabilityRegistry,
    recordings: Recordings,
    research_tools: ResearchTools,
    timeout: Duration,
}

impl InvocationClient {
    pub fn new(mode: ExecutionMode, registry: CapabilityRegistry) -> Self {
        Self {
            mode,
            registry,
            recordings: Recordings::new(),
            research_tools: ResearchTools::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// The standard client for a configuration: built-in capabilities, the
    /// configured mode and timeout, and recordings loaded for test mode.
    pub fn from_config(config: &ScoutConfig) -> scout_core::Result<Self> {
        let registry = default_registry(config)?;
        let mut client = Self::new(config.tools.mode, registry)
            .with_timeout(config.tools.call_timeout())
            .with_research_tools(ResearchTools::from_config(&config.enrichment));

        if config.tools.mode == ExecutionMode::Test {
            let path = config
                .tools
                .recordings_path
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField {
                    field: "tools.recordings_path".into(),
                })?;
            let recordings = Recordings::load(path).map_err(|e| match e {
                RecordingsError::Read { .. } => ConfigError::Invalid {
                    message: e.to_string(),
                },
                RecordingsError::Parse(_) => ConfigError::ParseError {
                    message: e.to_string(),
                },
            })?;
            info!(path = %path.display(), entries = recordings.len(), "Loaded tool recordings");
            client = client.with_recordings(recordings);
        }
        info!(mode = %client.mode, capabilities = ?client.registry.names(), "Tool client ready");
        Ok(client)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_recordings(mut self, recordings: Recordings) -> Self {
        self.recordings = recordings;
        self
    }

    pub fn with_research_tools(mut self, tools: ResearchTools) -> Self {
        self.research_tools = tools;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    async fn dispatch(&self, capability: &str, operation: &str, params: Value) -> Result<Value, ToolError> {
        match self.mode {
            ExecutionMode::Real => {
                let target = self.registry.get(capability).ok_or_else(|| {
                    ToolError::CapabilityUnavailable {
                        capability: capability.to_string(),
                    }
                })?;
                target.invoke(operation, params).await
            }
            ExecutionMode::Mock => {
                let data = mock::respond(capability, operation, &params, &self.research_tools, Utc::now())?;
                Ok(tag(data, "mocked"))
            }
            ExecutionMode::Test => {
                let recording = self
                    .recordings
                    .lookup(capability, operation, &params)
                    .ok_or_else(|| ToolError::NoRecording {
                        capability: capability.to_string(),
                        operation: operation.to_string(),
                    })?;
                if !recording.success {
                    return Err(ToolError::CallFailed {
                        capability: capability.to_string(),
                        operation: operation.to_string(),
                        message: recording
                            .error
                            .clone()
                            .unwrap_or_else(|| "recorded failure".into()),
                    });
                }
                let data = recording.data.clone().unwrap_or(Value::Object(Default::default()));
                Ok(tag(data, "recorded"))
            }
        }
    }
}

/// Mark an object payload with `marker: true`. Non-objects pass through.
fn tag(mut data: Value, marker: &str) -> Value {
    if let Value::Object(map) = &mut data {
        map.insert(marker.to_string(), Value::Bool(true));
    }
    data
}

#[async_trait]
impl ToolClient for InvocationClient {
    async fn call(&self, capability: &str, operation: &str, params: Value) -> ToolCallResult {
        if !self.registry.contains(capability) {
            debug!(capability, operation, "Capability not registered");
            return ToolCallResult::from_error(
                self.mode,
                &ToolError::CapabilityUnavailable {
                    capability: capability.to_string(),
                },
            );
        }
        if !self.registry.supports(capability, operation) {
            return ToolCallResult::from_error(
                self.mode,
                &ToolError::UnknownOperation {
                    capability: capability.to_string(),
                    operation: operation.to_string(),
                },
            );
        }

        debug!(capability, operation, mode = %self.mode, "Calling capability");
        let outcome = match tokio::time::timeout(self.timeout, self.dispatch(capability, operation, params)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                capability: capability.to_string(),
                operation: operation.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(data) => ToolCallResult::ok(capability, operation, self.mode, data),
            Err(e) => {
                debug!(capability, operation, error = %e, "Capability call failed");
                ToolCallResult::from_error(self.mode, &e)
            }
        }
    }

    fn is_available(&self, capability: &str) -> bool {
        self.registry.contains(capability)
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recordings::Recording;
    use crate::registry::Capability;
    use scout_core::client::{CallErrorKind, capabilities, operations};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations and sleeps for a configurable time.
    struct Probe {
        name: &'static str,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Probe {
        fn new(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl Capability for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn operations(&self) -> &[&'static str] {
            &[operations::WEB_SEARCH]
        }

        async fn invoke(&self, _operation: &str, params: Value) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(json!({ "results": [], "echo": params }))
        }
    }

    fn registry_with(probe: Arc<Probe>) -> CapabilityRegistry {
        CapabilityRegistry::new().with(probe)
    }

    #[tokio::test]
    async fn test_unregistered_capability_fails_without_dispatch() {
        let probe = Probe::new(capabilities::BRAVE_SEARCH, Duration::ZERO);
        let client = InvocationClient::new(ExecutionMode::Real, registry_with(probe.clone()));

        let result = client.call("qdrant", "search", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(CallErrorKind::Unavailable));
        assert_eq!(result.capability, "qdrant");
        assert!(!client.is_available("qdrant"));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_rejected() {
        let probe = Probe::new(capabilities::BRAVE_SEARCH, Duration::ZERO);
        let client = InvocationClient::new(ExecutionMode::Real, registry_with(probe.clone()));

        let result = client.call(capabilities::BRAVE_SEARCH, "image_search", json!({})).await;
        assert_eq!(result.error_kind, Some(CallErrorKind::InvalidRequest));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_real_mode_delegates() {
        let probe = Probe::new(capabilities::BRAVE_SEARCH, Duration::ZERO);
        let client = InvocationClient::new(ExecutionMode::Real, registry_with(probe.clone()));

        let result = client
            .call(capabilities::BRAVE_SEARCH, operations::WEB_SEARCH, json!({"query": "rust"}))
            .await;
        assert!(result.success);
        assert_eq!(result.mode, ExecutionMode::Real);
        let data = result.into_data().unwrap();
        assert_eq!(data["echo"]["query"], "rust");
        assert!(data.get("mocked").is_none());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failed_call() {
        let probe = Probe::new(capabilities::BRAVE_SEARCH, Duration::from_secs(60));
        let client = InvocationClient::new(ExecutionMode::Real, registry_with(probe))
            .with_timeout(Duration::from_secs(2));

        let result = client
            .call(capabilities::BRAVE_SEARCH, operations::WEB_SEARCH, json!({"query": "rust"}))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(CallErrorKind::Timeout));
        assert!(result.error.unwrap().contains("timed out after 2s"));
    }

    #[tokio::test]
    async fn test_mock_mode_tags_and_never_invokes() {
        let probe = Probe::new(capabilities::BRAVE_SEARCH, Duration::ZERO);
        let client = InvocationClient::new(ExecutionMode::Mock, registry_with(probe.clone()));

        let result = client
            .call(capabilities::BRAVE_SEARCH, operations::WEB_SEARCH, json!({"query": "rust", "count": 2}))
            .await;
        assert!(result.success);
        assert_eq!(result.mode, ExecutionMode::Mock);
        let data = result.into_data().unwrap();
        assert_eq!(data["mocked"], true);
        assert_eq!(data["results"].as_array().unwrap().len(), 2);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_test_mode_uses_recordings() {
        let probe = Probe::new(capabilities::SERPAPI, Duration::ZERO);
        let recordings = Recordings::new()
            .with(
                capabilities::SERPAPI,
                operations::WEB_SEARCH,
                Recording::ok(json!({"results": [{"title": "Rust", "url": "https://rust-lang.org"}]}))
                    .when(json!({"query": "rust"})),
            )
            .with(capabilities::SERPAPI, operations::WEB_SEARCH, Recording::failed("HTTP 503").when(json!({"query": "flaky"})));
        let client = InvocationClient::new(ExecutionMode::Test, registry_with(probe.clone()))
            .with_recordings(recordings);

        let ok = client
            .call(capabilities::SERPAPI, operations::WEB_SEARCH, json!({"query": "rust"}))
            .await;
        assert!(ok.success);
        let data = ok.into_data().unwrap();
        assert_eq!(data["recorded"], true);
        assert_eq!(data["results"][0]["url"], "https://rust-lang.org");

        let failed = client
            .call(capabilities::SERPAPI, operations::WEB_SEARCH, json!({"query": "flaky"}))
            .await;
        assert_eq!(failed.error_kind, Some(CallErrorKind::Failed));
        assert!(failed.error.unwrap().contains("HTTP 503"));

        let missing = client
            .call(capabilities::SERPAPI, operations::WEB_SEARCH, json!({"query": "go"}))
            .await;
        assert_eq!(missing.error_kind, Some(CallErrorKind::NoRecording));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_tag_only_objects() {
        assert_eq!(tag(json!({"a": 1}), "mocked"), json!({"a": 1, "mocked": true}));
        assert_eq!(tag(json!([1]), "mocked"), json!([1]));
    }

    #[test]
    fn test_default_registry_has_builtin_capabilities() {
        let registry = default_registry(&ScoutConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec!["brave-search", "research-tools", "serpapi", "web-fetch"]
        );
        assert!(registry.supports(capabilities::RESEARCH_TOOLS, operations::QUALITY_SCORE));
        assert!(registry.supports(capabilities::WEB_FETCH, operations::FETCH));
    }

    #[test]
    fn test_from_config_test_mode_requires_recordings() {
        let mut config = ScoutConfig::default();
        config.tools.mode = ExecutionMode::Test;
        let err = InvocationClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("tools.recordings_path"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.json");
        std::fs::write(&path, "{}").unwrap();
        config.tools.recordings_path = Some(path);
        let client = InvocationClient::from_config(&config).unwrap();
        assert_eq!(client.mode(), ExecutionMode::Test);
    }
}
