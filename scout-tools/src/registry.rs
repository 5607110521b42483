//! Capability registry: the static set of capabilities a client may call.
//!
//! Capabilities are registered once when the client is built. Availability
//! checks and operation validation both go through the registry, so an
//! unregistered capability never reaches the network.

use async_trait::async_trait;
use scout_core::error::ToolError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Trait that all capabilities must implement.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The unique name of this capability, e.g. `brave-search`.
    fn name(&self) -> &str;

    /// Operations this capability answers.
    fn operations(&self) -> &[&'static str];

    /// Perform `operation` against the real service.
    async fn invoke(&self, operation: &str, params: Value) -> Result<Value, ToolError>;
}

/// Holds every registered capability by name.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one with the same name.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Option<Arc<dyn Capability>> {
        let name = capability.name().to_string();
        debug!(capability = %name, "Registering capability");
        self.capabilities.insert(name, capability)
    }

    pub fn with(mut self, capability: Arc<dyn Capability>) -> Self {
        self.register(capability);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Whether `name` is registered and answers `operation`.
    pub fn supports(&self, name: &str, operation: &str) -> bool {
        self.capabilities
            .get(name)
            .is_some_and(|c| c.operations().contains(&operation))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
