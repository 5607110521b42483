//! Configuration system for Scout.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config -> environment variables -> explicit overrides.

use crate::client::{ExecutionMode, capabilities, operations};
use crate::error::ConfigError;
use crate::types::{ResearchOptions, StageKind};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoutConfig {
    /// Research options used when the caller does not override them.
    #[serde(default)]
    pub defaults: ResearchOptions,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ScoutConfig {
    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.providers.is_empty() {
            return Err(ConfigError::Invalid {
                message: "search.providers must list at least one provider".into(),
            });
        }
        for (name, policy) in [
            ("plan", &self.pipeline.retry.plan),
            ("search", &self.pipeline.retry.search),
            ("report", &self.pipeline.retry.report),
        ] {
            if policy.max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    message: format!("pipeline.retry.{name}.max_attempts must be at least 1"),
                });
            }
        }
        if self.tools.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "tools.call_timeout_secs must be positive".into(),
            });
        }
        if self.tools.mode == ExecutionMode::Test && self.tools.recordings_path.is_none() {
            return Err(ConfigError::MissingField {
                field: "tools.recordings_path".into(),
            });
        }
        Ok(())
    }
}

/// Linear retry policy for a mandatory stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before retry `n` is `base_delay_ms * n`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Per-stage retry policies. Enrichment degrades instead of retrying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageRetryConfig {
    #[serde(default)]
    pub plan: RetryPolicy,
    #[serde(default)]
    pub search: RetryPolicy,
    #[serde(default)]
    pub report: RetryPolicy,
}

impl StageRetryConfig {
    /// The same policy for every mandatory stage.
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            plan: policy.clone(),
            search: policy.clone(),
            report: policy,
        }
    }

    pub fn for_stage(&self, stage: StageKind) -> Option<&RetryPolicy> {
        match stage {
            StageKind::Plan => Some(&self.plan),
            StageKind::Search => Some(&self.search),
            StageKind::Write => Some(&self.report),
            StageKind::Enrich => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub retry: StageRetryConfig,
}

/// A search provider in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Tag recorded on every candidate this provider returns.
    pub name: String,
    pub capability: String,
    #[serde(default = "default_search_operation")]
    pub operation: String,
}

fn default_search_operation() -> String {
    operations::WEB_SEARCH.to_string()
}

impl ProviderDescriptor {
    pub fn new(capability: &str) -> Self {
        Self {
            name: capability.to_string(),
            capability: capability.to_string(),
            operation: default_search_operation(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Providers in priority order.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderDescriptor>,
    #[serde(default = "default_results_per_depth")]
    pub results_per_depth: usize,
    #[serde(default = "default_max_results")]
    pub max_results_per_query: usize,
    /// Pause between consecutive queries.
    #[serde(default = "default_query_delay_ms")]
    pub query_delay_ms: u64,
}

fn default_providers() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor::new(capabilities::BRAVE_SEARCH),
        ProviderDescriptor::new(capabilities::SERPAPI),
    ]
}

fn default_results_per_depth() -> usize {
    5
}

fn default_max_results() -> usize {
    20
}

fn default_query_delay_ms() -> u64 {
    1000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            results_per_depth: default_results_per_depth(),
            max_results_per_query: default_max_results(),
            query_delay_ms: default_query_delay_ms(),
        }
    }
}

impl SearchConfig {
    /// Hits requested per query for a given depth.
    pub fn result_count(&self, depth: u8) -> usize {
        (usize::from(depth) * self.results_per_depth).min(self.max_results_per_query)
    }
}

pub const MAX_ENRICH_CONCURRENCY: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Sources enriched per run unless the run overrides it.
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    /// Minimum spacing between consecutive fetch starts.
    #[serde(default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_authority_boost")]
    pub authority_boost: f64,
    #[serde(default = "default_marketing_penalty")]
    pub marketing_penalty: f64,
    /// Host suffixes treated as authoritative, matched on label boundaries.
    #[serde(default = "default_authority_domains")]
    pub authority_domains: Vec<String>,
    /// Case-insensitive title substrings that mark promotional content.
    #[serde(default = "default_marketing_terms")]
    pub marketing_terms: Vec<String>,
}

fn default_max_sources() -> usize {
    5
}

fn default_fetch_delay_ms() -> u64 {
    1000
}

fn default_concurrency() -> usize {
    1
}

fn default_authority_boost() -> f64 {
    0.2
}

fn default_marketing_penalty() -> f64 {
    0.3
}

pub fn default_authority_domains() -> Vec<String> {
    [
        "gov", "edu", "gov.cn", "edu.cn", "gov.uk", "ac.uk", "ac.cn", "who.int", "un.org",
        "oecd.org", "worldbank.org", "arxiv.org", "wikipedia.org", "nature.com", "science.org",
        "w3.org", "ietf.org", "iso.org", "ieee.org", "acm.org", "nist.gov",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_marketing_terms() -> Vec<String> {
    [
        "sponsor",
        "sponsored",
        "advertorial",
        "promotion",
        "promo",
        "discount",
        "coupon",
        "affiliate",
        "优惠",
        "种草",
        "联盟链接",
        "广告",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_sources: default_max_sources(),
            fetch_delay_ms: default_fetch_delay_ms(),
            concurrency: default_concurrency(),
            authority_boost: default_authority_boost(),
            marketing_penalty: default_marketing_penalty(),
            authority_domains: default_authority_domains(),
            marketing_terms: default_marketing_terms(),
        }
    }
}

impl EnrichmentConfig {
    /// Worker count clamped to `1..=MAX_ENRICH_CONCURRENCY`.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_ENRICH_CONCURRENCY)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Recorded responses used in test mode.
    #[serde(default)]
    pub recordings_path: Option<PathBuf>,
    #[serde(default = "default_brave_key_env")]
    pub brave_api_key_env: String,
    #[serde(default = "default_serpapi_key_env")]
    pub serpapi_api_key_env: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_call_timeout() -> u64 {
    30
}

fn default_brave_key_env() -> String {
    "BRAVE_API_KEY".to_string()
}

fn default_serpapi_key_env() -> String {
    "SERPAPI_API_KEY".to_string()
}

fn default_user_agent() -> String {
    format!("scout/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            call_timeout_secs: default_call_timeout(),
            recordings_path: None,
            brave_api_key_env: default_brave_key_env(),
            serpapi_api_key_env: default_serpapi_key_env(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl ToolsConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// When set, the pipeline state is written here after every stage.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("workspace/reports")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            snapshot_dir: None,
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "scout", "scout")
}

/// Load configuration with layered sources.
///
/// Order (later overrides earlier):
/// 1. Built-in defaults
/// 2. User config file (`~/.config/scout/config.toml`)
/// 3. Workspace config (`.scout/config.toml`)
/// 4. Environment variables (`SCOUT_` prefix, `__` separator)
/// 5. Explicit overrides
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ScoutConfig>,
) -> Result<ScoutConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ScoutConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".scout").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SCOUT_TOOLS__MODE, SCOUT_ENRICHMENT__CONCURRENCY, ...
    figment = figment.merge(Env::prefixed("SCOUT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs()
        && dirs.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".scout").join("config.toml").exists())
}

/// Directory for rolling log files, if the platform has a data dir.
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().join("logs"))
}
