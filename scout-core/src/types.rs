//! Core data model for a research run.
//!
//! Every stage produces a new artifact from these types; nothing here is
//! mutated after the stage that created it returns.

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Languages the planner knows how to write queries for.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "zh"];
pub const MIN_DEPTH: u8 = 1;
pub const MAX_DEPTH: u8 = 5;
pub const MAX_TOPIC_CHARS: usize = 200;
pub const MAX_SOURCES_TO_ENRICH: usize = 50;

/// One of the four fixed pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Plan,
    Search,
    Enrich,
    Write,
}

impl StageKind {
    /// Mandatory stages abort the run once their retries are exhausted.
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, StageKind::Enrich)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Plan => "plan",
            StageKind::Search => "search",
            StageKind::Enrich => "enrich",
            StageKind::Write => "write",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run knobs supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOptions {
    /// Search languages, in priority order.
    #[serde(default = "default_langs")]
    pub langs: Vec<String>,
    #[serde(default = "default_depth")]
    pub depth: u8,
    /// Drop hits published before this date.
    #[serde(default)]
    pub since: Option<NaiveDate>,
    /// Overrides `enrichment.max_sources` for this run.
    #[serde(default)]
    pub max_sources_to_enrich: Option<usize>,
}

fn default_langs() -> Vec<String> {
    vec!["zh".to_string(), "en".to_string()]
}

fn default_depth() -> u8 {
    2
}

impl Default for ResearchOptions {
    fn default() -> Self {
        Self {
            langs: default_langs(),
            depth: default_depth(),
            since: None,
            max_sources_to_enrich: None,
        }
    }
}

impl ResearchOptions {
    /// Reject malformed input before any stage runs.
    pub fn validate(&self, topic: &str) -> Result<(), ValidationError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ValidationError::EmptyTopic);
        }
        let len = topic.chars().count();
        if len > MAX_TOPIC_CHARS {
            return Err(ValidationError::TopicTooLong {
                len,
                max: MAX_TOPIC_CHARS,
            });
        }
        if self.langs.is_empty() {
            return Err(ValidationError::NoLanguages);
        }
        if let Some(lang) = self
            .langs
            .iter()
            .find(|l| !SUPPORTED_LANGUAGES.contains(&l.as_str()))
        {
            return Err(ValidationError::UnsupportedLanguage { lang: lang.clone() });
        }
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&self.depth) {
            return Err(ValidationError::DepthOutOfRange {
                depth: self.depth,
                min: MIN_DEPTH,
                max: MAX_DEPTH,
            });
        }
        if let Some(requested) = self.max_sources_to_enrich
            && requested > MAX_SOURCES_TO_ENRICH
        {
            return Err(ValidationError::TooManySources {
                requested,
                max: MAX_SOURCES_TO_ENRICH,
            });
        }
        Ok(())
    }

    /// Parse a `YYYY-MM-DD` since-date as given on the command line.
    pub fn parse_since(value: &str) -> Result<NaiveDate, ValidationError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
            ValidationError::InvalidSince {
                value: value.to_string(),
            }
        })
    }

    /// Split a comma-separated language list, normalising case and blanks.
    pub fn parse_langs(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect()
    }
}

/// A single search query with the language it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub lang: String,
}

/// A phase estimate within a plan's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePhase {
    pub name: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub estimated_minutes: u32,
    pub phases: Vec<TimelinePhase>,
}

/// The research plan produced by the planner. One per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub topic: String,
    pub subtopics: Vec<String>,
    pub queries: Vec<SearchQuery>,
    pub checkpoints: Vec<String>,
    pub timeline: Timeline,
}

/// A discovered reference. The url is unique within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Provider that returned this hit.
    pub provider: String,
    /// Query text that found it.
    pub query: String,
    pub lang: Option<String>,
    pub relevance_score: f64,
}

impl SourceCandidate {
    /// Host part of the url, lower-cased, if the url parses.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentStatus::Success => write!(f, "success"),
            EnrichmentStatus::Failed => write!(f, "failed"),
            EnrichmentStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Ranked below the enrichment cap.
    LowPriority,
    /// The enrichment stage as a whole could not run.
    StageDegraded,
}

/// Readable content pulled out of a fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    pub byline: Option<String>,
    pub text: String,
    pub length: usize,
    pub host: String,
    pub lang: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score: f64,
    pub labels: Vec<String>,
}

/// A candidate after the enrichment stage. Exactly one per candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSource {
    #[serde(flatten)]
    pub candidate: SourceCandidate,
    pub status: EnrichmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ExtractedContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityAssessment>,
    pub enriched_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnrichedSource {
    pub fn succeeded(
        candidate: SourceCandidate,
        content: ExtractedContent,
        quality: QualityAssessment,
    ) -> Self {
        Self {
            candidate,
            status: EnrichmentStatus::Success,
            skip_reason: None,
            content: Some(content),
            quality: Some(quality),
            enriched_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(candidate: SourceCandidate, error: impl Into<String>) -> Self {
        Self {
            candidate,
            status: EnrichmentStatus::Failed,
            skip_reason: None,
            content: None,
            quality: None,
            enriched_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn skipped(candidate: SourceCandidate, reason: SkipReason) -> Self {
        Self {
            candidate,
            status: EnrichmentStatus::Skipped,
            skip_reason: Some(reason),
            content: None,
            quality: None,
            enriched_at: Utc::now(),
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnrichmentStatus::Success
    }
}

/// Where the writer put the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOutput {
    pub path: PathBuf,
    pub bytes: usize,
    pub sources_used: usize,
}

/// Returned by a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: uuid::Uuid,
    pub success: bool,
    pub topic: String,
    pub report_path: PathBuf,
    pub sources_count: usize,
    pub enriched_count: usize,
    pub degraded_stages: Vec<StageKind>,
    pub duration: Duration,
}
