//! Enrichment selection and fetching.
//!
//! Ranks candidates by an authority/marketing adjusted score, then fetches,
//! extracts, normalizes and quality-scores only the top few. Failures are
//! recorded on the individual source; only a missing capability fails the
//! stage as a whole.

use crate::client::{ToolClient, capabilities, operations};
use crate::config::EnrichmentConfig;
use crate::error::{Result, ToolError};
use crate::payload::{ExtractPayload, FetchPayload, NormalizedItem, QualityPayload};
use crate::pipeline::{Artifact, PipelineState, Stage};
use crate::types::{
    EnrichedSource, ExtractedContent, QualityAssessment, SkipReason, SourceCandidate, StageKind,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capabilities every enrichment needs.
const REQUIRED_CAPABILITIES: &[&str] = &[capabilities::WEB_FETCH, capabilities::RESEARCH_TOOLS];

/// Spaces out fetch starts across all workers.
struct FetchPacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl FetchPacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Wait until at least `interval` has passed since the previous fetch started.
    async fn wait_turn(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Selects and enriches the most valuable sources.
pub struct Enricher {
    client: Arc<dyn ToolClient>,
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(client: Arc<dyn ToolClient>, config: EnrichmentConfig) -> Self {
        Self { client, config }
    }

    /// Relevance adjusted for host authority and promotional titles.
    pub fn adjusted_score(&self, source: &SourceCandidate) -> f64 {
        let mut score = source.relevance_score;
        if source
            .host()
            .is_some_and(|h| is_authoritative(&h, &self.config.authority_domains))
        {
            score += self.config.authority_boost;
        }
        if is_promotional(&source.title, &self.config.marketing_terms) {
            score -= self.config.marketing_penalty;
        }
        score
    }

    /// Input indices ordered by adjusted score, highest first. Ties keep input order.
    pub fn prioritize(&self, sources: &[SourceCandidate]) -> Vec<usize> {
        let scores: Vec<f64> = sources.iter().map(|s| self.adjusted_score(s)).collect();
        let mut order: Vec<usize> = (0..sources.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        order
    }

    /// One [`EnrichedSource`] per input, in input order.
    ///
    /// The top `limit` sources by adjusted score are enriched; the rest are
    /// skipped as low priority.
    pub async fn enrich(
        &self,
        sources: &[SourceCandidate],
        limit: usize,
    ) -> Result<Vec<EnrichedSource>> {
        let order = self.prioritize(sources);
        let selected: Vec<usize> = order.iter().copied().take(limit).collect();

        if !selected.is_empty()
            && let Some(missing) = REQUIRED_CAPABILITIES
                .iter()
                .find(|c| !self.client.is_available(c))
        {
            return Err(ToolError::CapabilityUnavailable {
                capability: missing.to_string(),
            }
            .into());
        }

        let mut slots: Vec<Option<EnrichedSource>> = vec![None; sources.len()];
        let pacer = FetchPacer::new(self.config.fetch_delay());
        let concurrency = self.config.effective_concurrency();
        info!(
            total = sources.len(),
            selected = selected.len(),
            concurrency,
            "Enriching sources"
        );

        let enriched: Vec<(usize, EnrichedSource)> =
            futures::stream::iter(selected.iter().copied().map(|i| {
                let pacer = &pacer;
                async move { (i, self.enrich_one(&sources[i], pacer).await) }
            }))
            .buffered(concurrency)
            .collect()
            .await;

        for (i, source) in enriched {
            slots[i] = Some(source);
        }

        let result: Vec<EnrichedSource> = slots
            .into_iter()
            .zip(sources)
            .map(|(slot, candidate)| {
                slot.unwrap_or_else(|| {
                    EnrichedSource::skipped(candidate.clone(), SkipReason::LowPriority)
                })
            })
            .collect();

        let succeeded = result.iter().filter(|s| s.is_success()).count();
        info!(
            succeeded,
            failed = selected.len() - succeeded,
            skipped = sources.len() - selected.len(),
            "Enrichment complete"
        );
        Ok(result)
    }

    /// Every source marked skipped, used when the whole stage cannot run.
    pub fn skip_all(sources: &[SourceCandidate]) -> Vec<EnrichedSource> {
        sources
            .iter()
            .cloned()
            .map(|c| EnrichedSource::skipped(c, SkipReason::StageDegraded))
            .collect()
    }

    async fn enrich_one(&self, source: &SourceCandidate, pacer: &FetchPacer) -> EnrichedSource {
        pacer.wait_turn().await;
        match self.run_steps(source).await {
            Ok((content, quality)) => {
                debug!(url = %source.url, quality = quality.score, "Source enriched");
                EnrichedSource::succeeded(source.clone(), content, quality)
            }
            Err((step, e)) => {
                warn!(url = %source.url, step, error = %e, "Enrichment failed");
                EnrichedSource::failed(source.clone(), format!("{step}: {e}"))
            }
        }
    }

    /// fetch -> extract -> normalize -> score, stopping at the first failure.
    async fn run_steps(
        &self,
        source: &SourceCandidate,
    ) -> std::result::Result<(ExtractedContent, QualityAssessment), (&'static str, ToolError)> {
        let fetched: FetchPayload = self
            .client
            .call(
                capabilities::WEB_FETCH,
                operations::FETCH,
                json!({ "url": source.url }),
            )
            .await
            .parse()
            .map_err(|e| ("fetch", e))?;

        let extracted: ExtractPayload = self
            .client
            .call(
                capabilities::RESEARCH_TOOLS,
                operations::EXTRACT_READABLE,
                json!({ "html": fetched.html, "url": source.url }),
            )
            .await
            .parse()
            .map_err(|e| ("extract", e))?;

        let title = if extracted.title.trim().is_empty() {
            source.title.clone()
        } else {
            extracted.title.clone()
        };
        let normalized: NormalizedItem = self
            .client
            .call(
                capabilities::RESEARCH_TOOLS,
                operations::NORMALIZE,
                json!({
                    "item": {
                        "url": source.url,
                        "title": title,
                        "byline": extracted.byline,
                        "content_text": extracted.content_text,
                        "published_at": source.published_at.map(|p| p.to_rfc3339()),
                        "lang": source.lang,
                    }
                }),
            )
            .await
            .parse()
            .map_err(|e| ("normalize", e))?;

        let quality: QualityPayload = self
            .client
            .call(
                capabilities::RESEARCH_TOOLS,
                operations::QUALITY_SCORE,
                json!({ "item": normalized }),
            )
            .await
            .parse()
            .map_err(|e| ("quality_score", e))?;

        let length = if extracted.length > 0 {
            extracted.length
        } else {
            extracted.content_text.chars().count()
        };
        Ok((
            ExtractedContent {
                title: normalized.title,
                byline: normalized.author.or(extracted.byline),
                text: extracted.content_text,
                length,
                host: normalized.host,
                lang: normalized.lang,
                keywords: normalized.keywords,
            },
            QualityAssessment {
                score: quality.score.clamp(0.0, 1.0),
                labels: quality.labels,
            },
        ))
    }
}

/// Whether `host` is one of `domains` or a subdomain of one.
pub fn is_authoritative(host: &str, domains: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    domains.iter().any(|d| {
        let d = d.trim_start_matches('.').to_lowercase();
        host == d || host.ends_with(&format!(".{d}"))
    })
}

/// Whether the title carries a promotional term, case-insensitively.
pub fn is_promotional(title: &str, terms: &[String]) -> bool {
    let title = title.to_lowercase();
    terms.iter().any(|t| title.contains(&t.to_lowercase()))
}

#[async_trait]
impl Stage for Enricher {
    fn kind(&self) -> StageKind {
        StageKind::Enrich
    }

    async fn run(&self, state: &PipelineState) -> Result<Artifact> {
        let sources = state.require_sources(StageKind::Enrich)?;
        let limit = state
            .options
            .max_sources_to_enrich
            .unwrap_or(self.config.max_sources);
        Ok(Artifact::Enriched(self.enrich(sources, limit).await?))
    }

    fn fallback(&self, state: &PipelineState) -> Option<Artifact> {
        state
            .sources
            .as_deref()
            .map(|sources| Artifact::Enriched(Self::skip_all(sources)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CallErrorKind, ExecutionMode, ToolCallResult};
    use crate::config::default_authority_domains;
    use crate::error::ScoutError;
    use crate::types::EnrichmentStatus;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves every enrichment step; fetches of urls in `broken` fail.
    struct ScriptedTools {
        broken: HashSet<String>,
        available: bool,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        fetch_times: std::sync::Mutex<Vec<Instant>>,
    }

    impl ScriptedTools {
        fn new() -> Self {
            Self {
                broken: HashSet::new(),
                available: true,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fetch_times: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn breaking(mut self, url: &str) -> Self {
            self.broken.insert(url.to_string());
            self
        }
    }

    #[async_trait]
    impl ToolClient for ScriptedTools {
        async fn call(&self, capability: &str, operation: &str, params: Value) -> ToolCallResult {
            let mode = ExecutionMode::Test;
            match operation {
                "fetch" => {
                    self.fetch_times.lock().unwrap().push(Instant::now());
                    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);

                    let url = params["url"].as_str().unwrap_or_default().to_string();
                    if self.broken.contains(&url) {
                        return ToolCallResult::failed(capability, operation, mode, CallErrorKind::Failed, "HTTP 404");
                    }
                    ToolCallResult::ok(capability, operation, mode, json!({
                        "url": url, "status": 200, "html": "<html><title>T</title><p>body</p></html>"
                    }))
                }
                "extract_readable" => ToolCallResult::ok(capability, operation, mode, json!({
                    "title": "Extracted", "content_text": "body text here", "length": 14, "url": params["url"]
                })),
                "normalize" => {
                    let item = &params["item"];
                    ToolCallResult::ok(capability, operation, mode, json!({
                        "id": "abc", "url": item["url"], "host": "example.org", "title": item["title"],
                        "lang": "en", "extracted_at": "2025-01-01T00:00:00Z",
                        "content_text": item["content_text"], "keywords": ["body"]
                    }))
                }
                "quality_score" => ToolCallResult::ok(capability, operation, mode, json!({
                    "score": 1.7, "labels": ["long-form"]
                })),
                _ => ToolCallResult::failed(capability, operation, mode, CallErrorKind::InvalidRequest, "unknown"),
            }
        }

        fn is_available(&self, _capability: &str) -> bool {
            self.available
        }

        fn mode(&self) -> ExecutionMode {
            ExecutionMode::Test
        }
    }

    fn candidate(url: &str, title: &str, relevance: f64) -> SourceCandidate {
        SourceCandidate {
            url: url.into(),
            title: title.into(),
            snippet: String::new(),
            published_at: None,
            provider: "brave-search".into(),
            query: "q".into(),
            lang: Some("en".into()),
            relevance_score: relevance,
        }
    }

    fn config() -> EnrichmentConfig {
        EnrichmentConfig {
            fetch_delay_ms: 0,
            ..EnrichmentConfig::default()
        }
    }

    fn seven() -> Vec<SourceCandidate> {
        (0..7)
            .map(|i| candidate(&format!("https://s{i}.io/"), &format!("Source {i}"), 0.1 * i as f64))
            .collect()
    }

    #[test]
    fn test_authority_matches_label_boundary() {
        let domains = default_authority_domains();
        assert!(is_authoritative("www.nih.gov", &domains));
        assert!(is_authoritative("arxiv.org", &domains));
        assert!(is_authoritative("cs.stanford.edu", &domains));
        assert!(!is_authoritative("notarxiv.org", &domains));
        assert!(!is_authoritative("gov.example.com", &domains));
    }

    #[test]
    fn test_adjusted_score() {
        let enricher = Enricher::new(Arc::new(ScriptedTools::new()), config());
        let paper = candidate("https://arxiv.org/abs/1", "A study", 0.5);
        let promo = candidate("https://shop.io/x", "Sponsored: best deals", 0.5);
        assert!((enricher.adjusted_score(&paper) - 0.7).abs() < 1e-9);
        assert!((enricher.adjusted_score(&promo) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_prioritize_is_stable() {
        let enricher = Enricher::new(Arc::new(ScriptedTools::new()), config());
        let sources = vec![
            candidate("https://a.io", "A", 0.5),
            candidate("https://b.io", "B", 0.5),
            candidate("https://who.int/x", "C", 0.4),
        ];
        assert_eq!(enricher.prioritize(&sources), vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn test_seven_sources_cap_five() {
        let enricher = Enricher::new(Arc::new(ScriptedTools::new()), config());
        let sources = seven();
        let out = enricher.enrich(&sources, 5).await.unwrap();

        assert_eq!(out.len(), 7);
        let skipped: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == EnrichmentStatus::Skipped)
            .map(|(i, _)| i)
            .collect();
        // the two lowest-relevance sources are skipped
        assert_eq!(skipped, vec![0, 1]);
        assert!(out[2..].iter().all(|s| s.status == EnrichmentStatus::Success));
        assert!(out.iter().zip(&sources).all(|(e, c)| e.candidate.url == c.url));
        assert_eq!(out[0].skip_reason, Some(SkipReason::LowPriority));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_item_local() {
        let client = ScriptedTools::new().breaking("https://broken.io/");
        let enricher = Enricher::new(Arc::new(client), config());
        let sources = vec![
            candidate("https://broken.io/", "Broken", 0.9),
            candidate("https://fine.io/", "Fine", 0.8),
        ];
        let out = enricher.enrich(&sources, 5).await.unwrap();
        assert_eq!(out[0].status, EnrichmentStatus::Failed);
        let error = out[0].error.as_deref().unwrap();
        assert!(error.starts_with("fetch:"));
        assert!(error.contains("HTTP 404"));
        assert_eq!(out[1].status, EnrichmentStatus::Success);
    }

    #[tokio::test]
    async fn test_success_carries_content_and_clamped_quality() {
        let enricher = Enricher::new(Arc::new(ScriptedTools::new()), config());
        let out = enricher
            .enrich(&[candidate("https://a.io/", "Orig", 0.5)], 1)
            .await
            .unwrap();
        let content = out[0].content.as_ref().unwrap();
        assert_eq!(content.title, "Extracted");
        assert_eq!(content.length, 14);
        assert_eq!(content.keywords, vec!["body".to_string()]);
        let quality = out[0].quality.as_ref().unwrap();
        assert_eq!(quality.score, 1.0);
        assert_eq!(quality.labels, vec!["long-form".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_capability_fails_stage() {
        let mut client = ScriptedTools::new();
        client.available = false;
        let enricher = Enricher::new(Arc::new(client), config());
        let err = enricher.enrich(&seven(), 5).await.unwrap_err();
        assert!(matches!(
            err,
            ScoutError::Tool(ToolError::CapabilityUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_nothing_selected_needs_no_capabilities() {
        let mut client = ScriptedTools::new();
        client.available = false;
        let enricher = Enricher::new(Arc::new(client), config());
        let out = enricher.enrich(&seven(), 0).await.unwrap();
        assert!(out.iter().all(|s| s.status == EnrichmentStatus::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound_and_order() {
        let client = Arc::new(ScriptedTools::new());
        let enricher = Enricher::new(
            client.clone(),
            EnrichmentConfig {
                concurrency: 8,
                fetch_delay_ms: 0,
                ..EnrichmentConfig::default()
            },
        );
        let sources = seven();
        let out = enricher.enrich(&sources, 7).await.unwrap();
        assert!(client.peak.load(Ordering::SeqCst) <= 3);
        assert!(client.peak.load(Ordering::SeqCst) > 1);
        assert!(out.iter().zip(&sources).all(|(e, c)| e.candidate.url == c.url));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_are_paced() {
        let client = Arc::new(ScriptedTools::new());
        let enricher = Enricher::new(
            client.clone(),
            EnrichmentConfig {
                concurrency: 3,
                fetch_delay_ms: 1000,
                ..EnrichmentConfig::default()
            },
        );
        enricher.enrich(&seven(), 3).await.unwrap();
        let times = client.fetch_times.lock().unwrap().clone();
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_fallback_marks_all_degraded() {
        let out = Enricher::skip_all(&seven());
        assert_eq!(out.len(), 7);
        assert!(
            out.iter()
                .all(|s| s.skip_reason == Some(SkipReason::StageDegraded))
        );
    }
}
