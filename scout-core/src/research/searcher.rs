//! Search with an ordered provider fallback chain.

use crate::client::{CallErrorKind, ToolClient};
use crate::config::{ProviderDescriptor, SearchConfig};
use crate::error::{FailureReason, ProviderFailure, Result, StageError};
use crate::payload::{SearchHit, SearchPayload};
use crate::pipeline::{Artifact, PipelineState, Stage};
use crate::relevance;
use crate::types::{Plan, ResearchOptions, SearchQuery, SourceCandidate, StageKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs every plan query through the provider chain.
pub struct Searcher {
    client: Arc<dyn ToolClient>,
    config: SearchConfig,
}

impl Searcher {
    pub fn new(client: Arc<dyn ToolClient>, config: SearchConfig) -> Self {
        Self { client, config }
    }

    /// Candidates for every query, deduplicated by url and ranked by relevance.
    ///
    /// Fails with [`StageError::ProvidersExhausted`] when no provider produced
    /// a single hit for any query.
    pub async fn search(
        &self,
        plan: &Plan,
        options: &ResearchOptions,
    ) -> Result<Vec<SourceCandidate>> {
        let count = self.config.result_count(options.depth);
        let delay = Duration::from_millis(self.config.query_delay_ms);
        let mut failures = Vec::new();
        let mut collected = Vec::new();

        for (i, query) in plan.queries.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.query_chain(query, count, options.since, &mut failures).await {
                Some(found) => collected.extend(found),
                None => warn!(query = %query.text, "No provider returned results for query"),
            }
        }

        if collected.is_empty() {
            return Err(StageError::ProvidersExhausted {
                providers: self.config.providers.iter().map(|p| p.name.clone()).collect(),
                queries: plan.queries.len(),
                failures,
            }
            .into());
        }

        let ranked = dedupe_and_rank(collected);
        let report = relevance::validate_quality(&ranked, &plan.topic);
        for issue in &report.issues {
            warn!(issue = %issue, "Search result quality issue");
        }
        info!(
            candidates = ranked.len(),
            avg_relevance = report.avg_relevance,
            provider_failures = failures.len(),
            "Search complete"
        );
        Ok(ranked)
    }

    /// Try providers in order; the first non-empty answer wins.
    async fn query_chain(
        &self,
        query: &SearchQuery,
        count: usize,
        since: Option<NaiveDate>,
        failures: &mut Vec<ProviderFailure>,
    ) -> Option<Vec<SourceCandidate>> {
        for provider in &self.config.providers {
            match self.query_provider(provider, query, count, since).await {
                Ok(found) if !found.is_empty() => {
                    debug!(
                        provider = %provider.name,
                        query = %query.text,
                        hits = found.len(),
                        "Provider answered"
                    );
                    return Some(found);
                }
                Ok(_) => failures.push(ProviderFailure {
                    provider: provider.name.clone(),
                    query: query.text.clone(),
                    reason: FailureReason::Empty,
                }),
                Err(reason) => {
                    debug!(provider = %provider.name, query = %query.text, "Provider failed");
                    failures.push(ProviderFailure {
                        provider: provider.name.clone(),
                        query: query.text.clone(),
                        reason,
                    });
                }
            }
        }
        None
    }

    async fn query_provider(
        &self,
        provider: &ProviderDescriptor,
        query: &SearchQuery,
        count: usize,
        since: Option<NaiveDate>,
    ) -> std::result::Result<Vec<SourceCandidate>, FailureReason> {
        if !self.client.is_available(&provider.capability) {
            return Err(FailureReason::Unavailable);
        }

        let mut params = json!({
            "query": query.text,
            "count": count,
            "lang": query.lang,
        });
        if let Some(since) = since {
            params["since"] = json!(since.format("%Y-%m-%d").to_string());
        }

        let result = self
            .client
            .call(&provider.capability, &provider.operation, params)
            .await;
        if !result.success {
            let message = result.error.unwrap_or_else(|| "unknown error".into());
            return Err(match result.error_kind {
                Some(CallErrorKind::Unavailable) => FailureReason::Unavailable,
                Some(CallErrorKind::NotConfigured | CallErrorKind::NoRecording) => {
                    FailureReason::NotConfigured(message)
                }
                Some(CallErrorKind::InvalidRequest) => FailureReason::Malformed(message),
                _ => FailureReason::Transient(message),
            });
        }

        let payload: SearchPayload = result
            .parse()
            .map_err(|e| FailureReason::Malformed(e.to_string()))?;
        Ok(build_candidates(payload.results, &provider.name, query, since))
    }
}

/// Turn raw hits into scored candidates, dropping unusable and stale ones.
fn build_candidates(
    hits: Vec<SearchHit>,
    provider: &str,
    query: &SearchQuery,
    since: Option<NaiveDate>,
) -> Vec<SourceCandidate> {
    hits.into_iter()
        .filter(|hit| !hit.url.trim().is_empty())
        .filter_map(|hit| {
            let published_at = hit.published();
            if let (Some(since), Some(published)) = (since, published_at)
                && published.date_naive() < since
            {
                return None;
            }
            let relevance_score = relevance::score(&hit, &query.text);
            Some(SourceCandidate {
                url: hit.url.trim().to_string(),
                title: hit.title,
                snippet: hit.snippet,
                published_at,
                provider: provider.to_string(),
                query: query.text.clone(),
                lang: Some(query.lang.clone()),
                relevance_score,
            })
        })
        .collect()
}

/// Drop repeated urls (first one wins), then stable-sort by relevance, highest first.
pub fn dedupe_and_rank(candidates: Vec<SourceCandidate>) -> Vec<SourceCandidate> {
    let mut seen = HashSet::new();
    let mut unique: Vec<SourceCandidate> = candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect();
    unique.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    unique
}

#[async_trait]
impl Stage for Searcher {
    fn kind(&self) -> StageKind {
        StageKind::Search
    }

    async fn run(&self, state: &PipelineState) -> Result<Artifact> {
        let plan = state.require_plan(StageKind::Search)?;
        Ok(Artifact::Sources(self.search(plan, &state.options).await?))
    }
}
