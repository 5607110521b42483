//! Report assembly.
//!
//! The writer turns the plan and enriched sources into a [`ReportInput`],
//! hands it to a [`ReportRenderer`] and stores the result under the report
//! directory.

use crate::client::ExecutionMode;
use crate::error::{Result, StageError};
use crate::pipeline::{Artifact, PipelineState, Stage};
use crate::relevance;
use crate::types::{EnrichedSource, EnrichmentStatus, Plan, ReportOutput, ResearchOptions, StageKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_FILENAME_CHARS: usize = 50;
const SOURCES_PER_FINDING: usize = 2;
const SUMMARY_CHARS: usize = 200;

/// Renders a report document from its assembled input.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, input: &ReportInput) -> std::result::Result<String, StageError>;

    /// File extension, without the dot.
    fn extension(&self) -> &str {
        "md"
    }
}

/// Everything a renderer needs, already flattened for templating.
#[derive(Debug, Clone, Serialize)]
pub struct ReportInput {
    pub topic: String,
    pub generated_at: DateTime<Utc>,
    pub mode: ExecutionMode,
    pub langs: String,
    pub since: Option<String>,
    pub subtopics: Vec<String>,
    pub findings: Vec<Finding>,
    pub rows: Vec<SourceRow>,
    pub stats: ReportStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub subtopic: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRow {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub published: String,
    pub relevance: String,
    pub status: EnrichmentStatus,
    pub quality: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportStats {
    pub total: usize,
    pub enriched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub queries: usize,
}

impl ReportInput {
    pub fn build(
        plan: &Plan,
        sources: &[EnrichedSource],
        options: &ResearchOptions,
        mode: ExecutionMode,
    ) -> Self {
        let count = |status: EnrichmentStatus| sources.iter().filter(|s| s.status == status).count();
        let stats = ReportStats {
            total: sources.len(),
            enriched: count(EnrichmentStatus::Success),
            failed: count(EnrichmentStatus::Failed),
            skipped: count(EnrichmentStatus::Skipped),
            queries: plan.queries.len(),
        };

        let findings = plan
            .subtopics
            .iter()
            .map(|subtopic| Finding {
                subtopic: subtopic.clone(),
                sources: best_sources_for(subtopic, sources)
                    .into_iter()
                    .map(source_ref)
                    .collect(),
            })
            .collect();

        let rows = sources
            .iter()
            .enumerate()
            .map(|(i, s)| SourceRow {
                index: i + 1,
                title: table_cell(&s.candidate.title),
                url: s.candidate.url.clone(),
                published: published(s),
                relevance: format!("{:.0}%", s.candidate.relevance_score * 100.0),
                status: s.status,
                quality: s
                    .quality
                    .as_ref()
                    .map(|q| format!("{:.2}", q.score))
                    .unwrap_or_else(|| "-".into()),
            })
            .collect();

        Self {
            topic: plan.topic.clone(),
            generated_at: Utc::now(),
            mode,
            langs: options.langs.join(", "),
            since: options.since.map(|d| d.format("%Y-%m-%d").to_string()),
            subtopics: plan.subtopics.clone(),
            findings,
            rows,
            stats,
        }
    }
}

/// Sources most relevant to a subtopic, enriched ones first on ties.
fn best_sources_for<'a>(subtopic: &str, sources: &'a [EnrichedSource]) -> Vec<&'a EnrichedSource> {
    let mut scored: Vec<(f64, &EnrichedSource)> = sources
        .iter()
        .map(|s| (relevance::score(&s.candidate, subtopic), s))
        .filter(|(score, _)| *score > 0.0)
        .map(|(score, s)| {
            let bonus = if s.is_success() { 0.01 } else { 0.0 };
            (score + bonus, s)
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(SOURCES_PER_FINDING)
        .map(|(_, s)| s)
        .collect()
}

fn source_ref(source: &EnrichedSource) -> SourceRef {
    let text = match &source.content {
        Some(content) if !content.text.trim().is_empty() => content.text.as_str(),
        _ => source.candidate.snippet.as_str(),
    };
    SourceRef {
        title: source.candidate.title.clone(),
        url: source.candidate.url.clone(),
        summary: truncate_chars(text.trim(), SUMMARY_CHARS),
        published: published(source),
    }
}

fn published(source: &EnrichedSource) -> String {
    source
        .candidate
        .published_at
        .map(|p| p.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn truncate_chars(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Turn a topic into a filesystem-safe name fragment.
///
/// Anything other than ASCII alphanumerics, CJK ideographs, `-` and `_`
/// becomes `-`; runs collapse and the result is capped at 50 characters.
pub fn sanitize_filename(topic: &str) -> String {
    let mut out = String::new();
    for c in topic.chars() {
        let keep = c.is_ascii_alphanumeric()
            || c == '_'
            || c == '-'
            || ('\u{4e00}'..='\u{9fff}').contains(&c);
        if keep && c != '-' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed: String = out.trim_matches('-').chars().take(MAX_FILENAME_CHARS).collect();
    let trimmed = trimmed.trim_end_matches('-').to_string();
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed
    }
}

const REPORT_TEMPLATE: &str = r#"# {{topic}}: Research Report

> Generated: {{generated_at}}
> Languages: {{langs}}{{#if since}} | Since: {{since}}{{/if}}
> Sources: {{stats.total}} ({{stats.enriched}} enriched, {{stats.failed}} failed, {{stats.skipped}} skipped)
> Tool mode: {{mode}}

## Summary

This report covers "{{topic}}" across {{stats.total}} sources gathered from {{stats.queries}} search queries. {{stats.enriched}} sources were fetched in full and quality-assessed.

## Key Findings
{{#each findings}}

### {{subtopic}}
{{#if sources}}
{{#each sources}}
- **{{title}}**: {{summary}}
  Source: <{{url}}> ({{published}})
{{/each}}
{{else}}
- No sources matched this subtopic.
{{/if}}
{{/each}}

## Sources

| # | Title | URL | Published | Relevance | Enrichment | Quality |
|---|-------|-----|-----------|-----------|------------|---------|
{{#each rows}}
| {{index}} | {{title}} | {{url}} | {{published}} | {{relevance}} | {{status}} | {{quality}} |
{{/each}}

## Methodology

- Search queries: {{stats.queries}}
- Candidate sources: {{stats.total}}
- Enrichment: fetch, extract, normalize and quality-score the highest priority sources

## Limitations

- Findings are assembled from search snippets and extracted page text without manual review.
- Sources marked failed or skipped were not read in full.
"#;

/// Default renderer producing Markdown through Handlebars.
pub struct MarkdownRenderer {
    registry: Handlebars<'static>,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }
}

impl ReportRenderer for MarkdownRenderer {
    fn render(&self, input: &ReportInput) -> std::result::Result<String, StageError> {
        self.registry
            .render_template(REPORT_TEMPLATE, input)
            .map_err(|e| StageError::Failed {
                stage: StageKind::Write,
                message: format!("report template failed to render: {e}"),
            })
    }
}

/// Final stage: renders and stores the report.
pub struct Writer {
    report_dir: PathBuf,
    mode: ExecutionMode,
    renderer: Arc<dyn ReportRenderer>,
}

impl Writer {
    pub fn new(report_dir: impl Into<PathBuf>, mode: ExecutionMode) -> Self {
        Self {
            report_dir: report_dir.into(),
            mode,
            renderer: Arc::new(MarkdownRenderer::new()),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// `<report_dir>/<YYYY-MM-DD>-<sanitized topic>.<ext>`
    pub fn report_path(&self, topic: &str, date: DateTime<Utc>) -> PathBuf {
        self.report_dir.join(format!(
            "{}-{}.{}",
            date.format("%Y-%m-%d"),
            sanitize_filename(topic),
            self.renderer.extension()
        ))
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub async fn write(
        &self,
        plan: &Plan,
        sources: &[EnrichedSource],
        options: &ResearchOptions,
    ) -> Result<ReportOutput> {
        let input = ReportInput::build(plan, sources, options, self.mode);
        let content = self.renderer.render(&input)?;
        let path = self.report_path(&plan.topic, input.generated_at);
        crate::persistence::atomic_write_async(&path, content.as_bytes()).await?;

        tracing::info!(path = %path.display(), bytes = content.len(), "Report written");
        Ok(ReportOutput {
            path,
            bytes: content.len(),
            sources_used: sources.len(),
        })
    }
}

#[async_trait]
impl Stage for Writer {
    fn kind(&self) -> StageKind {
        StageKind::Write
    }

    async fn run(&self, state: &PipelineState) -> Result<Artifact> {
        let plan = state.require_plan(StageKind::Write)?;
        let sources = state.require_enriched(StageKind::Write)?;
        Ok(Artifact::Report(
            self.write(plan, sources, &state.options).await?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ExtractedContent, QualityAssessment, SearchQuery, SkipReason, SourceCandidate, Timeline,
    };
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn plan() -> Plan {
        Plan {
            topic: "edge computing".into(),
            subtopics: vec![
                "Current state of edge computing".into(),
                "Quantum gravity".into(),
            ],
            queries: vec![SearchQuery {
                text: "edge computing".into(),
                lang: "en".into(),
            }],
            checkpoints: vec![],
            timeline: Timeline {
                estimated_minutes: 0,
                phases: vec![],
            },
        }
    }

    fn candidate(url: &str, title: &str) -> SourceCandidate {
        SourceCandidate {
            url: url.into(),
            title: title.into(),
            snippet: "Edge computing moves compute closer to users.".into(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()),
            provider: "brave-search".into(),
            query: "edge computing".into(),
            lang: Some("en".into()),
            relevance_score: 0.8,
        }
    }

    fn sources() -> Vec<EnrichedSource> {
        vec![
            EnrichedSource::succeeded(
                candidate("https://a.io/edge", "Edge computing | state of the art"),
                ExtractedContent {
                    title: "Edge".into(),
                    byline: None,
                    text: "Full text about edge computing today.".into(),
                    length: 37,
                    host: "a.io".into(),
                    lang: "en".into(),
                    keywords: vec![],
                },
                QualityAssessment {
                    score: 0.75,
                    labels: vec![],
                },
            ),
            EnrichedSource::failed(candidate("https://b.io/edge", "Edge computing trends"), "fetch: 404"),
            EnrichedSource::skipped(candidate("https://c.io/edge", "Edge computing basics"), SkipReason::LowPriority),
        ]
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Edge Computing: 2025 / trends?"), "Edge-Computing-2025-trends");
        assert_eq!(sanitize_filename("人工智能 发展"), "人工智能-发展");
        assert_eq!(sanitize_filename("a--b__c"), "a-b__c");
        assert_eq!(sanitize_filename("???"), "report");
        let long = "x".repeat(80);
        assert_eq!(sanitize_filename(&long).chars().count(), 50);
    }

    #[test]
    fn test_report_path() {
        let writer = Writer::new("/tmp/reports", ExecutionMode::Mock);
        let date = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(
            writer.report_path("Edge AI", date),
            PathBuf::from("/tmp/reports/2025-03-09-Edge-AI.md")
        );
    }

    #[test]
    fn test_build_stats_and_rows() {
        let input = ReportInput::build(&plan(), &sources(), &ResearchOptions::default(), ExecutionMode::Test);
        assert_eq!(
            input.stats,
            ReportStats {
                total: 3,
                enriched: 1,
                failed: 1,
                skipped: 1,
                queries: 1,
            }
        );
        assert_eq!(input.rows[0].title, "Edge computing \\| state of the art");
        assert_eq!(input.rows[0].quality, "0.75");
        assert_eq!(input.rows[1].quality, "-");
        assert_eq!(input.rows[2].relevance, "80%");
    }

    #[test]
    fn test_findings_prefer_matching_sources() {
        let input = ReportInput::build(&plan(), &sources(), &ResearchOptions::default(), ExecutionMode::Test);
        assert_eq!(input.findings.len(), 2);
        assert_eq!(input.findings[0].sources.len(), 2);
        // the enriched source wins the tie and contributes its full text
        assert_eq!(input.findings[0].sources[0].url, "https://a.io/edge");
        assert!(input.findings[0].sources[0].summary.starts_with("Full text"));
        assert!(input.findings[1].sources.is_empty());
    }

    #[test]
    fn test_markdown_render() {
        let input = ReportInput::build(&plan(), &sources(), &ResearchOptions::default(), ExecutionMode::Mock);
        let doc = MarkdownRenderer::new().render(&input).unwrap();
        assert!(doc.starts_with("# edge computing: Research Report"));
        assert!(doc.contains("> Tool mode: mock"));
        assert!(doc.contains("## Key Findings"));
        assert!(doc.contains("No sources matched this subtopic."));
        assert!(doc.contains("| 2 | Edge computing trends | https://b.io/edge | 2024-05-01 | 80% | failed | - |"));
        assert!(doc.contains("> Sources: 3 (1 enriched, 1 failed, 1 skipped)"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("a  b\nc", 10), "a b c");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_write_creates_report() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer::new(dir.path().join("reports"), ExecutionMode::Test);
        let out = writer
            .write(&plan(), &sources(), &ResearchOptions::default())
            .await
            .unwrap();
        assert!(out.path.exists());
        assert!(out.path.to_string_lossy().ends_with("-edge-computing.md"));
        assert_eq!(out.sources_used, 3);
        let body = std::fs::read_to_string(&out.path).unwrap();
        assert_eq!(body.len(), out.bytes);
    }

    struct FailingRenderer;

    impl ReportRenderer for FailingRenderer {
        fn render(&self, _input: &ReportInput) -> std::result::Result<String, StageError> {
            Err(StageError::Failed {
                stage: StageKind::Write,
                message: "renderer offline".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_renderer_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer::new(dir.path(), ExecutionMode::Test).with_renderer(Arc::new(FailingRenderer));
        let err = writer
            .write(&plan(), &sources(), &ResearchOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("renderer offline"));
        assert!(err.is_retryable());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
