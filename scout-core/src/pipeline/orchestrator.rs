//! Pipeline orchestrator.
//!
//! Sequences Plan -> Search -> Enrich -> Write over a single owned
//! [`PipelineState`]. Mandatory stages are retried under their policy and
//! abort the run once exhausted; the degradable enrichment stage falls back to
//! its substitute artifact instead.

use super::observer::{CompositeObserver, NoOpObserver, PipelineObserver, SnapshotObserver, TracingObserver};
use super::retry::with_retry;
use super::stage::Stage;
use super::state::{PipelinePhase, PipelineState};
use crate::client::ToolClient;
use crate::config::{ScoutConfig, StageRetryConfig};
use crate::error::{Result, ScoutError};
use crate::research::{Enricher, Planner, Searcher, Writer};
use crate::types::{ResearchOptions, RunSummary, StageKind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The four stage handlers, one per fixed slot.
pub struct StageSet {
    pub plan: Box<dyn Stage>,
    pub search: Box<dyn Stage>,
    pub enrich: Box<dyn Stage>,
    pub write: Box<dyn Stage>,
}

impl StageSet {
    fn into_ordered(self) -> Vec<Box<dyn Stage>> {
        vec![self.plan, self.search, self.enrich, self.write]
    }
}

/// Runs research pipelines. One run at a time per orchestrator.
pub struct Orchestrator {
    stages: Vec<Box<dyn Stage>>,
    retry: StageRetryConfig,
    observer: Arc<dyn PipelineObserver>,
    state: PipelineState,
}

impl Orchestrator {
    pub fn new(stages: StageSet, retry: StageRetryConfig) -> Self {
        Self {
            stages: stages.into_ordered(),
            retry,
            observer: Arc::new(NoOpObserver),
            state: PipelineState::new("", ResearchOptions::default()),
        }
    }

    /// The standard pipeline wired from configuration.
    ///
    /// Logs progress through `tracing` and, when `output.snapshot_dir` is set,
    /// snapshots the state after every stage.
    pub fn from_config(config: &ScoutConfig, client: Arc<dyn ToolClient>) -> Self {
        let mode = client.mode();
        let stages = StageSet {
            plan: Box::new(Planner::new()),
            search: Box::new(Searcher::new(client.clone(), config.search.clone())),
            enrich: Box::new(Enricher::new(client, config.enrichment.clone())),
            write: Box::new(Writer::new(config.output.report_dir.clone(), mode)),
        };

        let mut observer = CompositeObserver::new().with(TracingObserver);
        if let Some(dir) = &config.output.snapshot_dir {
            observer = observer.with(SnapshotObserver::new(dir.clone()));
        }

        Self::new(stages, config.pipeline.retry.clone()).with_observer(Arc::new(observer))
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Read-only snapshot of the current (or last) run.
    pub fn state(&self) -> PipelineState {
        self.state.clone()
    }

    /// Run the full pipeline for `topic`.
    ///
    /// Input is validated before any stage runs. On success the report has been
    /// written; on failure no report is produced and the error names the stage
    /// that gave up.
    pub async fn execute(&mut self, topic: &str, options: ResearchOptions) -> Result<RunSummary> {
        let topic = topic.trim();
        options.validate(topic)?;

        let started = Instant::now();
        self.state = PipelineState::new(topic, options);
        let observer = self.observer.as_ref();
        info!(run_id = %self.state.run_id, topic, "Starting research run");

        for stage in &self.stages {
            let kind = stage.kind();
            let phase = PipelinePhase::for_stage(kind);
            if let Err(e) = self.state.transition(phase) {
                return Err(fail_run(&mut self.state, observer, e.into()));
            }
            observer.on_phase_change(phase);

            let outcome = match self.retry.for_stage(kind) {
                Some(policy) if kind.is_mandatory() => {
                    let state = &self.state;
                    with_retry(kind, policy, observer, |_| stage.run(state)).await
                }
                _ => stage.run(&self.state).await,
            };

            let artifact = match outcome {
                Ok(artifact) => artifact,
                Err(e) if !kind.is_mandatory() => match stage.fallback(&self.state) {
                    Some(fallback) => {
                        warn!(stage = %kind, error = %e, "Stage failed, continuing with fallback");
                        self.state.mark_degraded(kind);
                        observer.on_stage_degraded(kind, &e);
                        fallback
                    }
                    None => return Err(fail_run(&mut self.state, observer, e)),
                },
                Err(e) => return Err(fail_run(&mut self.state, observer, e)),
            };

            if let Err(e) = self.state.apply(kind, artifact) {
                return Err(fail_run(&mut self.state, observer, e.into()));
            }
            observer.on_stage_complete(kind, &self.state);
        }

        self.state.transition(PipelinePhase::Done)?;
        observer.on_phase_change(PipelinePhase::Done);
        observer.on_run_finished(&self.state);

        let report = self.state.report.as_ref().ok_or_else(|| {
            ScoutError::from(crate::error::PipelineError::MissingArtifact {
                stage: StageKind::Write,
                artifact: "report",
            })
        })?;
        let summary = RunSummary {
            run_id: self.state.run_id,
            success: true,
            topic: self.state.topic.clone(),
            report_path: report.path.clone(),
            sources_count: self.state.sources.as_ref().map_or(0, Vec::len),
            enriched_count: self
                .state
                .enriched
                .as_ref()
                .map_or(0, |e| e.iter().filter(|s| s.is_success()).count()),
            degraded_stages: self.state.degraded.clone(),
            duration: started.elapsed(),
        };
        info!(
            run_id = %summary.run_id,
            report = %summary.report_path.display(),
            sources = summary.sources_count,
            enriched = summary.enriched_count,
            duration_ms = summary.duration.as_millis() as u64,
            "Research run complete"
        );
        Ok(summary)
    }
}

fn fail_run(state: &mut PipelineState, observer: &dyn PipelineObserver, err: ScoutError) -> ScoutError {
    error!(run_id = %state.run_id, phase = %state.phase, error = %err, "Research run failed");
    if let Err(e) = state.fail(err.to_string()) {
        warn!(error = %e, "Could not mark run as failed");
    }
    observer.on_phase_change(state.phase);
    observer.on_run_finished(state);
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::{StageError, ToolError, ValidationError};
    use crate::pipeline::observer::RecordingObserver;
    use crate::pipeline::stage::Artifact;
    use crate::types::{EnrichedSource, ReportOutput, SkipReason, SourceCandidate};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn candidate(url: &str) -> SourceCandidate {
        SourceCandidate {
            url: url.into(),
            title: "title".into(),
            snippet: String::new(),
            published_at: None,
            provider: "scripted".into(),
            query: "q".into(),
            lang: None,
            relevance_score: 0.5,
        }
    }

    /// Fails the first `failures` runs with a transient error.
    struct ScriptedStage {
        kind: StageKind,
        failures: u32,
        calls: Arc<AtomicU32>,
        permanent: bool,
    }

    impl ScriptedStage {
        fn ok(kind: StageKind) -> Self {
            Self::flaky(kind, 0)
        }

        fn flaky(kind: StageKind, failures: u32) -> Self {
            Self {
                kind,
                failures,
                calls: Arc::new(AtomicU32::new(0)),
                permanent: false,
            }
        }

        fn broken(kind: StageKind) -> Self {
            Self {
                permanent: true,
                ..Self::flaky(kind, u32::MAX)
            }
        }
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn run(&self, state: &PipelineState) -> Result<Artifact> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.permanent {
                    return Err(ToolError::CapabilityUnavailable {
                        capability: "web-fetch".into(),
                    }
                    .into());
                }
                return Err(ToolError::CallFailed {
                    capability: "brave-search".into(),
                    operation: "web_search".into(),
                    message: "connection reset".into(),
                }
                .into());
            }
            Ok(match self.kind {
                StageKind::Plan => Artifact::Plan(Planner::with_year(2025).plan(&state.topic, &state.options)?),
                StageKind::Search => Artifact::Sources(vec![candidate("https://a.io"), candidate("https://b.io")]),
                StageKind::Enrich => Artifact::Enriched(
                    state
                        .require_sources(StageKind::Enrich)?
                        .iter()
                        .cloned()
                        .map(|c| EnrichedSource::failed(c, "not fetched"))
                        .collect(),
                ),
                StageKind::Write => Artifact::Report(ReportOutput {
                    path: PathBuf::from("reports/out.md"),
                    bytes: 10,
                    sources_used: 2,
                }),
            })
        }

        fn fallback(&self, state: &PipelineState) -> Option<Artifact> {
            if self.kind != StageKind::Enrich {
                return None;
            }
            let sources = state.sources.clone().unwrap_or_default();
            Some(Artifact::Enriched(
                sources
                    .into_iter()
                    .map(|c| EnrichedSource::skipped(c, SkipReason::StageDegraded))
                    .collect(),
            ))
        }
    }

    fn stages(plan: ScriptedStage, search: ScriptedStage, enrich: ScriptedStage, write: ScriptedStage) -> StageSet {
        StageSet {
            plan: Box::new(plan),
            search: Box::new(search),
            enrich: Box::new(enrich),
            write: Box::new(write),
        }
    }

    fn fast_retry() -> StageRetryConfig {
        StageRetryConfig::uniform(RetryPolicy::new(2, 1000))
    }

    fn options() -> ResearchOptions {
        ResearchOptions {
            langs: vec!["en".into()],
            depth: 1,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_reaches_done() {
        let observer = Arc::new(RecordingObserver::default());
        let mut orch = Orchestrator::new(
            stages(
                ScriptedStage::ok(StageKind::Plan),
                ScriptedStage::ok(StageKind::Search),
                ScriptedStage::ok(StageKind::Enrich),
                ScriptedStage::ok(StageKind::Write),
            ),
            fast_retry(),
        )
        .with_observer(observer.clone());

        let summary = orch.execute("edge ai", options()).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.sources_count, 2);
        assert_eq!(summary.enriched_count, 0);
        assert_eq!(summary.report_path, PathBuf::from("reports/out.md"));
        assert!(summary.degraded_stages.is_empty());

        assert_eq!(
            observer.phases(),
            vec![
                PipelinePhase::Planning,
                PipelinePhase::Searching,
                PipelinePhase::Enriching,
                PipelinePhase::Writing,
                PipelinePhase::Done,
            ]
        );
        assert_eq!(orch.state().phase, PipelinePhase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_runs_no_stage() {
        let plan = ScriptedStage::ok(StageKind::Plan);
        let calls = plan.calls.clone();
        let mut orch = Orchestrator::new(
            stages(
                plan,
                ScriptedStage::ok(StageKind::Search),
                ScriptedStage::ok(StageKind::Enrich),
                ScriptedStage::ok(StageKind::Write),
            ),
            fast_retry(),
        );

        let err = orch.execute("  ", options()).await.unwrap_err();
        assert!(matches!(err, ScoutError::Validation(ValidationError::EmptyTopic)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_search_failure_is_retried() {
        let search = ScriptedStage::flaky(StageKind::Search, 1);
        let calls = search.calls.clone();
        let observer = Arc::new(RecordingObserver::default());
        let mut orch = Orchestrator::new(
            stages(
                ScriptedStage::ok(StageKind::Plan),
                search,
                ScriptedStage::ok(StageKind::Enrich),
                ScriptedStage::ok(StageKind::Write),
            ),
            fast_retry(),
        )
        .with_observer(observer.clone());

        orch.execute("edge ai", options()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(observer.retries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_mandatory_stage_aborts() {
        let write = ScriptedStage::flaky(StageKind::Write, 10);
        let calls = write.calls.clone();
        let mut orch = Orchestrator::new(
            stages(
                ScriptedStage::ok(StageKind::Plan),
                ScriptedStage::ok(StageKind::Search),
                ScriptedStage::ok(StageKind::Enrich),
                write,
            ),
            fast_retry(),
        );

        let err = orch.execute("edge ai", options()).await.unwrap_err();
        assert!(matches!(
            err,
            ScoutError::Stage(StageError::Exhausted {
                stage: StageKind::Write,
                attempts: 2,
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let state = orch.state();
        assert_eq!(state.phase, PipelinePhase::Failed);
        assert!(state.report.is_none());
        assert!(state.error.unwrap().contains("Stage 'write' failed after 2 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_failure_degrades() {
        let observer = Arc::new(RecordingObserver::default());
        let mut orch = Orchestrator::new(
            stages(
                ScriptedStage::ok(StageKind::Plan),
                ScriptedStage::ok(StageKind::Search),
                ScriptedStage::broken(StageKind::Enrich),
                ScriptedStage::ok(StageKind::Write),
            ),
            fast_retry(),
        )
        .with_observer(observer.clone());

        let summary = orch.execute("edge ai", options()).await.unwrap();
        assert_eq!(summary.degraded_stages, vec![StageKind::Enrich]);
        assert_eq!(observer.degraded(), vec![StageKind::Enrich]);

        let enriched = orch.state().enriched.unwrap();
        assert_eq!(enriched.len(), 2);
        assert!(
            enriched
                .iter()
                .all(|e| e.skip_reason == Some(SkipReason::StageDegraded))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_is_never_retried() {
        let enrich = ScriptedStage::flaky(StageKind::Enrich, 1);
        let calls = enrich.calls.clone();
        let mut orch = Orchestrator::new(
            stages(
                ScriptedStage::ok(StageKind::Plan),
                ScriptedStage::ok(StageKind::Search),
                enrich,
                ScriptedStage::ok(StageKind::Write),
            ),
            fast_retry(),
        );

        let summary = orch.execute("edge ai", options()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.degraded_stages, vec![StageKind::Enrich]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_can_run_twice() {
        let mut orch = Orchestrator::new(
            stages(
                ScriptedStage::ok(StageKind::Plan),
                ScriptedStage::ok(StageKind::Search),
                ScriptedStage::ok(StageKind::Enrich),
                ScriptedStage::ok(StageKind::Write),
            ),
            fast_retry(),
        );
        let first = orch.execute("one", options()).await.unwrap();
        let second = orch.execute("two", options()).await.unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(orch.state().topic, "two");
    }
}
