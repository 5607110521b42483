//! Progress observers for pipeline runs.

use super::state::{PipelinePhase, PipelineState};
use crate::error::ScoutError;
use crate::types::StageKind;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Receives progress notifications from the orchestrator.
///
/// All methods default to doing nothing.
pub trait PipelineObserver: Send + Sync {
    fn on_phase_change(&self, _phase: PipelinePhase) {}

    /// A mandatory stage failed `attempt` and will run again after `delay`.
    fn on_retry(&self, _stage: StageKind, _attempt: u32, _delay: Duration, _error: &ScoutError) {}

    /// A degradable stage failed and its fallback artifact was substituted.
    fn on_stage_degraded(&self, _stage: StageKind, _error: &ScoutError) {}

    fn on_stage_complete(&self, _stage: StageKind, _state: &PipelineState) {}

    fn on_run_finished(&self, _state: &PipelineState) {}
}

/// Observer that ignores everything.
pub struct NoOpObserver;

impl PipelineObserver for NoOpObserver {}

/// Logs every notification through `tracing`.
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_phase_change(&self, phase: PipelinePhase) {
        tracing::info!(phase = %phase, "Pipeline phase changed");
    }

    fn on_retry(&self, stage: StageKind, attempt: u32, delay: Duration, error: &ScoutError) {
        tracing::warn!(
            stage = %stage,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying stage"
        );
    }

    fn on_stage_degraded(&self, stage: StageKind, error: &ScoutError) {
        tracing::warn!(stage = %stage, error = %error, "Stage degraded, using fallback");
    }

    fn on_stage_complete(&self, stage: StageKind, state: &PipelineState) {
        tracing::info!(
            stage = %stage,
            run_id = %state.run_id,
            sources = state.sources.as_ref().map_or(0, Vec::len),
            "Stage complete"
        );
    }

    fn on_run_finished(&self, state: &PipelineState) {
        tracing::info!(run_id = %state.run_id, phase = %state.phase, "Run finished");
    }
}

/// Writes the full state to `<dir>/<run_id>.json` after every stage and when
/// the run ends. Write failures are logged, never raised.
pub struct SnapshotObserver {
    dir: PathBuf,
}

impl SnapshotObserver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn save(&self, state: &PipelineState) {
        if let Err(e) = state.save(&self.dir) {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "Failed to write pipeline snapshot"
            );
        }
    }
}

impl PipelineObserver for SnapshotObserver {
    fn on_stage_complete(&self, _stage: StageKind, state: &PipelineState) {
        self.save(state);
    }

    fn on_run_finished(&self, state: &PipelineState) {
        self.save(state);
    }
}

/// Fans notifications out to several observers in order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn PipelineObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: impl PipelineObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }
}

impl PipelineObserver for CompositeObserver {
    fn on_phase_change(&self, phase: PipelinePhase) {
        self.observers.iter().for_each(|o| o.on_phase_change(phase));
    }

    fn on_retry(&self, stage: StageKind, attempt: u32, delay: Duration, error: &ScoutError) {
        self.observers
            .iter()
            .for_each(|o| o.on_retry(stage, attempt, delay, error));
    }

    fn on_stage_degraded(&self, stage: StageKind, error: &ScoutError) {
        self.observers
            .iter()
            .for_each(|o| o.on_stage_degraded(stage, error));
    }

    fn on_stage_complete(&self, stage: StageKind, state: &PipelineState) {
        self.observers
            .iter()
            .for_each(|o| o.on_stage_complete(stage, state));
    }

    fn on_run_finished(&self, state: &PipelineState) {
        self.observers.iter().for_each(|o| o.on_run_finished(state));
    }
}

/// Keeps every notification in memory.
#[derive(Default)]
pub struct RecordingObserver {
    phases: Mutex<Vec<PipelinePhase>>,
    retries: Mutex<Vec<(StageKind, u32, Duration)>>,
    degraded: Mutex<Vec<StageKind>>,
    completed: Mutex<Vec<StageKind>>,
}

impl RecordingObserver {
    pub fn phases(&self) -> Vec<PipelinePhase> {
        self.phases.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn retries(&self) -> Vec<(StageKind, u32, Duration)> {
        self.retries.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn degraded(&self) -> Vec<StageKind> {
        self.degraded.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn completed(&self) -> Vec<StageKind> {
        self.completed.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_phase_change(&self, phase: PipelinePhase) {
        if let Ok(mut v) = self.phases.lock() {
            v.push(phase);
        }
    }

    fn on_retry(&self, stage: StageKind, attempt: u32, delay: Duration, _error: &ScoutError) {
        if let Ok(mut v) = self.retries.lock() {
            v.push((stage, attempt, delay));
        }
    }

    fn on_stage_degraded(&self, stage: StageKind, _error: &ScoutError) {
        if let Ok(mut v) = self.degraded.lock() {
            v.push(stage);
        }
    }

    fn on_stage_complete(&self, stage: StageKind, _state: &PipelineState) {
        if let Ok(mut v) = self.completed.lock() {
            v.push(stage);
        }
    }
}
