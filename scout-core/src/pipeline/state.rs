//! Pipeline state machine.
//!
//! Tracks the phase of a single run and the artifact each completed stage
//! produced. Owned by one orchestrator; callers only ever see clones.

use super::stage::Artifact;
use crate::error::PipelineError;
use crate::types::{
    EnrichedSource, Plan, ReportOutput, ResearchOptions, SourceCandidate, StageKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Current phase of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Idle,
    Planning,
    Searching,
    Enriching,
    Writing,
    Done,
    /// A mandatory stage exhausted its retries. Absorbing.
    Failed,
}

impl PipelinePhase {
    /// Phase a stage runs in.
    pub fn for_stage(stage: StageKind) -> Self {
        match stage {
            StageKind::Plan => PipelinePhase::Planning,
            StageKind::Search => PipelinePhase::Searching,
            StageKind::Enrich => PipelinePhase::Enriching,
            StageKind::Write => PipelinePhase::Writing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelinePhase::Done | PipelinePhase::Failed)
    }

    /// Legal moves: the fixed forward sequence, or from an active phase to `Failed`.
    pub fn can_transition_to(&self, next: PipelinePhase) -> bool {
        use PipelinePhase::*;
        matches!(
            (self, next),
            (Idle, Planning)
                | (Planning, Searching)
                | (Searching, Enriching)
                | (Enriching, Writing)
                | (Writing, Done)
                | (Planning | Searching | Enriching | Writing, Failed)
        )
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Planning => "planning",
            PipelinePhase::Searching => "searching",
            PipelinePhase::Enriching => "enriching",
            PipelinePhase::Writing => "writing",
            PipelinePhase::Done => "done",
            PipelinePhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything known about a run so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub topic: String,
    pub options: ResearchOptions,
    pub phase: PipelinePhase,
    pub plan: Option<Plan>,
    pub sources: Option<Vec<SourceCandidate>>,
    pub enriched: Option<Vec<EnrichedSource>>,
    pub report: Option<ReportOutput>,
    /// Degradable stages that fell back to their substitute artifact.
    pub degraded: Vec<StageKind>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn new(topic: impl Into<String>, options: ResearchOptions) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            topic: topic.into(),
            options,
            phase: PipelinePhase::Idle,
            plan: None,
            sources: None,
            enriched: None,
            report: None,
            degraded: Vec::new(),
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, refusing anything outside the fixed sequence.
    pub fn transition(&mut self, next: PipelinePhase) -> Result<(), PipelineError> {
        if !self.phase.can_transition_to(next) {
            return Err(PipelineError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the error and move to `Failed`.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), PipelineError> {
        self.error = Some(error.into());
        self.transition(PipelinePhase::Failed)
    }

    pub fn mark_degraded(&mut self, stage: StageKind) {
        if !self.degraded.contains(&stage) {
            self.degraded.push(stage);
        }
        self.updated_at = Utc::now();
    }

    /// Store the artifact `stage` produced. The artifact must match the stage.
    pub fn apply(&mut self, stage: StageKind, artifact: Artifact) -> Result<(), PipelineError> {
        if artifact.kind() != stage {
            return Err(PipelineError::UnexpectedArtifact {
                stage,
                produced: artifact.kind(),
            });
        }
        match artifact {
            Artifact::Plan(plan) => self.plan = Some(plan),
            Artifact::Sources(sources) => self.sources = Some(sources),
            Artifact::Enriched(enriched) => self.enriched = Some(enriched),
            Artifact::Report(report) => self.report = Some(report),
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn require_plan(&self, stage: StageKind) -> Result<&Plan, PipelineError> {
        self.plan.as_ref().ok_or(PipelineError::MissingArtifact {
            stage,
            artifact: "plan",
        })
    }

    pub fn require_sources(&self, stage: StageKind) -> Result<&[SourceCandidate], PipelineError> {
        self.sources
            .as_deref()
            .ok_or(PipelineError::MissingArtifact {
                stage,
                artifact: "sources",
            })
    }

    pub fn require_enriched(&self, stage: StageKind) -> Result<&[EnrichedSource], PipelineError> {
        self.enriched
            .as_deref()
            .ok_or(PipelineError::MissingArtifact {
                stage,
                artifact: "enriched sources",
            })
    }

    /// Persist the state as `<dir>/<run_id>.json`.
    pub fn save(&self, dir: &Path) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));
        crate::persistence::atomic_write_json(&path, self)
    }

    /// Load a state saved with [`PipelineState::save`].
    pub fn load(dir: &Path, run_id: &Uuid) -> Result<Self, std::io::Error> {
        crate::persistence::load_json(&dir.join(format!("{run_id}.json")))
    }
}
