//! The stage abstraction the orchestrator sequences.

use super::state::PipelineState;
use crate::error::Result;
use crate::types::{EnrichedSource, Plan, ReportOutput, SourceCandidate, StageKind};
use async_trait::async_trait;

/// What a stage hands to the next one.
#[derive(Debug, Clone)]
pub enum Artifact {
    Plan(Plan),
    Sources(Vec<SourceCandidate>),
    Enriched(Vec<EnrichedSource>),
    Report(ReportOutput),
}

impl Artifact {
    /// The stage kind that produces this artifact.
    pub fn kind(&self) -> StageKind {
        match self {
            Artifact::Plan(_) => StageKind::Plan,
            Artifact::Sources(_) => StageKind::Search,
            Artifact::Enriched(_) => StageKind::Enrich,
            Artifact::Report(_) => StageKind::Write,
        }
    }
}

/// One phase of the pipeline.
///
/// `run` reads earlier artifacts from the state and returns a new one; it
/// never mutates the state itself.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, state: &PipelineState) -> Result<Artifact>;

    /// Substitute artifact used when a degradable stage fails as a whole.
    fn fallback(&self, _state: &PipelineState) -> Option<Artifact> {
        None
    }
}
