//! Research pipeline orchestration.
//!
//! Runs the fixed stage sequence:
//! 1. **Plan**: decompose the topic into subtopics and queries
//! 2. **Search**: query providers with fallback, dedupe and rank
//! 3. **Enrich**: fetch and assess the most valuable sources (degradable)
//! 4. **Write**: render and store the report

pub mod observer;
pub mod orchestrator;
pub mod retry;
pub mod stage;
pub mod state;

pub use observer::{
    CompositeObserver, NoOpObserver, PipelineObserver, RecordingObserver, SnapshotObserver,
    TracingObserver,
};
pub use orchestrator::{Orchestrator, StageSet};
pub use retry::with_retry;
pub use stage::{Artifact, Stage};
pub use state::{PipelinePhase, PipelineState};
