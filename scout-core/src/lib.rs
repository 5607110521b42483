//! # Scout Core
//!
//! Core library for the Scout research pipeline.
//! Provides the orchestrator, the four pipeline stages (planner, searcher,
//! enrichment, writer), the relevance scorer, the tool client abstraction,
//! configuration, and fundamental types.

pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod persistence;
pub mod pipeline;
pub mod relevance;
pub mod research;
pub mod types;

// Re-export commonly used types at the crate root.
pub use client::{CallErrorKind, ExecutionMode, ToolCallResult, ToolClient};
pub use config::{ScoutConfig, load_config};
pub use error::{Result, ScoutError};
pub use pipeline::{Orchestrator, PipelineObserver, PipelinePhase, PipelineState, Stage, StageSet};
pub use research::{Enricher, MarkdownRenderer, Planner, ReportRenderer, Searcher, Writer};
pub use types::{
    EnrichedSource, EnrichmentStatus, Plan, ResearchOptions, RunSummary, SearchQuery, SkipReason,
    SourceCandidate, StageKind,
};
