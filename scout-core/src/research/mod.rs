//! The four pipeline stages.
//!
//! Each stage is usable on its own and also implements
//! [`Stage`](crate::pipeline::Stage) for the orchestrator.

pub mod enrichment;
pub mod planner;
pub mod searcher;
pub mod writer;

pub use enrichment::Enricher;
pub use planner::Planner;
pub use searcher::Searcher;
pub use writer::{MarkdownRenderer, ReportInput, ReportRenderer, Writer};
