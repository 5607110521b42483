//! # Scout Tools
//!
//! Capability implementations and the invocation client for Scout.
//!
//! - `brave-search` / `serpapi`: web search providers (`web_search`)
//! - `web-fetch`: HTTP page download (`fetch`)
//! - `research-tools`: local extraction, normalisation and quality scoring
//!
//! [`InvocationClient`] implements [`scout_core::ToolClient`] and decides per
//! call, from its [`ExecutionMode`](scout_core::ExecutionMode), whether to hit
//! the real service, synthesise a mock answer or replay a recording.

pub mod client;
pub mod fetch;
pub mod http;
pub mod mock;
pub mod recordings;
pub mod registry;
pub mod research_tools;
pub mod search;

pub use client::{InvocationClient, default_registry};
pub use recordings::{Recording, Recordings, RecordingsError};
pub use registry::{Capability, CapabilityRegistry};
pub use research_tools::ResearchTools;
