//! Commit message synthesis pipeline.
//!
//! Turns a set of per-file diffs into a single Conventional Commits message
//! through staged, schema-validated LLM calls: concurrent per-file
//! summaries, optional template policy extraction, drafting, checklist
//! validation, a local strict header check, and target-language enforcement.

pub mod api;
pub mod chat;
pub mod config;
pub mod diff;
pub mod draft;
pub mod error;
pub mod executor;
pub mod json;
pub mod language;
pub mod pipeline;
pub mod schema;
pub mod strict;
pub mod style;
pub mod summarize;
pub mod template_policy;
pub mod templates;
pub mod types;
pub mod validate;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types
pub use chat::{ChatBackend, ChatMessage, RawReply};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineRequest, Stage, StageEvent};
pub use types::{DiffRecord, PipelineOutput};
