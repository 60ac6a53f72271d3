//! Classification and drafting of the commit message.
//!
//! The one stage with no fallback: everything downstream is refinement of
//! its output, so a draft that never conforms fails the run.

use crate::{
   chat::ChatMessage,
   config::PipelineConfig,
   error::Result,
   executor::StructuredCallExecutor,
   schema::RequestKind,
   templates,
   types::{BreakingMarker, DraftResult, FileSummary, TemplatePolicy},
};

/// Draft a commit message from the per-file summaries.
///
/// The returned draft always has `commit_message` populated: the model's own
/// flattened message when it supplied one, otherwise the deterministic
/// reassembly from the structured fields.
pub fn draft_commit(
   executor: &StructuredCallExecutor,
   config: &PipelineConfig,
   summaries: &[FileSummary],
   policy: Option<&TemplatePolicy>,
   repo_context: Option<&str>,
) -> Result<DraftResult> {
   let kind = RequestKind::Draft {
      extra_types: policy.map(|p| p.extra_types.clone()).unwrap_or_default(),
   };

   let conversation = vec![
      ChatMessage::system(templates::render_system_prompt(
         config.target_language.as_deref(),
      )?),
      ChatMessage::user(templates::render_draft_prompt(summaries, policy, repo_context)?),
   ];

   let value = executor.execute(&kind, &conversation)?;
   let mut draft: DraftResult = serde_json::from_value(value)?;

   let marker = policy.map_or(BreakingMarker::default(), |p| p.header.breaking_marker);
   draft.commit_message = Some(draft.message(marker));

   Ok(draft)
}
