//! Extraction of structured constraints from a free-text commit template.
//!
//! Strictly optional and fail-open: a malformed template, or a model that
//! never produces a usable policy, degrades the run to no policy rather than
//! failing it. Only cancellation propagates.

use crate::{
   chat::ChatMessage,
   config::PipelineConfig,
   error::Result,
   executor::StructuredCallExecutor,
   schema::RequestKind,
   templates,
   types::TemplatePolicy,
};

/// Extract a [`TemplatePolicy`] from the user's template text.
///
/// Returns `Ok(None)` when no template was given or extraction failed for
/// any non-cancellation reason.
pub fn extract_policy(
   executor: &StructuredCallExecutor,
   config: &PipelineConfig,
   template: Option<&str>,
) -> Result<Option<TemplatePolicy>> {
   let Some(template) = template else {
      return Ok(None);
   };
   if template.trim().is_empty() {
      return Ok(None);
   }

   let conversation = vec![
      ChatMessage::system(templates::render_system_prompt(
         config.target_language.as_deref(),
      )?),
      ChatMessage::user(templates::render_template_policy_prompt(template)?),
   ];

   match executor.execute(&RequestKind::TemplatePolicy, &conversation) {
      Ok(value) => {
         // The schema only checks field shapes, so deserialization can
         // still trip over exotic nesting. That too is fail-open.
         match serde_json::from_value::<TemplatePolicy>(value) {
            Ok(policy) => Ok(Some(policy)),
            Err(_) => Ok(None),
         }
      },
      Err(e) if e.is_cancelled() => Err(e),
      Err(_) => Ok(None),
   }
}
