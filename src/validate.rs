//! Checklist validation of the drafted message.
//!
//! One model round-trip against a fixed format checklist, plus whatever the
//! template policy adds. Fail-open: when the call fails for any
//! non-cancellation reason the draft goes through unreviewed and the run is
//! flagged degraded.

use crate::{
   chat::ChatMessage,
   config::PipelineConfig,
   error::Result,
   executor::StructuredCallExecutor,
   schema::RequestKind,
   templates,
   types::{TemplatePolicy, ValidationResult, ValidationStatus},
};

/// Format rules the validator checks every message against.
pub const FORMAT_CHECKLIST: &str = "\
- The header is `type(scope)!?: description` with a lowercase type.
- The description is imperative and does not end with a period.
- A blank line separates the header from the body, and the body from footers.
- Footers are `Token: value` lines, one per line.
- Breaking changes carry a `!` in the header or a `BREAKING CHANGE:` footer.
- The message describes the change itself, not the process of making it.";

/// Outcome of the validation stage.
#[derive(Debug, Clone)]
pub struct ValidateOutcome {
   pub commit_message: String,
   pub notes:          Option<String>,
   /// True when validation was skipped because the call failed.
   pub degraded:       bool,
}

pub fn validate_message(
   executor: &StructuredCallExecutor,
   config: &PipelineConfig,
   commit_message: &str,
   policy: Option<&TemplatePolicy>,
) -> Result<ValidateOutcome> {
   let conversation = vec![
      ChatMessage::system(templates::render_system_prompt(
         config.target_language.as_deref(),
      )?),
      ChatMessage::user(templates::render_fix_prompt(
         commit_message,
         FORMAT_CHECKLIST,
         policy,
      )?),
   ];

   match executor.execute(&RequestKind::Fix, &conversation) {
      Ok(value) => {
         let result: ValidationResult = match serde_json::from_value(value) {
            Ok(result) => result,
            Err(_) => {
               return Ok(ValidateOutcome {
                  commit_message: commit_message.to_string(),
                  notes:          None,
                  degraded:       true,
               });
            },
         };
         let message = match result.status {
            // "valid" keeps the draft byte-identical regardless of how the
            // model echoed it back.
            ValidationStatus::Valid => commit_message.to_string(),
            ValidationStatus::Fixed => result.commit_message.trim().to_string(),
         };
         Ok(ValidateOutcome {
            commit_message: message,
            notes:          result.notes,
            degraded:       false,
         })
      },
      Err(e) if e.is_cancelled() => Err(e),
      Err(_) => Ok(ValidateOutcome {
         commit_message: commit_message.to_string(),
         notes:          None,
         degraded:       true,
      }),
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      executor::CancelToken,
      testing::{CloneArc, MockBackend},
   };

   const DRAFT: &str = "feat(api): add batch endpoint";

   fn executor_with(backend: &std::sync::Arc<MockBackend>) -> StructuredCallExecutor {
      StructuredCallExecutor::new(backend.clone_arc(), 2, CancelToken::new())
   }

   #[test]
   fn test_valid_keeps_original_message() {
      let reply = r#"{"status": "valid", "commit_message": "feat(api): add batch endpoint "}"#;
      let backend = MockBackend::from_texts(vec![reply]);
      let executor = executor_with(&backend);

      let outcome =
         validate_message(&executor, &PipelineConfig::default(), DRAFT, None).unwrap();
      assert_eq!(outcome.commit_message, DRAFT);
      assert!(!outcome.degraded);
   }

   #[test]
   fn test_fixed_takes_corrected_message() {
      let reply = r#"{
         "status": "fixed",
         "commit_message": "feat(api): add batch endpoint",
         "violations": ["description ended with a period"]
      }"#;
      let backend = MockBackend::from_texts(vec![reply]);
      let executor = executor_with(&backend);

      let outcome = validate_message(
         &executor,
         &PipelineConfig::default(),
         "feat(api): add batch endpoint.",
         None,
      )
      .unwrap();
      assert_eq!(outcome.commit_message, DRAFT);
      assert!(!outcome.degraded);
   }

   #[test]
   fn test_failure_is_fail_open_and_flagged() {
      let backend = MockBackend::from_texts(vec!["bad", "bad"]);
      let executor = executor_with(&backend);

      let outcome =
         validate_message(&executor, &PipelineConfig::default(), DRAFT, None).unwrap();
      assert_eq!(outcome.commit_message, DRAFT);
      assert!(outcome.degraded);
   }

   #[test]
   fn test_cancellation_propagates() {
      let backend = MockBackend::from_texts(vec!["{}"]);
      let cancel = CancelToken::new();
      cancel.cancel();
      let executor = StructuredCallExecutor::new(backend.clone_arc(), 2, cancel);

      let err = validate_message(&executor, &PipelineConfig::default(), DRAFT, None)
         .unwrap_err();
      assert!(err.is_cancelled());
   }
}
