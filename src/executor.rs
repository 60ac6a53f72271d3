//! Schema-validated model calls with corrective retry.
//!
//! Every model interaction in the pipeline goes through
//! [`StructuredCallExecutor::execute`]: send the conversation, parse the
//! reply, validate it against the stage's schema, and on failure feed the
//! concrete violation back to the model and try again. Callers never see a
//! malformed reply — they get a schema-conforming value or an error.

use std::sync::{
   Arc,
   atomic::{AtomicBool, Ordering},
};

use serde_json::Value;

use crate::{
   chat::{ChatBackend, ChatMessage, RawReply},
   error::{PipelineError, Result},
   json,
   schema::{self, RequestKind},
};

/// Cooperative cancellation flag shared across pipeline stages and workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
   flag: Arc<AtomicBool>,
}

impl CancelToken {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn cancel(&self) {
      self.flag.store(true, Ordering::Relaxed);
   }

   pub fn is_cancelled(&self) -> bool {
      self.flag.load(Ordering::Relaxed)
   }

   /// Error out when the token has been tripped. Checked before every model
   /// call so cancellation wins over any retry or fallback.
   pub fn check(&self) -> Result<()> {
      if self.is_cancelled() {
         Err(PipelineError::Cancelled)
      } else {
         Ok(())
      }
   }
}

pub struct StructuredCallExecutor {
   backend:      Arc<dyn ChatBackend>,
   max_attempts: u32,
   cancel:       CancelToken,
}

impl StructuredCallExecutor {
   pub fn new(backend: Arc<dyn ChatBackend>, max_attempts: u32, cancel: CancelToken) -> Self {
      Self {
         backend,
         max_attempts: max_attempts.max(1),
         cancel,
      }
   }

   pub fn cancel_token(&self) -> &CancelToken {
      &self.cancel
   }

   /// Run one structured call: up to `max_attempts` rounds of send → parse →
   /// validate, appending the rejected reply and a corrective user turn to
   /// the conversation between rounds.
   ///
   /// Transport errors propagate immediately — the retry budget is for
   /// schema violations, not for network flakiness.
   pub fn execute(&self, kind: &RequestKind, history: &[ChatMessage]) -> Result<Value> {
      let mut conversation = history.to_vec();
      let mut last_error = String::new();

      for _attempt in 0..self.max_attempts {
         self.cancel.check()?;

         let reply = self.backend.chat(&conversation, kind)?;

         let (raw_text, parsed) = match reply {
            RawReply::Structured(value) => (value.to_string(), Ok(value)),
            RawReply::Text(text) => {
               let extracted = json::extract_json(&text);
               let parsed = serde_json::from_str::<Value>(&extracted)
                  .map_err(|e| format!("reply is not valid JSON: {e}"));
               (text, parsed)
            },
         };

         let violation = match parsed {
            Ok(value) => match schema::validate(kind, &value) {
               Ok(()) => return Ok(value),
               Err(violation) => violation,
            },
            Err(parse_error) => parse_error,
         };

         conversation.push(ChatMessage::assistant(raw_text));
         conversation.push(ChatMessage::user(format!(
            "Your reply was rejected: {violation}. Respond again with only a JSON object of this exact shape: {}",
            schema::expected_shape(kind)
         )));
         last_error = violation;
      }

      Err(PipelineError::SchemaExhausted {
         kind:       kind.name().to_string(),
         attempts:   self.max_attempts,
         last_error,
      })
   }
}

#[cfg(test)]
mod tests {
   use serde_json::json;

   use super::*;
   use crate::testing::{CloneArc, MockBackend};

   fn history() -> Vec<ChatMessage> {
      vec![
         ChatMessage::system("You summarize diffs."),
         ChatMessage::user("diff --git a/a.rs b/a.rs"),
      ]
   }

   #[test]
   fn test_valid_first_attempt() {
      let backend = MockBackend::new(vec![Ok(RawReply::Text(
         r#"{"file": "a.rs", "summary": "tweak helper"}"#.to_string(),
      ))]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 3, CancelToken::new());

      let value = executor.execute(&RequestKind::Summary, &history()).unwrap();
      assert_eq!(value["file"], "a.rs");
      assert_eq!(backend.call_count(), 1);
   }

   #[test]
   fn test_retry_appends_feedback_turns() {
      let backend = MockBackend::new(vec![
         Ok(RawReply::Text("not json at all".to_string())),
         Ok(RawReply::Text(r#"{"file": "a.rs", "summary": "tweak"}"#.to_string())),
      ]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 3, CancelToken::new());

      executor.execute(&RequestKind::Summary, &history()).unwrap();

      let calls = backend.conversations();
      assert_eq!(calls.len(), 2);
      // Second call = original 2 turns + rejected assistant reply + feedback.
      assert_eq!(calls[1].len(), 4);
      assert!(matches!(calls[1][2].role, crate::chat::Role::Assistant));
      assert!(calls[1][3].content.contains("rejected"));
      assert!(calls[1][3].content.contains("\"file\""));
   }

   #[test]
   fn test_caller_history_untouched() {
      let backend = MockBackend::new(vec![
         Ok(RawReply::Text("garbage".to_string())),
         Ok(RawReply::Text(r#"{"file": "a.rs", "summary": "tweak"}"#.to_string())),
      ]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 3, CancelToken::new());

      let original = history();
      executor.execute(&RequestKind::Summary, &original).unwrap();
      assert_eq!(original.len(), 2);
   }

   #[test]
   fn test_exhaustion_after_max_attempts() {
      let backend = MockBackend::new(vec![
         Ok(RawReply::Text("bad".to_string())),
         Ok(RawReply::Text("still bad".to_string())),
         Ok(RawReply::Text("worse".to_string())),
      ]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 3, CancelToken::new());

      let err = executor.execute(&RequestKind::Summary, &history()).unwrap_err();
      match err {
         PipelineError::SchemaExhausted { kind, attempts, .. } => {
            assert_eq!(kind, "summary");
            assert_eq!(attempts, 3);
         },
         other => panic!("expected SchemaExhausted, got {other}"),
      }
      assert_eq!(backend.call_count(), 3);
   }

   #[test]
   fn test_structured_reply_still_validated() {
      // Transport-level enforcement does not bypass local validation.
      let backend = MockBackend::new(vec![
         Ok(RawReply::Structured(json!({"summary": "missing file field"}))),
         Ok(RawReply::Structured(json!({"file": "a.rs", "summary": "tweak"}))),
      ]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 3, CancelToken::new());

      let value = executor.execute(&RequestKind::Summary, &history()).unwrap();
      assert_eq!(value["file"], "a.rs");
      assert_eq!(backend.call_count(), 2);
   }

   #[test]
   fn test_transport_error_propagates_without_retry() {
      let backend = MockBackend::new(vec![
         Err(PipelineError::ApiError { status: 503, body: "overloaded".to_string() }),
         Ok(RawReply::Text(r#"{"file": "a.rs", "summary": "tweak"}"#.to_string())),
      ]);
      let executor =
         StructuredCallExecutor::new(backend.clone_arc(), 3, CancelToken::new());

      let err = executor.execute(&RequestKind::Summary, &history()).unwrap_err();
      assert!(matches!(err, PipelineError::ApiError { status: 503, .. }));
      assert_eq!(backend.call_count(), 1);
   }

   #[test]
   fn test_cancelled_before_first_call() {
      let backend = MockBackend::new(vec![Ok(RawReply::Text("{}".to_string()))]);
      let cancel = CancelToken::new();
      cancel.cancel();
      let executor = StructuredCallExecutor::new(backend.clone_arc(), 3, cancel);

      let err = executor.execute(&RequestKind::Summary, &history()).unwrap_err();
      assert!(err.is_cancelled());
      assert_eq!(backend.call_count(), 0);
   }
}
