//! Local, model-free enforcement of the Conventional Commits header.
//!
//! The header is the one part of the message downstream tooling parses
//! mechanically, so it is checked here with plain string code instead of
//! trusting the validator's judgement. A failing header gets exactly one
//! corrective model call; if the rewrite still fails the check, the run
//! errors rather than emitting a malformed header.

use crate::{
   chat::ChatMessage,
   error::{PipelineError, Result},
   executor::StructuredCallExecutor,
   schema::RequestKind,
   templates,
};

/// Maximum header length in characters.
pub const MAX_HEADER_LEN: usize = 72;

/// Result of the pure header check.
#[derive(Debug, Clone)]
pub struct StrictReport {
   pub ok:       bool,
   pub problems: Vec<String>,
}

/// Check the first line of `message` against `type(scope)!?: description`.
///
/// Shape only: the type must be lowercase ASCII letters but is not checked
/// against a vocabulary, since a template policy may extend it. Softer style
/// rules (no trailing period, imperative mood) belong to the validator's
/// checklist, not here; this check guards exactly what downstream tooling
/// parses.
pub fn check_header(message: &str) -> StrictReport {
   let mut problems = Vec::new();
   let header = message.lines().next().unwrap_or("").trim_end();

   if header.is_empty() {
      return StrictReport { ok: false, problems: vec!["header line is empty".to_string()] };
   }

   if header.chars().count() > MAX_HEADER_LEN {
      problems.push(format!(
         "header is {} characters, maximum is {MAX_HEADER_LEN}",
         header.chars().count()
      ));
   }

   let Some((prefix, description)) = header.split_once(':') else {
      problems.push("header has no ': ' separating the type from the description".to_string());
      return StrictReport { ok: false, problems };
   };

   if !description.starts_with(' ') || description.trim().is_empty() {
      problems.push("description after ':' must be ' <text>'".to_string());
   }

   let prefix = prefix.strip_suffix('!').unwrap_or(prefix);

   let (commit_type, scope) = match prefix.split_once('(') {
      Some((t, rest)) => match rest.strip_suffix(')') {
         Some(scope) => (t, Some(scope)),
         None => {
            problems.push("scope parenthesis is not closed before ':'".to_string());
            (t, None)
         },
      },
      None => (prefix, None),
   };

   if commit_type.is_empty() || !commit_type.chars().all(|c| c.is_ascii_lowercase()) {
      problems.push(format!(
         "type must be lowercase ASCII letters, got '{commit_type}'"
      ));
   }

   if let Some(scope) = scope {
      if scope.is_empty() {
         problems.push("scope parentheses are present but empty".to_string());
      } else if !scope
         .chars()
         .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
      {
         problems.push(format!("scope contains invalid characters: '{scope}'"));
      }
   }

   StrictReport { ok: problems.is_empty(), problems }
}

/// Enforce the header invariant on `message`.
///
/// A passing message is returned byte-identical with zero model calls.
/// Otherwise one corrective rewrite is attempted; a rewrite that still fails
/// the check is an error — emitting a known-bad header is worse than
/// failing loudly.
pub fn enforce(
   executor: &StructuredCallExecutor,
   target_language: Option<&str>,
   message: &str,
) -> Result<String> {
   let report = check_header(message);
   if report.ok {
      return Ok(message.to_string());
   }

   let conversation = vec![
      ChatMessage::system(templates::render_system_prompt(target_language)?),
      ChatMessage::user(templates::render_strict_fix_prompt(message, &report.problems)?),
   ];

   let value = executor.execute(&RequestKind::StrictFix, &conversation)?;
   let fixed = value
      .get("commit_message")
      .and_then(serde_json::Value::as_str)
      .unwrap_or_default()
      .trim()
      .to_string();

   let recheck = check_header(&fixed);
   if recheck.ok {
      Ok(fixed)
   } else {
      Err(PipelineError::Other(format!(
         "commit header still malformed after corrective rewrite: {}",
         recheck.problems.join("; ")
      )))
   }
}
