//! Reply schemas for each pipeline stage.
//!
//! Every model call is governed by a [`RequestKind`]: one variant per stage,
//! so the executor's dispatch is exhaustive at compile time instead of a
//! string-keyed lookup. `validate` is intentionally cheap and local — it
//! rejects structurally broken replies so the executor can feed the error
//! back to the model and retry.

use std::fmt;

use serde_json::Value;

use crate::types::COMMIT_TYPES;

/// Maximum words allowed in a per-file summary.
pub const SUMMARY_WORD_LIMIT: usize = 18;

/// Discriminator selecting which reply shape governs a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
   /// One-file diff summary (`FileSummary` shape).
   Summary,
   /// Free-text commit template → structured policy.
   TemplatePolicy,
   /// Classification + draft of the full commit message. Carries the extra
   /// commit types a template policy permits beyond the standard vocabulary.
   Draft { extra_types: Vec<String> },
   /// Checklist validation / repair of a drafted message.
   Fix,
   /// Corrective rewrite after the local header check failed.
   StrictFix,
   /// Rewrite of narrative text into the requested language.
   LanguageFix,
}

impl RequestKind {
   pub const fn name(&self) -> &'static str {
      match self {
         Self::Summary => "summary",
         Self::TemplatePolicy => "template_policy",
         Self::Draft { .. } => "draft",
         Self::Fix => "fix",
         Self::StrictFix => "strict_fix",
         Self::LanguageFix => "language_fix",
      }
   }
}

impl fmt::Display for RequestKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.name())
   }
}

/// Validate a parsed reply against the schema bound to `kind`.
///
/// Returns the concrete violation on failure so the executor can inject it
/// back into the conversation as corrective feedback.
pub fn validate(kind: &RequestKind, value: &Value) -> std::result::Result<(), String> {
   let obj = value
      .as_object()
      .ok_or_else(|| format!("expected a JSON object, got {}", type_name(value)))?;

   match kind {
      RequestKind::Summary => {
         require_nonempty_str(obj, "file")?;
         let summary = require_nonempty_str(obj, "summary")?;
         let words = summary.split_whitespace().count();
         if words > SUMMARY_WORD_LIMIT {
            return Err(format!(
               "'summary' has {words} words, maximum is {SUMMARY_WORD_LIMIT}"
            ));
         }
         optional_bool(obj, "breaking")?;
         Ok(())
      },
      RequestKind::TemplatePolicy => {
         // The policy is deliberately loose: every field is optional, but
         // those present must have the right shape.
         optional_string_array(obj, "extra_types")?;
         optional_str(obj, "tone")?;
         if let Some(header) = obj.get("header")
            && !header.is_null()
            && !header.is_object()
         {
            return Err("'header' must be an object".to_string());
         }
         if let Some(body) = obj.get("body")
            && !body.is_null()
            && !body.is_object()
         {
            return Err("'body' must be an object".to_string());
         }
         if let Some(footers) = obj.get("footers")
            && !footers.is_null()
            && !footers.is_array()
         {
            return Err("'footers' must be an array".to_string());
         }
         Ok(())
      },
      RequestKind::Draft { extra_types } => {
         let commit_type = require_nonempty_str(obj, "type")?;
         if !commit_type.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(format!(
               "'type' must be lowercase ASCII letters, got '{commit_type}'"
            ));
         }
         if !COMMIT_TYPES.contains(&commit_type)
            && !extra_types.iter().any(|t| t == commit_type)
         {
            let mut allowed: Vec<&str> = COMMIT_TYPES.to_vec();
            allowed.extend(extra_types.iter().map(String::as_str));
            return Err(format!(
               "'type' must be one of: {}, got '{commit_type}'",
               allowed.join(", ")
            ));
         }
         require_nonempty_str(obj, "description")?;
         if let Some(scope) = optional_str(obj, "scope")?
            && !scope.is_empty()
            && !scope
               .chars()
               .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
         {
            return Err(format!("'scope' contains invalid characters: '{scope}'"));
         }
         optional_bool(obj, "breaking")?;
         optional_str(obj, "body")?;
         optional_string_array(obj, "footers")?;
         optional_str(obj, "commit_message")?;
         optional_str(obj, "notes")?;
         Ok(())
      },
      RequestKind::Fix => {
         let status = require_nonempty_str(obj, "status")?;
         if status != "valid" && status != "fixed" {
            return Err(format!("'status' must be \"valid\" or \"fixed\", got '{status}'"));
         }
         require_nonempty_str(obj, "commit_message")?;
         optional_string_array(obj, "violations")?;
         optional_str(obj, "notes")?;
         Ok(())
      },
      RequestKind::StrictFix | RequestKind::LanguageFix => {
         require_nonempty_str(obj, "commit_message")?;
         Ok(())
      },
   }
}

/// Machine-readable restatement of the expected reply shape, injected into
/// the conversation after a rejected attempt.
pub fn expected_shape(kind: &RequestKind) -> String {
   match kind {
      RequestKind::Summary => format!(
         r#"{{"file": "<path>", "summary": "<what changed, at most {SUMMARY_WORD_LIMIT} words>", "breaking": <bool>}}"#
      ),
      RequestKind::TemplatePolicy => concat!(
         r#"{"header": {"require_scope": <bool>, "breaking_marker": "bang"|"footer"|"either"}, "#,
         r#""body": {"sections": ["<name>"], "bullet_style": "<marker>"|null, "require_body": <bool>}, "#,
         r#""footers": [{"token": "<Token>", "value_hint": "<hint>"|null}], "#,
         r#""tone": "<lexical tone>"|null, "extra_types": ["<type>"]}"#
      )
      .to_string(),
      RequestKind::Draft { extra_types } => {
         let mut allowed: Vec<&str> = COMMIT_TYPES.to_vec();
         allowed.extend(extra_types.iter().map(String::as_str));
         format!(
            concat!(
               r#"{{"type": "{}", "scope": "<scope>"|null, "breaking": <bool>, "#,
               r#""description": "<imperative summary>", "body": "<body text>"|null, "#,
               r#""footers": ["<Token>: <value>"], "commit_message": "<full message>"|null, "#,
               r#""notes": "<classification notes>"|null}}"#
            ),
            allowed.join("\"|\"")
         )
      },
      RequestKind::Fix => concat!(
         r#"{"status": "valid"|"fixed", "commit_message": "<message>", "#,
         r#""violations": ["<rule broken>"], "notes": "<notes>"|null}"#
      )
      .to_string(),
      RequestKind::StrictFix | RequestKind::LanguageFix => {
         r#"{"commit_message": "<corrected full message>"}"#.to_string()
      },
   }
}

fn type_name(value: &Value) -> &'static str {
   match value {
      Value::Null => "null",
      Value::Bool(_) => "a boolean",
      Value::Number(_) => "a number",
      Value::String(_) => "a string",
      Value::Array(_) => "an array",
      Value::Object(_) => "an object",
   }
}

fn require_nonempty_str<'a>(
   obj: &'a serde_json::Map<String, Value>,
   key: &str,
) -> std::result::Result<&'a str, String> {
   let value = obj
      .get(key)
      .ok_or_else(|| format!("missing required field '{key}'"))?;
   let s = value
      .as_str()
      .ok_or_else(|| format!("'{key}' must be a string, got {}", type_name(value)))?;
   if s.trim().is_empty() {
      return Err(format!("'{key}' must not be empty"));
   }
   Ok(s)
}

fn optional_str<'a>(
   obj: &'a serde_json::Map<String, Value>,
   key: &str,
) -> std::result::Result<Option<&'a str>, String> {
   match obj.get(key) {
      None | Some(Value::Null) => Ok(None),
      Some(Value::String(s)) => Ok(Some(s)),
      Some(other) => Err(format!("'{key}' must be a string, got {}", type_name(other))),
   }
}

fn optional_bool(
   obj: &serde_json::Map<String, Value>,
   key: &str,
) -> std::result::Result<(), String> {
   match obj.get(key) {
      None | Some(Value::Null | Value::Bool(_)) => Ok(()),
      Some(other) => Err(format!("'{key}' must be a boolean, got {}", type_name(other))),
   }
}

fn optional_string_array(
   obj: &serde_json::Map<String, Value>,
   key: &str,
) -> std::result::Result<(), String> {
   match obj.get(key) {
      None | Some(Value::Null) => Ok(()),
      Some(Value::Array(items)) => {
         if items.iter().all(Value::is_string) || items.iter().all(Value::is_object) {
            Ok(())
         } else {
            Err(format!("'{key}' must be an array of strings"))
         }
      },
      Some(other) => Err(format!("'{key}' must be an array, got {}", type_name(other))),
   }
}
