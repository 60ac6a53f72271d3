use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Commit type vocabulary ===

/// The fixed Conventional Commits type vocabulary. A template policy may
/// permit additional types on top of these.
pub const COMMIT_TYPES: &[&str] = &[
   "feat", "fix", "docs", "style", "refactor", "perf", "test", "build", "ci", "chore",
];

// === Pipeline inputs ===

/// Change status of a file in the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
   Added,
   Modified,
   Deleted,
   Renamed,
   Untracked,
   Ignored,
}

impl fmt::Display for ChangeStatus {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let s = match self {
         Self::Added => "added",
         Self::Modified => "modified",
         Self::Deleted => "deleted",
         Self::Renamed => "renamed",
         Self::Untracked => "untracked",
         Self::Ignored => "ignored",
      };
      f.write_str(s)
   }
}

/// One changed file's diff. Immutable input, one per file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffRecord {
   pub file_name: String,
   pub status:    ChangeStatus,
   pub diff_text: String,
}

// === Stage outputs ===

/// Per-file summary produced by the fan-out stage, 1:1 with input diffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
   pub file:     String,
   pub status:   ChangeStatus,
   pub summary:  String,
   #[serde(default)]
   pub breaking: bool,
}

impl FileSummary {
   /// Deterministic fallback when a diff could not be summarized. One
   /// unsummarizable file must never block commit generation.
   pub fn placeholder(record: &DiffRecord) -> Self {
      Self {
         file:     record.file_name.clone(),
         status:   record.status,
         summary:  "minor update".to_string(),
         breaking: false,
      }
   }
}

/// Where the breaking-change marker should live in an assembled message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakingMarker {
   /// `!` after the type/scope in the header.
   Bang,
   /// A `BREAKING CHANGE:` footer, no header marker.
   Footer,
   /// Header `!` unless the draft already carries a breaking footer.
   #[default]
   Either,
}

/// Header constraints extracted from a user template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderPolicy {
   pub require_scope:   bool,
   pub breaking_marker: BreakingMarker,
}

/// Body structure constraints extracted from a user template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyPolicy {
   pub sections:     Vec<String>,
   pub bullet_style: Option<String>,
   pub require_body: bool,
}

/// A footer the template requires on every commit.
#[derive(Debug, Clone, Serialize)]
pub struct FooterRule {
   pub token:      String,
   pub value_hint: Option<String>,
}

impl<'de> Deserialize<'de> for FooterRule {
   fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
   where
      D: serde::Deserializer<'de>,
   {
      // Models sometimes flatten rules to plain strings ("Refs: <issue>").
      let value = Value::deserialize(deserializer)?;
      match value {
         Value::String(s) => {
            let (token, hint) = match s.split_once(':') {
               Some((t, h)) if !h.trim().is_empty() => {
                  (t.trim().to_string(), Some(h.trim().to_string()))
               },
               _ => (s.trim().trim_end_matches(':').to_string(), None),
            };
            Ok(Self { token, value_hint: hint })
         },
         Value::Object(map) => {
            let token = map
               .get("token")
               .and_then(Value::as_str)
               .map(str::to_string)
               .ok_or_else(|| serde::de::Error::custom("footer rule missing 'token'"))?;
            let value_hint = map
               .get("value_hint")
               .and_then(Value::as_str)
               .map(str::to_string);
            Ok(Self { token, value_hint })
         },
         other => Err(serde::de::Error::custom(format!(
            "invalid footer rule: {other}"
         ))),
      }
   }
}

/// Structured constraints extracted from a free-text commit template.
/// Present only when the user supplied a template; immutable once extracted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatePolicy {
   pub header:      HeaderPolicy,
   pub body:        BodyPolicy,
   pub footers:     Vec<FooterRule>,
   pub tone:        Option<String>,
   pub extra_types: Vec<String>,
}

/// Classification + draft produced by the drafting stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftResult {
   #[serde(rename = "type")]
   pub commit_type: String,

   #[serde(default, deserialize_with = "deserialize_optional_string")]
   pub scope: Option<String>,

   #[serde(default)]
   pub breaking: bool,

   pub description: String,

   #[serde(default, deserialize_with = "deserialize_optional_string")]
   pub body: Option<String>,

   #[serde(default, deserialize_with = "deserialize_string_vec")]
   pub footers: Vec<String>,

   /// Flattened full message. Optional in replies; always re-derivable from
   /// the structured fields via `assemble_message`.
   #[serde(default, deserialize_with = "deserialize_optional_string")]
   pub commit_message: Option<String>,

   #[serde(default, deserialize_with = "deserialize_optional_string")]
   pub notes: Option<String>,
}

impl DraftResult {
   /// Deterministically reassemble the flattened message from the structured
   /// fields. Produces byte-identical output to a model-provided
   /// `commit_message` when both are present and consistent; exists purely as
   /// a safety net for partial replies.
   pub fn assemble_message(&self, marker: BreakingMarker) -> String {
      let mut footers: Vec<String> = self
         .footers
         .iter()
         .map(|f| f.trim().to_string())
         .filter(|f| !f.is_empty())
         .collect();

      let has_breaking_footer = footers.iter().any(|f| {
         f.starts_with("BREAKING CHANGE:") || f.starts_with("BREAKING-CHANGE:")
      });

      let bang = self.breaking
         && match marker {
            BreakingMarker::Bang => true,
            BreakingMarker::Footer => false,
            BreakingMarker::Either => !has_breaking_footer,
         };

      // Invariant: a breaking draft carries the marker somewhere — header
      // `!` or a BREAKING CHANGE footer, never neither.
      if self.breaking && !bang && !has_breaking_footer {
         footers.push(format!("BREAKING CHANGE: {}", self.description.trim()));
      }

      let mut message = String::with_capacity(128);
      message.push_str(self.commit_type.trim());
      if let Some(scope) = &self.scope
         && !scope.trim().is_empty()
      {
         message.push('(');
         message.push_str(scope.trim());
         message.push(')');
      }
      if bang {
         message.push('!');
      }
      message.push_str(": ");
      message.push_str(self.description.trim());

      if let Some(body) = &self.body
         && !body.trim().is_empty()
      {
         message.push_str("\n\n");
         message.push_str(body.trim());
      }

      if !footers.is_empty() {
         message.push_str("\n\n");
         message.push_str(&footers.join("\n"));
      }

      message
   }

   /// The flattened message: the model's own `commit_message` when supplied,
   /// otherwise the deterministic reassembly.
   pub fn message(&self, marker: BreakingMarker) -> String {
      match &self.commit_message {
         Some(m) if !m.trim().is_empty() => m.trim().to_string(),
         _ => self.assemble_message(marker),
      }
   }
}

/// Outcome of the checklist validation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
   Valid,
   Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
   pub status: ValidationStatus,

   pub commit_message: String,

   #[serde(default, deserialize_with = "deserialize_string_vec")]
   pub violations: Vec<String>,

   #[serde(default, deserialize_with = "deserialize_optional_string")]
   pub notes: Option<String>,
}

// === Final output ===

/// Audit trail of the intermediate artifacts a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RawArtifacts {
   pub draft:                DraftResult,
   pub classification_notes: Option<String>,
   pub validation_notes:     Option<String>,
   pub template_policy:      Option<TemplatePolicy>,
}

/// Externally visible result of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
   pub commit_message: String,
   pub file_summaries: Vec<FileSummary>,
   /// True when a fail-open stage (validator) had to be skipped; the message
   /// is still usable but went out without that check.
   pub degraded:       bool,
   pub raw:            RawArtifacts,
}

// === Lenient deserializers for model slop ===

/// Accept a string, `null`, or the literal string "null" as `Option<String>`.
fn deserialize_optional_string<'de, D>(
   deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
   D: serde::Deserializer<'de>,
{
   let value = Option::<String>::deserialize(deserializer)?;
   Ok(value.and_then(|s| {
      let trimmed = s.trim();
      if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
         None
      } else {
         Some(trimmed.to_string())
      }
   }))
}

/// Accept an array of strings, a single string (split by lines), or `null`.
fn deserialize_string_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
   D: serde::Deserializer<'de>,
{
   let value = Value::deserialize(deserializer)?;
   Ok(value_to_string_vec(value))
}

fn value_to_string_vec(value: Value) -> Vec<String> {
   match value {
      Value::Null => Vec::new(),
      Value::String(s) => s
         .lines()
         .map(str::trim)
         .filter(|l| !l.is_empty())
         .map(str::to_string)
         .collect(),
      Value::Array(arr) => arr
         .into_iter()
         .flat_map(value_to_string_vec)
         .collect(),
      other => vec![other.to_string()],
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn draft(breaking: bool) -> DraftResult {
      DraftResult {
         commit_type:    "feat".to_string(),
         scope:          Some("api".to_string()),
         breaking,
         description:    "add batch endpoint".to_string(),
         body:           Some("Allows clients to submit many jobs at once.".to_string()),
         footers:        vec!["Refs: #42".to_string()],
         commit_message: None,
         notes:          None,
      }
   }

   #[test]
   fn test_assemble_minimal_header() {
      let d = DraftResult {
         commit_type:    "feat".to_string(),
         scope:          None,
         breaking:       false,
         description:    "add X".to_string(),
         body:           None,
         footers:        vec![],
         commit_message: None,
         notes:          None,
      };
      assert_eq!(d.assemble_message(BreakingMarker::Either), "feat: add X");
   }

   #[test]
   fn test_assemble_full_layout() {
      let msg = draft(false).assemble_message(BreakingMarker::Either);
      assert_eq!(
         msg,
         "feat(api): add batch endpoint\n\nAllows clients to submit many jobs at once.\n\nRefs: #42"
      );
   }

   #[test]
   fn test_assemble_breaking_uses_bang() {
      let msg = draft(true).assemble_message(BreakingMarker::Either);
      assert!(msg.starts_with("feat(api)!: add batch endpoint"));
   }

   #[test]
   fn test_assemble_breaking_footer_preference_synthesizes_footer() {
      let msg = draft(true).assemble_message(BreakingMarker::Footer);
      assert!(!msg.lines().next().unwrap().contains('!'));
      assert!(msg.contains("BREAKING CHANGE: add batch endpoint"));
   }

   #[test]
   fn test_assemble_breaking_never_neither() {
      // With all structured fields populated and breaking=true, the message
      // carries `!` or a BREAKING CHANGE footer under every marker policy.
      for marker in [BreakingMarker::Bang, BreakingMarker::Footer, BreakingMarker::Either] {
         let msg = draft(true).assemble_message(marker);
         let header_bang = msg.lines().next().unwrap().contains('!');
         let footer = msg.contains("BREAKING CHANGE");
         assert!(header_bang || footer, "marker {marker:?} produced neither");
      }
   }

   #[test]
   fn test_assemble_existing_breaking_footer_suppresses_bang() {
      let mut d = draft(true);
      d.footers.push("BREAKING CHANGE: batch jobs replace single submit".to_string());
      let msg = d.assemble_message(BreakingMarker::Either);
      assert!(!msg.lines().next().unwrap().contains('!'));
      // No second synthesized footer
      assert_eq!(msg.matches("BREAKING CHANGE").count(), 1);
   }

   #[test]
   fn test_message_prefers_model_provided() {
      let mut d = draft(false);
      d.commit_message = Some("feat(api): add batch endpoint".to_string());
      assert_eq!(d.message(BreakingMarker::Either), "feat(api): add batch endpoint");
   }

   #[test]
   fn test_message_reconstruction_matches_consistent_flattened() {
      // A consistent model-provided message and the reassembly agree byte
      // for byte.
      let mut d = draft(false);
      let assembled = d.assemble_message(BreakingMarker::Either);
      d.commit_message = Some(assembled.clone());
      assert_eq!(d.message(BreakingMarker::Either), assembled);
   }

   #[test]
   fn test_draft_deserialize_scope_null_string() {
      let json = r#"{"type":"feat","scope":"null","description":"add X"}"#;
      let d: DraftResult = serde_json::from_str(json).unwrap();
      assert!(d.scope.is_none());
   }

   #[test]
   fn test_draft_deserialize_footers_as_string() {
      let json = r#"{"type":"fix","description":"fix it","footers":"Refs: #1\nRefs: #2"}"#;
      let d: DraftResult = serde_json::from_str(json).unwrap();
      assert_eq!(d.footers, vec!["Refs: #1", "Refs: #2"]);
   }

   #[test]
   fn test_footer_rule_from_string() {
      let rule: FooterRule = serde_json::from_str(r#""Refs: <issue number>""#).unwrap();
      assert_eq!(rule.token, "Refs");
      assert_eq!(rule.value_hint.as_deref(), Some("<issue number>"));

      let bare: FooterRule = serde_json::from_str(r#""Signed-off-by""#).unwrap();
      assert_eq!(bare.token, "Signed-off-by");
      assert!(bare.value_hint.is_none());
   }

   #[test]
   fn test_template_policy_defaults() {
      let policy: TemplatePolicy = serde_json::from_str("{}").unwrap();
      assert!(!policy.header.require_scope);
      assert_eq!(policy.header.breaking_marker, BreakingMarker::Either);
      assert!(policy.footers.is_empty());
      assert!(policy.extra_types.is_empty());
   }

   #[test]
   fn test_placeholder_summary_is_deterministic() {
      let record = DiffRecord {
         file_name: "src/lib.rs".to_string(),
         status:    ChangeStatus::Modified,
         diff_text: "@@ -1 +1 @@".to_string(),
      };
      let s = FileSummary::placeholder(&record);
      assert_eq!(s.file, "src/lib.rs");
      assert_eq!(s.summary, "minor update");
      assert!(!s.breaking);
   }

   #[test]
   fn test_validation_result_lenient_violations() {
      let json = r#"{"status":"fixed","commit_message":"feat: x","violations":null}"#;
      let v: ValidationResult = serde_json::from_str(json).unwrap();
      assert_eq!(v.status, ValidationStatus::Fixed);
      assert!(v.violations.is_empty());
   }
}
