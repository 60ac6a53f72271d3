//! Extraction of JSON payloads from free-text model replies.
//!
//! Providers without transport-level schema enforcement tend to wrap the
//! object in markdown fences or conversational filler. The executor runs
//! every text reply through `extract_json` before parsing.

/// Pull the JSON object out of a possibly-wrapped model reply.
///
/// Tries, in order: a ```` ```json ```` fenced block, a bare fenced block
/// whose body starts with `{`, then balanced-brace scanning over the whole
/// reply. Returns the trimmed input unchanged when nothing better is found —
/// the subsequent parse failure produces the corrective feedback.
pub fn extract_json(reply: &str) -> String {
   let trimmed = reply.trim();

   if let Some(start) = trimmed.find("```json")
      && let Some(end) = trimmed[start + 7..].find("```")
   {
      return trimmed[start + 7..start + 7 + end].trim().to_string();
   }

   if let Some(start) = trimmed.find("```")
      && let Some(end) = trimmed[start + 3..].find("```")
   {
      let inner = trimmed[start + 3..start + 3 + end].trim();
      if inner.starts_with('{') {
         return inner.to_string();
      }
   }

   if let Some(found) = first_json_object(trimmed) {
      return found;
   }

   trimmed.to_string()
}

/// Scan for the first substring that parses as a JSON object.
///
/// For each `{` in the input, tries a direct parse of the remainder first
/// (serde tolerates nothing trailing, so this catches clean objects), then
/// falls back to balanced-brace extraction for objects embedded in prose.
fn first_json_object(text: &str) -> Option<String> {
   for (start, _) in text.match_indices('{') {
      let candidate = &text[start..];

      if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
         return Some(candidate.to_string());
      }

      if let Some(balanced) = balanced_object(candidate)
         && serde_json::from_str::<serde_json::Value>(balanced).is_ok()
      {
         return Some(balanced.to_string());
      }
   }

   None
}

/// Slice out a brace-balanced prefix, respecting string literals and escapes
/// so `{"msg": "use { and } carefully"}` is cut at the right place.
fn balanced_object(text: &str) -> Option<&str> {
   let mut depth = 0usize;
   let mut in_string = false;
   let mut escaped = false;

   for (idx, ch) in text.char_indices() {
      if escaped {
         escaped = false;
         continue;
      }

      match ch {
         '\\' if in_string => escaped = true,
         '"' => in_string = !in_string,
         '{' if !in_string => depth += 1,
         '}' if !in_string => {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
               return Some(&text[..=idx]);
            }
         },
         _ => {},
      }
   }

   None
}
