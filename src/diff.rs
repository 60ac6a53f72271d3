//! Parsing of `git diff` output into per-file records.

use crate::types::{ChangeStatus, DiffRecord};

/// Parse a unified git diff into one [`DiffRecord`] per file.
pub fn parse_diff(diff: &str) -> Vec<DiffRecord> {
   let mut records = Vec::new();
   let mut current: Option<DiffRecord> = None;

   for line in diff.lines() {
      if line.starts_with("diff --git") {
         if let Some(record) = current.take() {
            records.push(record);
         }

         // `diff --git a/<path> b/<path>`; split on the ` b/` marker rather
         // than whitespace so paths containing spaces survive
         let file_name = line
            .strip_prefix("diff --git a/")
            .and_then(|rest| rest.rfind(" b/").map(|at| rest[at + 3..].to_string()))
            .unwrap_or_else(|| "unknown".to_string());

         current = Some(DiffRecord {
            file_name,
            status: ChangeStatus::Modified,
            diff_text: String::from(line),
         });
      } else if let Some(ref mut record) = current {
         // Status markers appear in the extended header before any hunk
         if line.starts_with("new file mode") {
            record.status = ChangeStatus::Added;
         } else if line.starts_with("deleted file mode") {
            record.status = ChangeStatus::Deleted;
         } else if line.starts_with("rename from") {
            record.status = ChangeStatus::Renamed;
         } else if let Some(to) = line.strip_prefix("rename to ") {
            // The post-rename path is the one worth summarizing under
            record.file_name = to.trim().to_string();
         }

         record.diff_text.push('\n');
         record.diff_text.push_str(line);
      }
   }

   if let Some(record) = current {
      records.push(record);
   }

   records
}
