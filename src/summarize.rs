//! Per-file diff summaries, fanned out over a bounded worker pool.
//!
//! Workers pull indices from a shared queue until it drains, so a handful of
//! slow files never idles the pool. Output order always matches input order,
//! one summary per diff. A file whose summary call fails gets a deterministic
//! placeholder instead of blocking the run; cancellation is the one failure
//! that wins over the placeholder.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

use crate::{
   config::PipelineConfig,
   error::{PipelineError, Result},
   executor::StructuredCallExecutor,
   schema::RequestKind,
   templates,
   types::{DiffRecord, FileSummary},
};

const MIN_WORKERS: usize = 4;
const MAX_WORKERS: usize = 8;

/// Pool size: the configured value clamped to [4, 8], never more threads
/// than files.
fn worker_count(configured: usize, jobs: usize) -> usize {
   configured.clamp(MIN_WORKERS, MAX_WORKERS).min(jobs.max(1))
}

/// Summarize every diff concurrently. Returns exactly one [`FileSummary`]
/// per input record, in input order.
pub fn summarize_diffs(
   executor: &StructuredCallExecutor,
   config: &PipelineConfig,
   diffs: &[DiffRecord],
) -> Result<Vec<FileSummary>> {
   if diffs.is_empty() {
      return Ok(Vec::new());
   }

   let system_prompt = templates::render_system_prompt(config.target_language.as_deref())?;

   let queue: Mutex<VecDeque<usize>> = Mutex::new((0..diffs.len()).collect());
   let results: Mutex<Vec<Option<FileSummary>>> = Mutex::new(vec![None; diffs.len()]);
   let failure: Mutex<Option<PipelineError>> = Mutex::new(None);

   std::thread::scope(|scope| {
      for _ in 0..worker_count(config.summary_concurrency, diffs.len()) {
         scope.spawn(|| {
            loop {
               let Some(index) = queue.lock().pop_front() else {
                  break;
               };
               let record = &diffs[index];

               match summarize_one(executor, config, &system_prompt, record) {
                  Ok(summary) => results.lock()[index] = Some(summary),
                  Err(e) if e.is_cancelled() => {
                     // Trip the shared token so sibling workers stop at
                     // their next executor call.
                     executor.cancel_token().cancel();
                     *failure.lock() = Some(e);
                     break;
                  },
                  Err(_) => results.lock()[index] = Some(FileSummary::placeholder(record)),
               }
            }
         });
      }
   });

   if let Some(err) = failure.into_inner() {
      return Err(err);
   }

   Ok(results
      .into_inner()
      .into_iter()
      .enumerate()
      .map(|(index, slot)| slot.unwrap_or_else(|| FileSummary::placeholder(&diffs[index])))
      .collect())
}

fn summarize_one(
   executor: &StructuredCallExecutor,
   config: &PipelineConfig,
   system_prompt: &str,
   record: &DiffRecord,
) -> Result<FileSummary> {
   let bounded = DiffRecord {
      file_name: record.file_name.clone(),
      status:    record.status,
      diff_text: truncate_chars(&record.diff_text, config.max_diff_chars),
   };

   let conversation = vec![
      crate::chat::ChatMessage::system(system_prompt),
      crate::chat::ChatMessage::user(templates::render_summary_prompt(&bounded)?),
   ];

   let value = executor.execute(&RequestKind::Summary, &conversation)?;

   // `file` comes from the input record, never from the reply, so the 1:1
   // mapping holds even when the model echoes a wrong path.
   Ok(FileSummary {
      file:     record.file_name.clone(),
      status:   record.status,
      summary:  value
         .get("summary")
         .and_then(Value::as_str)
         .unwrap_or("minor update")
         .trim()
         .to_string(),
      breaking: value.get("breaking").and_then(Value::as_bool).unwrap_or(false),
   })
}

/// Cut a diff at a char boundary; huge generated files should not blow the
/// context window.
fn truncate_chars(text: &str, max_chars: usize) -> String {
   if text.chars().count() <= max_chars {
      return text.to_string();
   }
   let truncated: String = text.chars().take(max_chars).collect();
   format!("{truncated}\n[... diff truncated ...]")
}
