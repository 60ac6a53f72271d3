//! Prompt rendering for each pipeline stage.
//!
//! Prompts live as Tera templates under `prompts/` and are embedded into the
//! binary, so the crate works without any on-disk assets.

use std::{
   path::{Path, PathBuf},
   sync::LazyLock,
};

use parking_lot::Mutex;
use rust_embed::RustEmbed;
use tera::{Context, Tera};

use crate::{
   error::{PipelineError, Result},
   schema::SUMMARY_WORD_LIMIT,
   types::{DiffRecord, FileSummary, TemplatePolicy},
};

/// Embedded prompts folder (compiled into binary)
#[derive(RustEmbed)]
#[folder = "prompts/"]
struct Prompts;

/// Global Tera instance for template rendering (wrapped in Mutex for mutable
/// access)
static TERA: LazyLock<Mutex<Tera>> = LazyLock::new(|| {
   let mut tera = Tera::default();

   // Load templates from the user prompts directory first so they take
   // precedence over the embedded defaults.
   if let Some(prompts_dir) = user_prompts_dir() {
      if let Err(e) = register_directory_templates(&mut tera, &prompts_dir) {
         eprintln!("Warning: {e}");
      }
   }

   // Register embedded templates that aren't overridden by user files.
   for file in Prompts::iter() {
      if tera.get_template_names().any(|name| name == file.as_ref()) {
         continue;
      }

      if let Some(embedded_file) = Prompts::get(file.as_ref()) {
         match std::str::from_utf8(embedded_file.data.as_ref()) {
            Ok(content) => {
               if let Err(e) = tera.add_raw_template(file.as_ref(), content) {
                  eprintln!(
                     "Warning: Failed to register embedded template {}: {}",
                     file.as_ref(),
                     e
                  );
               }
            },
            Err(e) => {
               eprintln!("Warning: Embedded template {} is not valid UTF-8: {}", file.as_ref(), e);
            },
         }
      }
   }

   // Prompts are plain text, never HTML
   tera.autoescape_on(vec![]);

   Mutex::new(tera)
});

/// User prompt override directory (~/.config/diffscribe/prompts/) if a home
/// directory exists.
fn user_prompts_dir() -> Option<PathBuf> {
   std::env::var("HOME")
      .or_else(|_| std::env::var("USERPROFILE"))
      .ok()
      .map(|home| PathBuf::from(home).join(".config/diffscribe/prompts"))
}

/// Register every `.tera` file in `directory`, keyed by file name so user
/// files shadow the embedded templates of the same name.
fn register_directory_templates(tera: &mut Tera, directory: &Path) -> Result<()> {
   if !directory.exists() {
      return Ok(());
   }

   for entry in std::fs::read_dir(directory).map_err(|e| {
      PipelineError::Other(format!(
         "Failed to read prompts directory {}: {e}",
         directory.display()
      ))
   })? {
      let entry = match entry {
         Ok(entry) => entry,
         Err(e) => {
            eprintln!(
               "Warning: Failed to iterate template entry in {}: {e}",
               directory.display()
            );
            continue;
         },
      };

      let path = entry.path();
      if path.extension().and_then(|s| s.to_str()) != Some("tera") {
         continue;
      }
      let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
         continue;
      };

      if let Err(e) = tera.add_template_file(&path, Some(name)) {
         eprintln!("Warning: Failed to register user template {}: {e}", path.display());
      }
   }

   Ok(())
}

fn render(name: &str, context: &Context) -> Result<String> {
   TERA
      .lock()
      .render(name, context)
      .map_err(|e| PipelineError::Other(format!("Failed to render prompt template '{name}': {e}")))
}

/// System prompt shared by every stage.
pub fn render_system_prompt(target_language: Option<&str>) -> Result<String> {
   let mut context = Context::new();
   if let Some(lang) = target_language {
      context.insert("target_language", lang);
   }
   render("system.tera", &context)
}

/// Per-file diff summary prompt.
pub fn render_summary_prompt(record: &DiffRecord) -> Result<String> {
   let mut context = Context::new();
   context.insert("file_name", &record.file_name);
   context.insert("status", &record.status.to_string());
   context.insert("diff_text", &record.diff_text);
   context.insert("word_limit", &SUMMARY_WORD_LIMIT);
   render("summary.tera", &context)
}

/// Template policy extraction prompt.
pub fn render_template_policy_prompt(template: &str) -> Result<String> {
   let mut context = Context::new();
   context.insert("template", template);
   render("template_policy.tera", &context)
}

/// Drafting prompt: summaries + optional policy + optional repo context.
pub fn render_draft_prompt(
   summaries: &[FileSummary],
   policy: Option<&TemplatePolicy>,
   repo_context: Option<&str>,
) -> Result<String> {
   let mut context = Context::new();
   context.insert("summaries", summaries);
   if let Some(policy) = policy {
      context.insert("policy", policy);
   }
   if let Some(repo) = repo_context {
      context.insert("repo_context", repo);
   }
   render("draft.tera", &context)
}

/// Checklist validation prompt for a drafted message.
pub fn render_fix_prompt(
   commit_message: &str,
   checklist: &str,
   policy: Option<&TemplatePolicy>,
) -> Result<String> {
   let mut context = Context::new();
   context.insert("commit_message", commit_message);
   context.insert("checklist", checklist);
   if let Some(policy) = policy {
      context.insert("policy", policy);
   }
   render("fix.tera", &context)
}

/// Corrective rewrite prompt after the local header check failed.
pub fn render_strict_fix_prompt(commit_message: &str, problems: &[String]) -> Result<String> {
   let mut context = Context::new();
   context.insert("commit_message", commit_message);
   context.insert("problems", problems);
   render("strict_fix.tera", &context)
}

/// Language rewrite prompt for narrative text in the wrong language.
pub fn render_language_fix_prompt(commit_message: &str, target_language: &str) -> Result<String> {
   let mut context = Context::new();
   context.insert("commit_message", commit_message);
   context.insert("target_language", target_language);
   render("language_fix.tera", &context)
}
