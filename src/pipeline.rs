//! Stage orchestration: one `run` takes diffs in and a commit message out.
//!
//! The stage sequence is fixed; what varies is each stage's failure policy.
//! Summaries and validation fail open, drafting and the strict header check
//! fail the run, and cancellation aborts from anywhere. An optional observer
//! sees every stage transition, which is what the CLI progress output hangs
//! off.

use std::sync::Arc;

use crate::{
   chat::ChatBackend,
   config::PipelineConfig,
   draft,
   error::{PipelineError, Result},
   executor::{CancelToken, StructuredCallExecutor},
   language, strict, summarize, template_policy, validate,
   types::{PipelineOutput, RawArtifacts},
};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
   Summarize,
   TemplatePolicy,
   Draft,
   Validate,
   StrictCheck,
   Language,
}

impl Stage {
   pub const fn name(&self) -> &'static str {
      match self {
         Self::Summarize => "summarize",
         Self::TemplatePolicy => "template_policy",
         Self::Draft => "draft",
         Self::Validate => "validate",
         Self::StrictCheck => "strict_check",
         Self::Language => "language",
      }
   }
}

/// Stage transition visible to an observer.
#[derive(Debug, Clone)]
pub enum StageEvent {
   Started { stage: Stage },
   /// Stage ran to completion. `degraded` marks a fail-open stage that had
   /// to fall back.
   Finished { stage: Stage, degraded: bool },
   /// Stage did not apply to this request (no template, no target language).
   Skipped { stage: Stage },
}

pub type StageObserver = Box<dyn Fn(&StageEvent) + Send + Sync>;

/// Everything one run needs as input.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
   pub diffs:        Vec<crate::types::DiffRecord>,
   /// Free-text commit template to extract a policy from.
   pub template:     Option<String>,
   /// Short prose description of the repository, for drafting context.
   pub repo_context: Option<String>,
}

pub struct Pipeline {
   executor: StructuredCallExecutor,
   config:   PipelineConfig,
   observer: Option<StageObserver>,
}

impl Pipeline {
   pub fn new(backend: Arc<dyn ChatBackend>, config: PipelineConfig) -> Self {
      let executor =
         StructuredCallExecutor::new(backend, config.max_attempts, CancelToken::new());
      Self { executor, config, observer: None }
   }

   pub fn with_observer(mut self, observer: StageObserver) -> Self {
      self.observer = Some(observer);
      self
   }

   /// Token callers can trip from another thread to abort the run.
   pub fn cancel_token(&self) -> CancelToken {
      self.executor.cancel_token().clone()
   }

   fn emit(&self, event: &StageEvent) {
      if let Some(observer) = &self.observer {
         observer(event);
      }
   }

   fn started(&self, stage: Stage) {
      self.emit(&StageEvent::Started { stage });
   }

   fn finished(&self, stage: Stage, degraded: bool) {
      self.emit(&StageEvent::Finished { stage, degraded });
   }

   fn skipped(&self, stage: Stage) {
      self.emit(&StageEvent::Skipped { stage });
   }

   /// Run the full pipeline over one set of diffs.
   pub fn run(&self, request: &PipelineRequest) -> Result<PipelineOutput> {
      if request.diffs.is_empty() {
         return Err(PipelineError::Other(
            "no diffs to describe, nothing to commit".to_string(),
         ));
      }

      self.started(Stage::Summarize);
      let summaries = summarize::summarize_diffs(&self.executor, &self.config, &request.diffs)?;
      self.finished(Stage::Summarize, false);

      let template = request.template.as_deref().filter(|t| !t.trim().is_empty());
      let policy = if template.is_some() {
         self.started(Stage::TemplatePolicy);
         let policy = template_policy::extract_policy(&self.executor, &self.config, template)?;
         self.finished(Stage::TemplatePolicy, policy.is_none());
         policy
      } else {
         self.skipped(Stage::TemplatePolicy);
         None
      };

      self.started(Stage::Draft);
      let draft = draft::draft_commit(
         &self.executor,
         &self.config,
         &summaries,
         policy.as_ref(),
         request.repo_context.as_deref(),
      )?;
      self.finished(Stage::Draft, false);
      let drafted_message = draft
         .commit_message
         .clone()
         .unwrap_or_else(|| draft.assemble_message(Default::default()));

      self.started(Stage::Validate);
      let validated = validate::validate_message(
         &self.executor,
         &self.config,
         &drafted_message,
         policy.as_ref(),
      )?;
      self.finished(Stage::Validate, validated.degraded);

      self.started(Stage::StrictCheck);
      let checked = strict::enforce(
         &self.executor,
         self.config.target_language.as_deref(),
         &validated.commit_message,
      )?;
      self.finished(Stage::StrictCheck, false);

      let final_message = if self.config.target_language.is_some() {
         self.started(Stage::Language);
         let outcome = language::enforce_language(&self.executor, &self.config, &checked)?;
         self.finished(Stage::Language, false);
         outcome.commit_message
      } else {
         self.skipped(Stage::Language);
         checked
      };

      Ok(PipelineOutput {
         commit_message: final_message,
         file_summaries: summaries,
         degraded: validated.degraded,
         raw: RawArtifacts {
            classification_notes: draft.notes.clone(),
            validation_notes: validated.notes,
            template_policy: policy,
            draft,
         },
      })
   }
}
