use std::{
   io::{IsTerminal, Read},
   path::PathBuf,
   process::Command,
   sync::Arc,
};

use anyhow::{Context, bail};
use clap::Parser;
use diffscribe::{
   Pipeline, PipelineConfig, PipelineRequest, StageEvent,
   api::OpenAiBackend,
   diff::parse_diff,
   style,
};

#[derive(Debug, Parser)]
#[command(name = "diffscribe", version, about = "Synthesize a Conventional Commits message from your diff")]
struct Args {
   /// Repository directory
   #[arg(short, long, default_value = ".")]
   dir: PathBuf,

   /// Describe unstaged changes instead of the index
   #[arg(long)]
   unstaged: bool,

   /// Read the diff from stdin instead of running git
   #[arg(long)]
   stdin: bool,

   /// Path to a commit message template file
   #[arg(short, long)]
   template: Option<PathBuf>,

   /// Extra context for the drafting stage (repeatable)
   #[arg(short, long)]
   context: Vec<String>,

   /// Target language for the message's narrative text (e.g. "en", "zh")
   #[arg(short, long)]
   language: Option<String>,

   /// Override the drafting model
   #[arg(long)]
   model: Option<String>,

   /// Override the per-file summary model
   #[arg(long)]
   summary_model: Option<String>,

   /// Sampling temperature in [0.0, 1.0]
   #[arg(long)]
   temperature: Option<f32>,

   /// Config file path
   #[arg(long)]
   config: Option<PathBuf>,

   /// Print per-file summaries before the message
   #[arg(short, long)]
   verbose: bool,
}

fn apply_cli_overrides(config: &mut PipelineConfig, args: &Args) {
   if let Some(ref model) = args.model {
      config.model = model.clone();
   }
   if let Some(ref summary_model) = args.summary_model {
      config.summary_model = summary_model.clone();
   }
   if let Some(temp) = args.temperature {
      if (0.0..=1.0).contains(&temp) {
         config.temperature = temp;
      } else {
         eprintln!(
            "Warning: Temperature {} out of range [0.0, 1.0], using default {}",
            temp, config.temperature
         );
      }
   }
   if let Some(ref language) = args.language {
      config.target_language = Some(language.clone());
   }
}

fn read_diff(args: &Args) -> anyhow::Result<String> {
   if args.stdin || !std::io::stdin().is_terminal() {
      let mut buffer = String::new();
      std::io::stdin()
         .read_to_string(&mut buffer)
         .context("failed to read diff from stdin")?;
      return Ok(buffer);
   }

   let mut command = Command::new("git");
   command.arg("-C").arg(&args.dir).arg("diff");
   if !args.unstaged {
      command.arg("--staged");
   }

   let output = command.output().context("failed to run git diff")?;
   if !output.status.success() {
      bail!("git diff failed: {}", String::from_utf8_lossy(&output.stderr).trim());
   }
   Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn stage_observer() -> Box<dyn Fn(&StageEvent) + Send + Sync> {
   Box::new(|event| match event {
      StageEvent::Started { stage } => {
         eprintln!("{} {}...", style::dim(style::icons::ARROW), stage.name());
      },
      StageEvent::Finished { stage, degraded } => {
         if *degraded {
            eprintln!(
               "{} {} (degraded)",
               style::warning(style::icons::WARNING),
               stage.name()
            );
         } else {
            eprintln!("{} {}", style::success(style::icons::SUCCESS), stage.name());
         }
      },
      StageEvent::Skipped { .. } => {},
   })
}

fn main() {
   if let Err(e) = run() {
      eprintln!("{} {e:#}", style::error(style::icons::ERROR));
      std::process::exit(1);
   }
}

fn run() -> anyhow::Result<()> {
   dotenvy::dotenv().ok();
   let args = Args::parse();

   let mut config = PipelineConfig::load_with(args.config.as_deref())?;
   apply_cli_overrides(&mut config, &args);

   let diff_text = read_diff(&args)?;
   let diffs = parse_diff(&diff_text);
   if diffs.is_empty() {
      bail!(
         "no changes found (did you forget to `git add`? try --unstaged or pipe a diff with --stdin)"
      );
   }

   let template = match &args.template {
      Some(path) => Some(
         std::fs::read_to_string(path)
            .with_context(|| format!("failed to read template {}", path.display()))?,
      ),
      None => None,
   };
   let repo_context = if args.context.is_empty() {
      None
   } else {
      Some(args.context.join(" "))
   };

   let backend = Arc::new(OpenAiBackend::new(&config)?);
   let pipeline = Pipeline::new(backend, config).with_observer(stage_observer());

   let output = pipeline.run(&PipelineRequest { diffs, template, repo_context })?;

   if args.verbose {
      for summary in &output.file_summaries {
         eprintln!(
            "{} {} {}",
            style::dim(&summary.file),
            style::dim(style::icons::ARROW),
            summary.summary
         );
      }
      eprintln!();
   }

   if output.degraded {
      eprintln!(
         "{}",
         style::warning("note: some checks were skipped, review the message before committing")
      );
   }

   println!("{}", output.commit_message);
   Ok(())
}
