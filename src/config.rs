use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
   pub api_base_url: String,

   /// Optional API key for authentication (overridden by `DIFFSCRIBE_API_KEY`
   /// env var)
   pub api_key: Option<String>,

   /// HTTP request timeout in seconds
   pub request_timeout_secs: u64,

   /// HTTP connection timeout in seconds
   pub connect_timeout_secs: u64,

   /// Model for drafting, validation and corrective rewrites
   pub model: String,

   /// Cheaper model for per-file summaries
   pub summary_model: String,

   pub temperature: f32,

   /// Schema-retry budget per structured call
   pub max_attempts: u32,

   /// Transport-level retries for 5xx responses
   pub http_retries: u32,

   /// First backoff delay for transport retries, doubled each attempt
   pub initial_backoff_ms: u64,

   /// Requested summary worker count; clamped at runtime to [4, 8] and to
   /// the number of files
   pub summary_concurrency: usize,

   /// Language narrative text must be written in (None disables enforcement)
   pub target_language: Option<String>,

   /// How many points one Latin language must lead the runner-up by before
   /// the script heuristic claims a definite answer
   pub latin_margin: u32,

   /// Per-file diff truncation limit in characters
   pub max_diff_chars: usize,
}

impl Default for PipelineConfig {
   fn default() -> Self {
      Self {
         api_base_url:         "http://localhost:4000".to_string(),
         api_key:              None,
         request_timeout_secs: 120,
         connect_timeout_secs: 30,
         model:                "claude-sonnet-4.5".to_string(),
         summary_model:        "claude-haiku-4-5".to_string(),
         temperature:          0.2, // Low temperature for consistent structured output
         max_attempts:         3,
         http_retries:         3,
         initial_backoff_ms:   1000,
         summary_concurrency:  6,
         target_language:      None,
         latin_margin:         2,
         max_diff_chars:       100000,
      }
   }
}

impl PipelineConfig {
   /// Load config from default location (~/.config/diffscribe/config.toml)
   /// Falls back to Default if file doesn't exist or can't determine home
   /// directory. Environment variables override config file values:
   /// - `DIFFSCRIBE_API_URL` overrides `api_base_url`
   /// - `DIFFSCRIBE_API_KEY` overrides `api_key`
   /// - `DIFFSCRIBE_MODEL` overrides `model`
   /// - `DIFFSCRIBE_LANGUAGE` overrides `target_language`
   pub fn load() -> Result<Self> {
      Self::load_with(None)
   }

   /// Load config, preferring an explicit `path`, then `DIFFSCRIBE_CONFIG`,
   /// then the default location. Env overrides are applied exactly once,
   /// here; `from_file` parses the file and nothing else.
   pub fn load_with(path: Option<&Path>) -> Result<Self> {
      let mut config = match path {
         Some(path) => Self::from_file(path)?,
         None => {
            let config_path = if let Ok(custom_path) = std::env::var("DIFFSCRIBE_CONFIG") {
               PathBuf::from(custom_path)
            } else {
               Self::default_config_path().unwrap_or_else(|_| PathBuf::new())
            };
            if config_path.exists() {
               Self::from_file(&config_path)?
            } else {
               Self::default()
            }
         },
      };

      Self::apply_env_overrides(&mut config);
      Ok(config)
   }

   /// Apply environment variable overrides to config
   fn apply_env_overrides(config: &mut Self) {
      if let Ok(api_url) = std::env::var("DIFFSCRIBE_API_URL") {
         config.api_base_url = api_url;
      }

      if let Ok(api_key) = std::env::var("DIFFSCRIBE_API_KEY") {
         config.api_key = Some(api_key);
      }

      if let Ok(model) = std::env::var("DIFFSCRIBE_MODEL") {
         config.model = model;
      }

      if let Ok(language) = std::env::var("DIFFSCRIBE_LANGUAGE") {
         if language.trim().is_empty() {
            config.target_language = None;
         } else {
            config.target_language = Some(language);
         }
      }
   }

   /// Parse config from a specific file, no env overrides.
   pub fn from_file(path: &Path) -> Result<Self> {
      let contents = std::fs::read_to_string(path)
         .map_err(|e| PipelineError::Other(format!("Failed to read config: {e}")))?;
      toml::from_str(&contents)
         .map_err(|e| PipelineError::Other(format!("Failed to parse config: {e}")))
   }

   /// Get default config path (platform-safe)
   /// Tries HOME (Unix/Linux/macOS) then USERPROFILE (Windows)
   pub fn default_config_path() -> Result<PathBuf> {
      if let Ok(home) = std::env::var("HOME") {
         return Ok(PathBuf::from(home).join(".config/diffscribe/config.toml"));
      }

      if let Ok(home) = std::env::var("USERPROFILE") {
         return Ok(PathBuf::from(home).join(".config/diffscribe/config.toml"));
      }

      Err(PipelineError::Other("No home directory found (tried HOME and USERPROFILE)".to_string()))
   }
}
