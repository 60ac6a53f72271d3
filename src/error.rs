use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
   #[error("model reply for '{kind}' never matched its schema after {attempts} attempts: {last_error}")]
   SchemaExhausted {
      kind:       String,
      attempts:   u32,
      last_error: String,
   },

   #[error("run cancelled")]
   Cancelled,

   #[error("API request failed (HTTP {status}): {body}")]
   ApiError { status: u16, body: String },

   #[error("HTTP error: {0}")]
   HttpError(#[from] reqwest::Error),

   #[error("JSON error: {0}")]
   JsonError(#[from] serde_json::Error),

   #[error("{0}")]
   Other(String),
}

impl PipelineError {
   /// True when the error is the cooperative cancellation signal, which must
   /// win over every fallback path.
   pub const fn is_cancelled(&self) -> bool {
      matches!(self, Self::Cancelled)
   }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
