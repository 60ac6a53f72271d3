//! The single external primitive the pipeline depends on.
//!
//! Provider adapters implement [`ChatBackend`]: one synchronous turn of a
//! conversation in, one raw reply out. Adapters that enforce the target
//! schema at the transport layer (function calling) return
//! [`RawReply::Structured`]; plain-text providers return [`RawReply::Text`]
//! and the executor parses and validates on its own side.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::Result, schema::RequestKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
   System,
   User,
   Assistant,
}

/// One turn of a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
   pub role:    Role,
   pub content: String,
}

impl ChatMessage {
   pub fn system(content: impl Into<String>) -> Self {
      Self { role: Role::System, content: content.into() }
   }

   pub fn user(content: impl Into<String>) -> Self {
      Self { role: Role::User, content: content.into() }
   }

   pub fn assistant(content: impl Into<String>) -> Self {
      Self { role: Role::Assistant, content: content.into() }
   }
}

/// Raw reply from a provider adapter.
#[derive(Debug, Clone)]
pub enum RawReply {
   /// Free text; may contain markdown fences or conversational filler around
   /// the JSON payload.
   Text(String),
   /// Already-structured object from a transport-level schema enforcement
   /// (e.g. a function/tool call). Still validated by the executor.
   Structured(Value),
}

/// Provider adapter contract: send a conversation, get one raw reply.
///
/// `kind` lets adapters attach per-stage transport hints (a function tool
/// definition, a response-format header) without the core caring how.
pub trait ChatBackend: Send + Sync {
   fn chat(&self, conversation: &[ChatMessage], kind: &RequestKind) -> Result<RawReply>;
}
