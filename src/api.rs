//! OpenAI-compatible provider adapter.
//!
//! Each stage's reply shape is pushed down to the transport as a forced
//! function tool, so providers that honor tool calling return
//! [`RawReply::Structured`] directly. Providers that answer in plain content
//! fall back to [`RawReply::Text`] and the executor's extraction path.

use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
   chat::{ChatBackend, ChatMessage, RawReply},
   config::PipelineConfig,
   error::{PipelineError, Result},
   schema::{RequestKind, SUMMARY_WORD_LIMIT},
   types::COMMIT_TYPES,
};

#[derive(Debug, Serialize)]
struct Message {
   role:    String,
   content: String,
}

#[derive(Debug, Serialize)]
struct FunctionParameters {
   #[serde(rename = "type")]
   param_type: String,
   properties: serde_json::Value,
   required:   Vec<String>,
}

#[derive(Debug, Serialize)]
struct Function {
   name:        String,
   description: String,
   parameters:  FunctionParameters,
}

#[derive(Debug, Serialize)]
struct Tool {
   #[serde(rename = "type")]
   tool_type: String,
   function:  Function,
}

#[derive(Debug, Serialize)]
struct ApiRequest {
   model:       String,
   max_tokens:  u32,
   temperature: f32,
   tools:       Vec<Tool>,
   #[serde(skip_serializing_if = "Option::is_none")]
   tool_choice: Option<serde_json::Value>,
   messages:    Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
   name:      String,
   arguments: String,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
   function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
   #[serde(default)]
   tool_calls: Vec<ToolCall>,
   #[serde(default)]
   content:    Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
   message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
   choices: Vec<Choice>,
}

pub struct OpenAiBackend {
   client: reqwest::blocking::Client,
   config: PipelineConfig,
}

impl OpenAiBackend {
   pub fn new(config: &PipelineConfig) -> Result<Self> {
      let client = reqwest::blocking::Client::builder()
         .timeout(Duration::from_secs(config.request_timeout_secs))
         .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
         .build()
         .map_err(PipelineError::HttpError)?;
      Ok(Self { client, config: config.clone() })
   }

   /// Summaries run on the cheaper model, everything else on the main one.
   fn model_for(&self, kind: &RequestKind) -> &str {
      match kind {
         RequestKind::Summary => &self.config.summary_model,
         _ => &self.config.model,
      }
   }

   fn send(&self, request: &ApiRequest) -> Result<reqwest::blocking::Response> {
      let mut attempt = 0;
      loop {
         attempt += 1;

         let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base_url))
            .header("content-type", "application/json");
         if let Some(ref api_key) = self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {api_key}"));
         }

         let response = builder.json(request).send().map_err(PipelineError::HttpError)?;
         let status = response.status();

         // 5xx gets a bounded backoff retry; everything else is final
         if status.is_server_error() && attempt < self.config.http_retries {
            let backoff_ms = self.config.initial_backoff_ms * (1 << (attempt - 1));
            eprintln!("Server error {status}, retry {attempt}/{} after {backoff_ms}ms...", self.config.http_retries);
            thread::sleep(Duration::from_millis(backoff_ms));
            continue;
         }

         if !status.is_success() {
            let body = response
               .text()
               .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::ApiError { status: status.as_u16(), body });
         }

         return Ok(response);
      }
   }
}

impl ChatBackend for OpenAiBackend {
   fn chat(&self, conversation: &[ChatMessage], kind: &RequestKind) -> Result<RawReply> {
      let tool = tool_for(kind);
      let tool_name = tool.function.name.clone();

      let request = ApiRequest {
         model:       self.model_for(kind).to_string(),
         max_tokens:  2000,
         temperature: self.config.temperature,
         tool_choice: Some(
            serde_json::json!({ "type": "function", "function": { "name": tool_name } }),
         ),
         tools:       vec![tool],
         messages:    conversation
            .iter()
            .map(|m| Message {
               role:    role_str(m.role).to_string(),
               content: m.content.clone(),
            })
            .collect(),
      };

      let response = self.send(&request)?;
      let api_response: ApiResponse = response.json().map_err(PipelineError::HttpError)?;

      let Some(choice) = api_response.choices.first() else {
         return Err(PipelineError::Other("API returned no choices".to_string()));
      };

      if let Some(call) = choice.message.tool_calls.first()
         && call.function.name == tool_name
         && !call.function.arguments.trim().is_empty()
      {
         let value = serde_json::from_str(&call.function.arguments)
            .map_err(PipelineError::JsonError)?;
         return Ok(RawReply::Structured(value));
      }

      if let Some(content) = &choice.message.content
         && !content.trim().is_empty()
      {
         return Ok(RawReply::Text(content.clone()));
      }

      Err(PipelineError::Other(
         "API response had neither tool call nor content".to_string(),
      ))
   }
}

const fn role_str(role: crate::chat::Role) -> &'static str {
   match role {
      crate::chat::Role::System => "system",
      crate::chat::Role::User => "user",
      crate::chat::Role::Assistant => "assistant",
   }
}

/// Function tool definition for a stage's reply shape.
fn tool_for(kind: &RequestKind) -> Tool {
   let (name, description, properties, required) = match kind {
      RequestKind::Summary => (
         "submit_file_summary",
         "Submit the summary of one file's diff",
         serde_json::json!({
            "file": { "type": "string", "description": "Path of the summarized file" },
            "summary": {
               "type": "string",
               "description": format!("What changed, at most {SUMMARY_WORD_LIMIT} words")
            },
            "breaking": { "type": "boolean", "description": "Whether the change breaks existing callers" }
         }),
         vec!["file", "summary"],
      ),
      RequestKind::TemplatePolicy => (
         "submit_template_policy",
         "Submit the constraints extracted from the commit template",
         serde_json::json!({
            "header": {
               "type": "object",
               "properties": {
                  "require_scope": { "type": "boolean" },
                  "breaking_marker": { "type": "string", "enum": ["bang", "footer", "either"] }
               }
            },
            "body": {
               "type": "object",
               "properties": {
                  "sections": { "type": "array", "items": { "type": "string" } },
                  "bullet_style": { "type": "string" },
                  "require_body": { "type": "boolean" }
               }
            },
            "footers": {
               "type": "array",
               "items": {
                  "type": "object",
                  "properties": {
                     "token": { "type": "string" },
                     "value_hint": { "type": "string" }
                  },
                  "required": ["token"]
               }
            },
            "tone": { "type": "string" },
            "extra_types": { "type": "array", "items": { "type": "string" } }
         }),
         vec![],
      ),
      RequestKind::Draft { extra_types } => {
         let mut allowed: Vec<&str> = COMMIT_TYPES.to_vec();
         allowed.extend(extra_types.iter().map(String::as_str));
         (
            "submit_commit_draft",
            "Submit the classified and drafted commit message",
            serde_json::json!({
               "type": { "type": "string", "enum": allowed },
               "scope": { "type": "string", "description": "Optional scope, omit when unclear" },
               "breaking": { "type": "boolean" },
               "description": { "type": "string", "description": "Imperative one-line summary" },
               "body": { "type": "string" },
               "footers": { "type": "array", "items": { "type": "string" } },
               "commit_message": { "type": "string", "description": "The full assembled message" },
               "notes": { "type": "string" }
            }),
            vec!["type", "description"],
         )
      },
      RequestKind::Fix => (
         "submit_validation",
         "Submit the checklist verdict and the possibly-corrected message",
         serde_json::json!({
            "status": { "type": "string", "enum": ["valid", "fixed"] },
            "commit_message": { "type": "string" },
            "violations": { "type": "array", "items": { "type": "string" } },
            "notes": { "type": "string" }
         }),
         vec!["status", "commit_message"],
      ),
      RequestKind::StrictFix => (
         "submit_corrected_message",
         "Submit the message with a repaired header",
         serde_json::json!({
            "commit_message": { "type": "string" }
         }),
         vec!["commit_message"],
      ),
      RequestKind::LanguageFix => (
         "submit_translated_message",
         "Submit the message with its narrative text rewritten in the target language",
         serde_json::json!({
            "commit_message": { "type": "string" }
         }),
         vec!["commit_message"],
      ),
   };

   Tool {
      tool_type: "function".to_string(),
      function:  Function {
         name:        name.to_string(),
         description: description.to_string(),
         parameters:  FunctionParameters {
            param_type: "object".to_string(),
            properties,
            required: required.into_iter().map(str::to_string).collect(),
         },
      },
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_tool_names_are_distinct_per_kind() {
      let kinds = [
         RequestKind::Summary,
         RequestKind::TemplatePolicy,
         RequestKind::Draft { extra_types: vec![] },
         RequestKind::Fix,
         RequestKind::StrictFix,
         RequestKind::LanguageFix,
      ];
      let mut names: Vec<String> =
         kinds.iter().map(|k| tool_for(k).function.name).collect();
      names.sort();
      names.dedup();
      assert_eq!(names.len(), 6);
   }

   #[test]
   fn test_draft_tool_enum_includes_policy_types() {
      let kind = RequestKind::Draft { extra_types: vec!["release".to_string()] };
      let tool = tool_for(&kind);
      let enum_values = tool.function.parameters.properties["type"]["enum"]
         .as_array()
         .unwrap()
         .clone();
      assert!(enum_values.iter().any(|v| v == "release"));
      assert!(enum_values.iter().any(|v| v == "feat"));
   }

   #[test]
   fn test_summary_model_selection() {
      let config = PipelineConfig {
         model: "big".to_string(),
         summary_model: "small".to_string(),
         ..PipelineConfig::default()
      };
      let backend = OpenAiBackend::new(&config).unwrap();
      assert_eq!(backend.model_for(&RequestKind::Summary), "small");
      assert_eq!(backend.model_for(&RequestKind::Fix), "big");
   }
}
