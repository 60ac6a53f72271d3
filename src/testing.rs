//! Scripted backend for exercising the pipeline without a network.

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use crate::{
   chat::{ChatBackend, ChatMessage, RawReply},
   error::{PipelineError, Result},
   schema::RequestKind,
};

/// A [`ChatBackend`] that replays a scripted sequence of replies and records
/// every conversation it was sent.
pub struct MockBackend {
   replies:       Mutex<VecDeque<Result<RawReply>>>,
   conversations: Mutex<Vec<Vec<ChatMessage>>>,
   kinds:         Mutex<Vec<String>>,
}

impl MockBackend {
   pub fn new(replies: Vec<Result<RawReply>>) -> Arc<Self> {
      Arc::new(Self {
         replies:       Mutex::new(replies.into()),
         conversations: Mutex::new(Vec::new()),
         kinds:         Mutex::new(Vec::new()),
      })
   }

   /// Convenience for scripts where every reply is plain text.
   pub fn from_texts(texts: Vec<&str>) -> Arc<Self> {
      Self::new(
         texts
            .into_iter()
            .map(|t| Ok(RawReply::Text(t.to_string())))
            .collect(),
      )
   }

   pub fn call_count(&self) -> usize {
      self.conversations.lock().len()
   }

   pub fn conversations(&self) -> Vec<Vec<ChatMessage>> {
      self.conversations.lock().clone()
   }

   /// Stage names of the calls made, in order.
   pub fn kinds(&self) -> Vec<String> {
      self.kinds.lock().clone()
   }
}

/// Clone helper so tests can hold the mock while handing an `Arc<dyn
/// ChatBackend>` to the code under test.
pub trait CloneArc {
   fn clone_arc(self: &Arc<Self>) -> Arc<dyn ChatBackend>;
}

impl CloneArc for MockBackend {
   fn clone_arc(self: &Arc<Self>) -> Arc<dyn ChatBackend> {
      Arc::clone(self) as Arc<dyn ChatBackend>
   }
}

impl ChatBackend for MockBackend {
   fn chat(&self, conversation: &[ChatMessage], kind: &RequestKind) -> Result<RawReply> {
      self.conversations.lock().push(conversation.to_vec());
      self.kinds.lock().push(kind.name().to_string());
      self
         .replies
         .lock()
         .pop_front()
         .unwrap_or_else(|| {
            Err(PipelineError::Other("mock backend script exhausted".to_string()))
         })
   }
}
