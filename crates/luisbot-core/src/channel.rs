//! Outbound channel the handler writes replies to.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::SendError;

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<(), SendError>;
}

/// Collects sent messages in order. The HTTP host returns these as reply
/// activities once the turn completes.
#[derive(Debug, Default)]
pub struct BufferedSink {
    messages: Mutex<Vec<String>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic mid-push cannot leave the Vec half-written, so poisoned
    // locks are recovered rather than dropping replies.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageSink for BufferedSink {
    async fn send_message(&self, text: &str) -> Result<(), SendError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }
}
