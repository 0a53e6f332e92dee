//! Chat-completion model trait.
//!
//! Used for both query rewriting and grounded answer generation. HTTP
//! implementations live in the `docent` app crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Role;

/// Role of a message sent to a chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        }
    }
}

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling settings for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A model that completes a list of chat messages into text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model or deployment identifier, for logs and the health summary.
    fn model_name(&self) -> &str;
    /// Return the assistant reply for `messages`.
    async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions)
        -> Result<String>;
}
