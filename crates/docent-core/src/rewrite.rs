//! Conversational query rewriting.
//!
//! Follow-up questions like "what about the second one?" make poor search
//! queries. When a conversation has history, the chat model condenses the
//! recent turns and the new question into one standalone query.

use crate::generation::{ChatMessage, ChatModel, CompletionOptions};
use crate::models::ConversationTurn;

/// Number of most recent turns shown to the rewriter.
pub const REWRITE_HISTORY_TURNS: usize = 6;

const REWRITE_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.0,
    max_tokens: 200,
};

const REWRITE_SYSTEM_PROMPT: &str = "You rewrite follow-up questions into standalone search queries. \
Given a conversation and a follow-up question, produce a single self-contained question \
that captures what the user is asking, resolving pronouns and references using the conversation. \
Reply with the rewritten question only. Do not answer it.";

/// Render turns as a `User:` / `Assistant:` transcript, one line per turn.
pub fn format_transcript(turns: &[ConversationTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Condense `history` plus `question` into a standalone search query.
///
/// Returns `question` unchanged when there is no history, when the model
/// call fails, or when the model replies with blank text.
pub async fn rewrite_query(
    model: &dyn ChatModel,
    question: &str,
    history: &[ConversationTurn],
) -> String {
    if history.is_empty() {
        return question.to_string();
    }

    let recent = &history[history.len().saturating_sub(REWRITE_HISTORY_TURNS)..];
    let prompt = format!(
        "Conversation:\n{}\n\nFollow-up question: {}\n\nStandalone question:",
        format_transcript(recent),
        question
    );
    let messages = [
        ChatMessage::system(REWRITE_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ];

    match model.complete(&messages, REWRITE_OPTIONS).await {
        Ok(reply) if !reply.trim().is_empty() => {
            let rewritten = reply.trim().to_string();
            tracing::info!(original = question, rewritten = %rewritten, "rewrote query");
            rewritten
        }
        Ok(_) => {
            tracing::warn!("query rewrite returned blank text, using original question");
            question.to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, "query rewrite failed, using original question");
            question.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: Option<&'static str>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn new(reply: Option<&'static str>) -> Self {
            Self {
                reply,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(
            &self,
            messages: &[ChatMessage],
            options: CompletionOptions,
        ) -> Result<String> {
            assert_eq!(options.temperature, 0.0);
            assert_eq!(options.max_tokens, 200);
            self.seen.lock().unwrap().push(messages.to_vec());
            match self.reply {
                Some(r) => Ok(r.to_string()),
                None => bail!("upstream unavailable"),
            }
        }
    }

    fn turn(role: Role, content: &str) -> ConversationTurn {
        ConversationTurn {
            role,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_history_skips_model() {
        let model = Scripted::new(Some("ignored"));
        let q = rewrite_query(&model, "What is the refund policy?", &[]).await;
        assert_eq!(q, "What is the refund policy?");
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_is_trimmed() {
        let model = Scripted::new(Some("  What is the refund window for hardware?\n"));
        let history = vec![
            turn(Role::User, "Tell me about hardware returns."),
            turn(Role::Assistant, "Hardware can be returned."),
        ];
        let q = rewrite_query(&model, "How long do I have?", &history).await;
        assert_eq!(q, "What is the refund window for hardware?");
    }

    #[tokio::test]
    async fn test_only_last_six_turns_are_sent() {
        let model = Scripted::new(Some("rewritten"));
        let history: Vec<_> = (0..9)
            .map(|i| turn(if i % 2 == 0 { Role::User } else { Role::Assistant }, &format!("turn-{i}")))
            .collect();
        rewrite_query(&model, "and then?", &history).await;
        let seen = model.seen.lock().unwrap();
        let prompt = &seen[0][1].content;
        assert!(!prompt.contains("turn-2"));
        assert!(prompt.contains("turn-3"));
        assert!(prompt.contains("turn-8"));
        assert!(prompt.contains("Assistant: turn-3"));
        assert!(prompt.contains("Follow-up question: and then?"));
    }

    #[tokio::test]
    async fn test_failure_falls_back() {
        let model = Scripted::new(None);
        let history = vec![turn(Role::User, "hi")];
        assert_eq!(rewrite_query(&model, "original", &history).await, "original");
    }

    #[tokio::test]
    async fn test_blank_reply_falls_back() {
        let model = Scripted::new(Some("   "));
        let history = vec![turn(Role::User, "hi")];
        assert_eq!(rewrite_query(&model, "original", &history).await, "original");
    }

    #[test]
    fn test_transcript_labels() {
        let t = format_transcript(&[turn(Role::User, "a"), turn(Role::Assistant, "b")]);
        assert_eq!(t, "User: a\nAssistant: b");
    }
}
