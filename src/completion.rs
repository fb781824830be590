//! Grounded chat-completion client.
//!
//! The completion provider receives the conversation history plus the
//! grounding text assembled by the retriever, and returns the generated
//! reply. The grounding text is embedded in a single system instruction
//! together with a fixed apology directive, so document content that
//! imitates an instruction cannot redefine the unanswerable-question
//! behavior.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::history::ChatMessage;
use crate::types::{ChatError, ChatResult};

/// Literal reply the model is instructed to give for questions the grounding
/// text cannot answer.
pub const FALLBACK_REPLY: &str = "I couldn't find information about that in the document.";

/// Sends a grounded prompt to an external chat-completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generates a reply to the conversation, grounded in `grounding_text`.
    async fn complete(&self, history: &[ChatMessage], grounding_text: &str) -> ChatResult<String>;

    /// `true` while a request is outstanding. Cleared unconditionally when
    /// the call settles, success or failure.
    fn is_loading(&self) -> bool {
        false
    }
}

/// Completion client backed by an OpenAI-compatible chat-completions
/// endpoint.
pub struct OpenAiCompletionProvider {
    config: ProviderConfig,
    client: Client,
    loading: AtomicBool,
}

impl OpenAiCompletionProvider {
    /// Builds a client from the given configuration.
    pub fn new(config: ProviderConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ChatError::Serialization(err.to_string()))?;
        Ok(Self {
            config,
            client,
            loading: AtomicBool::new(false),
        })
    }

    fn system_instruction(grounding_text: &str) -> String {
        format!(
            "You are an AI assistant that helps answer questions about the provided document.\n\
             Use the following extracted text from the document to answer the user's question.\n\
             If the answer cannot be found in the text, say \"{FALLBACK_REPLY}\"\n\
             \n\
             Document content:\n\
             {grounding_text}"
        )
    }

    fn auth_headers(&self) -> ChatResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|err| ChatError::Serialization(err.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn request(&self, history: &[ChatMessage], grounding_text: &str) -> ChatResult<String> {
        let system = Self::system_instruction(grounding_text);
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: &system,
        });
        for message in history {
            messages.push(WireMessage {
                role: message.sender.role_str(),
                content: &message.content,
            });
        }

        let body = serde_json::to_value(ChatRequest {
            model: &self.config.completion_model,
            messages,
            temperature: 0.7,
        })
        .map_err(|err| ChatError::Serialization(err.to_string()))?;

        debug!(
            model = %self.config.completion_model,
            turns = history.len(),
            "requesting completion"
        );

        let response = self
            .client
            .post(&self.config.completions_url)
            .headers(self.auth_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(ChatError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ChatError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ChatError::Parse(err.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChatError::Parse("response contained no choices".into()))
    }
}

/// Clears the loading flag when dropped, so cancellation of an in-flight
/// request cannot leave `is_loading()` stuck at `true`.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionProvider {
    async fn complete(&self, history: &[ChatMessage], grounding_text: &str) -> ChatResult<String> {
        if !self.config.has_credential() {
            return Err(ChatError::Auth);
        }

        self.loading.store(true, Ordering::SeqCst);
        let _guard = LoadingGuard(&self.loading);
        self.request(history, grounding_text).await
    }

    fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let provider = OpenAiCompletionProvider::new(ProviderConfig::default()).unwrap();
        let err = provider.complete(&[], "context").await.unwrap_err();
        assert!(matches!(err, ChatError::Auth));
        assert!(!provider.is_loading());
    }

    #[test]
    fn system_instruction_embeds_grounding_and_apology() {
        let instruction = OpenAiCompletionProvider::system_instruction("chapter one text");
        assert!(instruction.contains("chapter one text"));
        assert!(instruction.contains(FALLBACK_REPLY));
        // The directive precedes the document content, so document text
        // cannot pose as the instruction.
        let directive_at = instruction.find(FALLBACK_REPLY).unwrap();
        let content_at = instruction.find("chapter one text").unwrap();
        assert!(directive_at < content_at);
    }

    #[test]
    fn wire_response_deserializes() {
        let raw = r#"{"choices":[{"message":{"content":"hi there"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hi there");
    }
}
