//! Conversation orchestration.
//!
//! [`ChatSession`] owns the message history for one document, drives
//! retrieval and completion for each send, and persists every turn through
//! the injected [`MessageRepository`]. A failed completion still produces a
//! recorded conversation turn; a failed persistence write is logged and the
//! in-memory history advances regardless.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::chunking::Segment;
use crate::completion::CompletionProvider;
use crate::embeddings::EmbeddingProvider;
use crate::history::{ChatMessage, MessageRepository};
use crate::retrieval::Retriever;
use crate::types::ChatResult;

/// Number of segments requested from the retriever per send.
const RETRIEVAL_TOP_K: usize = 5;
/// Number of leading segments used as grounding when retrieval comes back
/// empty for a non-empty document.
const FALLBACK_SEGMENTS: usize = 3;

/// Why a send was rejected without touching the history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The input was empty or whitespace-only.
    EmptyInput,
    /// Another send for this session is still in flight.
    Pending,
}

/// Result of [`ChatSession::send`].
#[derive(Clone, Debug, PartialEq)]
pub enum SendOutcome {
    /// No state change; see the reason.
    Rejected(RejectReason),
    /// The completion succeeded; the assistant reply was appended and
    /// persisted.
    Replied(ChatMessage),
    /// The completion failed; an assistant turn describing the error was
    /// appended and persisted.
    Failed(ChatMessage),
}

/// One conversation, scoped to a document by id.
pub struct ChatSession {
    source_id: Option<String>,
    messages: Vec<ChatMessage>,
    pending: bool,
    retriever: Retriever,
    embedding: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionProvider>,
    repository: Arc<dyn MessageRepository>,
}

impl ChatSession {
    /// Creates a session for the given document id (`None` for an unscoped
    /// conversation).
    pub fn new(
        source_id: Option<String>,
        embedding: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
        repository: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            source_id,
            messages: Vec::new(),
            pending: false,
            retriever: Retriever,
            embedding,
            completion,
            repository,
        }
    }

    /// The in-memory transcript, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// `true` while a send is in flight.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Document id this conversation is scoped to.
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Replaces the in-memory transcript with the persisted history for the
    /// current document.
    pub async fn load_history(&mut self) -> ChatResult<()> {
        let loaded = self.repository.load(self.source_id.as_deref()).await?;
        debug!(count = loaded.len(), "loaded chat history");
        self.messages = loaded;
        Ok(())
    }

    /// Sends a user message grounded in `segments`.
    ///
    /// Sequence: reject blank input or an in-flight send; append and persist
    /// the user turn; retrieve grounding context (top 5, falling back to the
    /// document's first segments when retrieval finds nothing); call the
    /// completion provider with the full history; append and persist the
    /// reply, or an error-describing assistant turn on failure. The pending
    /// flag clears on every path.
    pub async fn send(&mut self, input: &str, segments: &[Segment]) -> SendOutcome {
        let input = input.trim();
        if input.is_empty() {
            return SendOutcome::Rejected(RejectReason::EmptyInput);
        }
        if self.pending {
            debug!("send ignored, another send is pending");
            return SendOutcome::Rejected(RejectReason::Pending);
        }
        self.pending = true;

        let user_message = ChatMessage::user(input, self.source_id.clone());
        self.messages.push(user_message.clone());
        self.persist(&user_message).await;

        let mut grounding = self
            .retriever
            .retrieve(input, segments, self.embedding.as_ref(), RETRIEVAL_TOP_K)
            .await;
        if grounding.is_empty() && !segments.is_empty() {
            warn!("retrieval found no segments, grounding on leading segments");
            grounding = segments
                .iter()
                .take(FALLBACK_SEGMENTS)
                .map(|s| s.content.clone())
                .collect();
        }
        let grounding_text = grounding.join("\n\n");

        let outcome = match self
            .completion
            .complete(&self.messages, &grounding_text)
            .await
        {
            Ok(reply) => {
                let message = ChatMessage::assistant(reply, self.source_id.clone());
                self.messages.push(message.clone());
                self.persist(&message).await;
                SendOutcome::Replied(message)
            }
            Err(err) => {
                warn!(error = %err, "completion failed, recording error turn");
                let message =
                    ChatMessage::assistant(format!("Error: {err}"), self.source_id.clone());
                self.messages.push(message.clone());
                self.persist(&message).await;
                SendOutcome::Failed(message)
            }
        };

        self.pending = false;
        outcome
    }

    /// Empties the in-memory history and deletes the persisted history for
    /// the current document id. Irreversible; confirmation is the caller's
    /// responsibility.
    pub async fn clear_chat(&mut self) {
        self.messages.clear();
        if let Err(err) = self.repository.delete_for(self.source_id.as_deref()).await {
            warn!(error = %err, "failed to delete persisted history");
        }
    }

    async fn persist(&self, message: &ChatMessage) {
        if let Err(err) = self.repository.save(message).await {
            // History-store unavailability never blocks the conversation.
            warn!(error = %err, "failed to persist message");
        }
    }
}
