//! Crate-wide error taxonomy.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors produced by the chat core.
///
/// The propagation policy is deliberately uneven: the chunker and cosine
/// similarity are total functions and never return these; the embedding
/// pipeline and retriever absorb per-item failures and degrade instead of
/// propagating; the conversation orchestrator converts completion failures
/// into a visible assistant turn. Only the provider clients and stores
/// surface `ChatError` directly.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Input rejected before any external call was made.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No API credential configured.
    #[error("missing API credential")]
    Auth,

    /// The request body could not be constructed locally.
    #[error("failed to serialize request: {0}")]
    Serialization(String),

    /// Non-success response from an external provider. Transport-level
    /// failures (connect errors, timeouts) use `status` 0.
    #[error("provider returned status {status}: {body}")]
    Service { status: u16, body: String },

    /// The provider response did not contain the expected fields.
    #[error("unexpected provider response: {0}")]
    Parse(String),

    /// Message history store failure. Logged and swallowed by the
    /// orchestrator; never blocks the conversation flow.
    #[error("history store failure: {0}")]
    Persistence(String),

    /// The source document yielded no usable text.
    #[error("text extraction failed: {0}")]
    Extraction(String),
}

impl ChatError {
    /// Wraps a transport-level HTTP failure (no status line was received).
    pub fn transport(err: reqwest::Error) -> Self {
        ChatError::Service {
            status: 0,
            body: err.to_string(),
        }
    }
}
