//! Retrieval-augmented chat core for long documents.
//!
//! Turns a source document into queryable knowledge and answers user
//! questions grounded in it:
//!
//! ```text
//! raw text ──► chunking::Chunker ──► segments
//!                                       │
//!                                       ▼
//!                   embeddings::EmbeddingPipeline ──► (segment, vector) pairs
//!                                       │                    held by document::DocumentManager
//!                                       ▼
//! user query ──► retrieval::Retriever (cosine ranking, keyword fallback)
//!                                       │
//!                                       ▼
//! chat::ChatSession ──► completion::CompletionProvider ──► reply
//!        │
//!        └─► history::MessageRepository (persisted transcript)
//! ```
//!
//! The external embedding and completion APIs, the history store, and the
//! source-format text extractor are all trait seams with one production and
//! one test implementation each.

pub mod chat;
pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod history;
pub mod retrieval;
pub mod types;

pub use chat::{ChatSession, RejectReason, SendOutcome};
pub use chunking::{Chunker, Segment};
pub use completion::{CompletionProvider, OpenAiCompletionProvider, FALLBACK_REPLY};
pub use config::ProviderConfig;
pub use document::{DocumentManager, DocumentSession, LoadOutcome, ProcessingState, TextExtractor};
pub use embeddings::{
    cosine_similarity, EmbeddingPipeline, EmbeddingProgress, EmbeddingProvider, EmbeddingStatus,
    MockEmbeddingProvider, OpenAiEmbeddingProvider,
};
pub use history::{
    ChatMessage, InMemoryMessageStore, MessageRepository, Sender, SqliteMessageStore,
};
pub use retrieval::Retriever;
pub use types::{ChatError, ChatResult};
