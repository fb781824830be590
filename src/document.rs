//! Document sessions: extraction, chunking, and embedding of one source.
//!
//! A [`DocumentManager`] owns at most one [`DocumentSession`] at a time.
//! Loading a new source replaces the session wholesale; an embedding run
//! still completing for the old session detects the replacement and
//! discards its result instead of writing into the new session's segments.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::chunking::{Chunker, Segment};
use crate::embeddings::{EmbeddingPipeline, EmbeddingProgress, EmbeddingProvider, EmbeddingStatus};
use crate::types::{ChatError, ChatResult};

/// Incremental progress callback for text extraction, called once per
/// source page/unit with the completed fraction in `[0, 1]`.
pub type ExtractionProgress = dyn Fn(f64) + Send + Sync;

/// Extracts raw text from a source document. Collaborator seam; the chat
/// core never parses source file formats itself.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(
        &self,
        source_id: &str,
        on_progress: &ExtractionProgress,
    ) -> ChatResult<String>;
}

/// Lifecycle of a document session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingState {
    Idle,
    Extracting,
    Chunking,
    Embedding,
    Ready,
    Failed,
}

/// One loaded source: its segments and processing status.
#[derive(Clone, Debug)]
pub struct DocumentSession {
    pub source_id: String,
    pub segments: Vec<Segment>,
    pub progress: EmbeddingProgress,
    pub state: ProcessingState,
}

impl DocumentSession {
    fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            segments: Vec::new(),
            progress: EmbeddingProgress::idle(),
            state: ProcessingState::Idle,
        }
    }
}

/// Result of a [`DocumentManager::load`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The session finished loading and is ready to answer queries.
    Ready {
        source_id: String,
        segment_count: usize,
        embedded_count: usize,
    },
    /// A newer load replaced this session mid-flight; its result was
    /// discarded.
    Superseded,
}

/// Owns the active document session and drives loading.
pub struct DocumentManager {
    chunker: Chunker,
    pipeline: EmbeddingPipeline,
    active: Arc<Mutex<Option<DocumentSession>>>,
}

impl DocumentManager {
    /// Creates a manager with default chunking parameters and no progress
    /// publication.
    pub fn new() -> Self {
        Self::with_pipeline(Chunker::default(), EmbeddingPipeline::new())
    }

    /// Creates a manager with explicit chunker settings and pipeline (use
    /// [`EmbeddingPipeline::with_progress`] to observe embedding progress).
    pub fn with_pipeline(chunker: Chunker, pipeline: EmbeddingPipeline) -> Self {
        Self {
            chunker,
            pipeline,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Loads a source: extract, chunk, embed. Replaces any previous session
    /// immediately; every later mutation re-checks that this load still owns
    /// the active session.
    pub async fn load(
        &self,
        source_id: &str,
        extractor: &dyn TextExtractor,
        provider: &dyn EmbeddingProvider,
    ) -> ChatResult<LoadOutcome> {
        info!(source_id, "loading document");
        {
            let mut active = self.active.lock();
            *active = Some(DocumentSession::new(source_id));
        }
        self.update_if_active(source_id, |session| {
            session.state = ProcessingState::Extracting;
        });

        let on_progress: Box<ExtractionProgress> = {
            let id = source_id.to_string();
            Box::new(move |fraction| {
                debug!(source_id = %id, fraction, "extraction progress");
            })
        };
        let text = match extractor.extract_text(source_id, on_progress.as_ref()).await {
            Ok(text) => text,
            Err(err) => {
                warn!(source_id, error = %err, "text extraction failed");
                self.update_if_active(source_id, |session| {
                    session.state = ProcessingState::Failed;
                });
                return Err(err);
            }
        };
        if text.trim().is_empty() {
            self.update_if_active(source_id, |session| {
                session.state = ProcessingState::Failed;
            });
            return Err(ChatError::Extraction(format!(
                "no text could be extracted from '{source_id}'"
            )));
        }

        if !self.update_if_active(source_id, |session| {
            session.state = ProcessingState::Chunking;
        }) {
            return Ok(LoadOutcome::Superseded);
        }

        let segments = self.chunker.chunk(&text);
        debug!(source_id, count = segments.len(), "created segments");

        if !self.update_if_active(source_id, |session| {
            session.segments = segments.clone();
            session.state = ProcessingState::Embedding;
            session.progress = EmbeddingProgress {
                completed: 0,
                total: segments.len(),
                status: EmbeddingStatus::Starting,
            };
        }) {
            return Ok(LoadOutcome::Superseded);
        }

        // Tee the pipeline's snapshots into the session so observers polling
        // `session()` see per-segment progress, not just start and end. The
        // forwarder applies the same ownership guard as every other write.
        let (snapshot_tx, snapshot_rx) = flume::unbounded::<EmbeddingProgress>();
        let pipeline = self.pipeline.also_publishing(snapshot_tx);
        let forwarder = {
            let active = Arc::clone(&self.active);
            let id = source_id.to_string();
            tokio::spawn(async move {
                while let Ok(snapshot) = snapshot_rx.recv_async().await {
                    Self::update_session(&active, &id, |session| {
                        session.progress = snapshot;
                    });
                }
            })
        };

        let embedded = pipeline.embed_all(segments, provider).await;
        // Dropping the pipeline closes the teed sender; draining finishes
        // before the final commit below so the two writes cannot interleave.
        drop(pipeline);
        let _ = forwarder.await;

        let embedded_count = embedded.iter().filter(|s| s.has_embedding()).count();
        let segment_count = embedded.len();

        // Stale-write guard: commit only if this load still owns the session.
        if !self.update_if_active(source_id, |session| {
            session.progress = EmbeddingProgress {
                completed: embedded_count,
                total: segment_count,
                status: EmbeddingStatus::Completed {
                    embedded: embedded_count,
                    total: segment_count,
                },
            };
            session.segments = embedded;
            session.state = ProcessingState::Ready;
        }) {
            debug!(source_id, "session replaced during embedding, result discarded");
            return Ok(LoadOutcome::Superseded);
        }

        info!(source_id, segment_count, embedded_count, "document ready");
        Ok(LoadOutcome::Ready {
            source_id: source_id.to_string(),
            segment_count,
            embedded_count,
        })
    }

    /// Applies `mutate` to the active session only when it still belongs to
    /// `source_id`. Returns `false` when the session was replaced.
    fn update_if_active(
        &self,
        source_id: &str,
        mutate: impl FnOnce(&mut DocumentSession),
    ) -> bool {
        Self::update_session(&self.active, source_id, mutate)
    }

    fn update_session(
        active: &Mutex<Option<DocumentSession>>,
        source_id: &str,
        mutate: impl FnOnce(&mut DocumentSession),
    ) -> bool {
        let mut active = active.lock();
        match active.as_mut() {
            Some(session) if session.source_id == source_id => {
                mutate(session);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the active session's segments.
    pub fn segments(&self) -> Vec<Segment> {
        self.active
            .lock()
            .as_ref()
            .map(|session| session.segments.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the active session, if any.
    pub fn session(&self) -> Option<DocumentSession> {
        self.active.lock().clone()
    }

    /// Id of the active source, if any.
    pub fn source_id(&self) -> Option<String> {
        self.active
            .lock()
            .as_ref()
            .map(|session| session.source_id.clone())
    }

    /// Drops the active session. A pipeline still running for it will find
    /// the guard closed when it tries to commit.
    pub fn clear(&self) {
        *self.active.lock() = None;
    }
}

impl Default for DocumentManager {
    fn default() -> Self {
        Self::new()
    }
}
