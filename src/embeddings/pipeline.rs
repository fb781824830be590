//! Drives an [`EmbeddingProvider`] over every segment of a document.
//!
//! The pipeline is serial: segments are embedded strictly in stored order so
//! progress counters stay predictable for the consumer and the external
//! provider's rate limits are respected. A segment whose embedding call
//! fails keeps `embedding = None` and processing continues; pipeline
//! failures are partial, never aborting the batch.

use std::fmt;

use tracing::{debug, warn};

use super::EmbeddingProvider;
use crate::chunking::Segment;

/// Milestone reached by the pipeline, rendered as user-visible status text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingStatus {
    /// No pipeline run has started.
    NotStarted,
    /// `embed_all` was called with an empty segment list.
    NothingToEmbed,
    /// The run is beginning.
    Starting,
    /// Segment `current` of `total` is being embedded (1-based).
    Generating { current: usize, total: usize },
    /// Segment `index` (1-based) failed; `detail` is the provider error text.
    SegmentFailed { index: usize, detail: String },
    /// The run finished; `embedded` of `total` segments carry vectors.
    Completed { embedded: usize, total: usize },
}

impl fmt::Display for EmbeddingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingStatus::NotStarted => write!(f, "Not started"),
            EmbeddingStatus::NothingToEmbed => write!(f, "No segments to embed"),
            EmbeddingStatus::Starting => write!(f, "Starting embedding generation"),
            EmbeddingStatus::Generating { current, total } => {
                write!(f, "Generating embedding {current}/{total}")
            }
            EmbeddingStatus::SegmentFailed { index, detail } => {
                write!(f, "Error embedding segment {index}: {detail}")
            }
            EmbeddingStatus::Completed { embedded, total } => {
                write!(f, "Completed: {embedded}/{total} segments embedded")
            }
        }
    }
}

/// Snapshot of pipeline progress, published after every attempt.
///
/// `completed` is monotonically non-decreasing within one run, and the final
/// value counts only segments whose vector is non-`None` — which may be less
/// than `total` when some calls failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddingProgress {
    pub completed: usize,
    pub total: usize,
    pub status: EmbeddingStatus,
}

impl EmbeddingProgress {
    /// The initial, idle progress value.
    pub fn idle() -> Self {
        Self {
            completed: 0,
            total: 0,
            status: EmbeddingStatus::NotStarted,
        }
    }
}

/// Serial embedding pipeline with optional progress publication.
#[derive(Clone, Default)]
pub struct EmbeddingPipeline {
    progress: Vec<flume::Sender<EmbeddingProgress>>,
}

impl EmbeddingPipeline {
    /// Creates a pipeline that does not publish progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pipeline that publishes an [`EmbeddingProgress`] snapshot
    /// on `sender` after each milestone. A disconnected receiver is ignored.
    pub fn with_progress(sender: flume::Sender<EmbeddingProgress>) -> Self {
        Self {
            progress: vec![sender],
        }
    }

    /// Returns a pipeline that additionally publishes every snapshot on
    /// `sender`, keeping any senders already configured.
    #[must_use]
    pub fn also_publishing(&self, sender: flume::Sender<EmbeddingProgress>) -> Self {
        let mut progress = self.progress.clone();
        progress.push(sender);
        Self { progress }
    }

    fn publish(&self, completed: usize, total: usize, status: EmbeddingStatus) {
        for sender in &self.progress {
            let _ = sender.send(EmbeddingProgress {
                completed,
                total,
                status: status.clone(),
            });
        }
    }

    /// Embeds every segment in order, filling in vectors where the provider
    /// call succeeds.
    ///
    /// Returns the same segments with embeddings attached. Never fails as a
    /// whole: a segment whose call errors keeps its vector unset and the
    /// run continues with the next one.
    pub async fn embed_all(
        &self,
        mut segments: Vec<Segment>,
        provider: &dyn EmbeddingProvider,
    ) -> Vec<Segment> {
        let total = segments.len();
        if total == 0 {
            self.publish(0, 0, EmbeddingStatus::NothingToEmbed);
            return segments;
        }

        self.publish(0, total, EmbeddingStatus::Starting);
        debug!(total, "starting embedding generation");

        let mut completed = 0;
        for (index, segment) in segments.iter_mut().enumerate() {
            self.publish(
                completed,
                total,
                EmbeddingStatus::Generating {
                    current: index + 1,
                    total,
                },
            );

            match provider.embed(&segment.content).await {
                Ok(embedding) => {
                    segment.embedding = Some(embedding);
                    completed += 1;
                }
                Err(err) => {
                    warn!(segment = index + 1, error = %err, "embedding failed, skipping segment");
                    self.publish(
                        completed,
                        total,
                        EmbeddingStatus::SegmentFailed {
                            index: index + 1,
                            detail: err.to_string(),
                        },
                    );
                }
            }
        }

        let embedded = segments.iter().filter(|s| s.has_embedding()).count();
        debug!(embedded, total, "embedding generation complete");
        self.publish(embedded, total, EmbeddingStatus::Completed { embedded, total });

        segments
    }
}
