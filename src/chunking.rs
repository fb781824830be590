//! Sliding-window text segmentation.
//!
//! A document's raw text is split into overlapping character windows so each
//! segment carries enough surrounding context to be useful as grounding
//! material on its own. Chunking is a pure function of its inputs; embedding
//! vectors are attached later by the pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded span of source text plus an optional embedding vector.
///
/// Content is immutable once created; the vector is filled in post-hoc by
/// the embedding pipeline. All non-`None` vectors within a document share
/// the same dimensionality.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Segment {
    /// Unique identifier for this segment.
    pub id: Uuid,
    /// The segment's text content.
    pub content: String,
    /// Embedding vector, if one has been generated.
    pub embedding: Option<Vec<f32>>,
}

impl Segment {
    /// Creates a segment without an embedding.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            embedding: None,
        }
    }

    /// Attaches an embedding vector.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Returns `true` when the segment carries a vector.
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Window size and overlap for [`chunk`](Chunker::chunk), in characters.
#[derive(Clone, Copy, Debug)]
pub struct Chunker {
    /// Maximum character span of a segment.
    pub size: usize,
    /// Character span shared with the previous segment.
    pub overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 200,
        }
    }
}

impl Chunker {
    /// Creates a chunker with the given window size and overlap.
    pub fn new(size: usize, overlap: usize) -> Self {
        Self { size, overlap }
    }

    /// Splits `text` into overlapping segments.
    ///
    /// The window slides forward by `size - overlap` characters until its
    /// start reaches the end of the text; the final segment may be shorter
    /// than `size`. Empty text produces no segments. When `overlap >= size`
    /// the step would be zero, so exactly one segment is emitted instead of
    /// looping forever.
    pub fn chunk(&self, text: &str) -> Vec<Segment> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let step = self.size.saturating_sub(self.overlap);
        let mut segments = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.size).min(chars.len());
            segments.push(Segment::new(chars[start..end].iter().collect::<String>()));
            if step == 0 {
                // overlap >= size: the window cannot advance
                break;
            }
            start += step;
        }

        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_text_produces_no_segments() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    fn short_text_produces_single_segment() {
        let chunker = Chunker::new(1000, 200);
        let segments = chunker.chunk("hello world");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].content, "hello world");
        assert!(!segments[0].has_embedding());
    }

    #[test]
    fn windows_overlap_by_configured_span() {
        let chunker = Chunker::new(10, 4);
        let text = "abcdefghijklmnopqrstuvwxyz";
        let segments = chunker.chunk(text);

        assert_eq!(segments[0].content, "abcdefghij");
        // Next window starts size - overlap = 6 characters in.
        assert_eq!(segments[1].content, "ghijklmnop");
        let last = segments.last().unwrap();
        assert!(last.content.len() <= 10);
        assert!(text.ends_with(&last.content));
    }

    #[test]
    fn overlap_equal_to_size_terminates_with_one_segment() {
        let chunker = Chunker::new(5, 5);
        let segments = chunker.chunk("a long enough piece of text");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].content, "a lon");
    }

    #[test]
    fn overlap_greater_than_size_terminates_with_one_segment() {
        let chunker = Chunker::new(5, 50);
        let segments = chunker.chunk("another piece of text");
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn segment_count_is_bounded() {
        let chunker = Chunker::new(100, 20);
        let text = "x".repeat(1050);
        let segments = chunker.chunk(&text);
        // ceil(len / (size - overlap))
        let bound = 1050_usize.div_ceil(80);
        assert!(segments.len() <= bound);
    }

    proptest! {
        /// Dropping each segment's overlap prefix and concatenating the rest
        /// reconstructs the original text.
        #[test]
        fn chunks_reconstruct_text(
            text in "[a-z ]{0,400}",
            size in 4_usize..40,
            overlap in 0_usize..3,
        ) {
            let chunker = Chunker::new(size, overlap);
            let segments = chunker.chunk(&text);
            let step = size - overlap;

            let mut rebuilt = String::new();
            for (idx, segment) in segments.iter().enumerate() {
                let chars: Vec<char> = segment.content.chars().collect();
                let skip = if idx == 0 { 0 } else { chars.len().min(overlap) };
                rebuilt.extend(&chars[skip..]);
            }
            prop_assert_eq!(rebuilt, text.clone());

            if !text.is_empty() {
                let bound = text.chars().count().div_ceil(step);
                prop_assert!(segments.len() <= bound.max(1));
            }
        }
    }
}
