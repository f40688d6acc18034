//! Values produced by the pipeline and the ranking entry point.

use crate::error::FileError;
use serde::{Deserialize, Serialize};

/// A single still image ready for the vision model.
///
/// `mime_type` always starts with `image/`; `bytes` is never a multi-page
/// or document container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A [`NormalizedImage`] re-encoded as standard base64 for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

/// A file dropped from the batch, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// 0-based position in the submitted list.
    pub index: usize,
    /// Declared type as submitted, if any.
    pub declared_type: Option<String>,
    pub error: FileError,
}

/// The normalised images of one request, in submission order.
///
/// Rejected files are dropped from `images`, never replaced by placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub images: Vec<EncodedImage>,
    pub rejections: Vec<Rejection>,
}

impl Batch {
    /// Number of accepted images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Number of entries that were submitted.
    pub fn submitted(&self) -> usize {
        self.images.len() + self.rejections.len()
    }

    pub fn stats(&self, duration_ms: u64) -> BatchStats {
        BatchStats {
            submitted: self.submitted(),
            accepted: self.images.len(),
            rejected: self.rejections.len(),
            normalize_duration_ms: duration_ms,
            analysis_duration_ms: 0,
        }
    }
}

/// Aggregate counters for one ranking request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub submitted: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub normalize_duration_ms: u64,
    pub analysis_duration_ms: u64,
}

/// Result of [`crate::rank::Ranker::rank`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankOutput {
    /// Raw model text, passed through verbatim.
    pub analysis: String,
    pub stats: BatchStats,
    pub rejections: Vec<Rejection>,
}
