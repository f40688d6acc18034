//! Error types for the resume-rank library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`RankError`] — **Fatal**: the request cannot be answered at all
//!   (malformed request, no file survived normalisation, model unreachable).
//!   Returned as `Err(RankError)` from [`crate::rank::Ranker::rank`].
//!
//! * [`FileError`] — **Non-fatal**: a single uploaded file was rejected
//!   (bad base64, too large, unsupported type, converter crash). Recorded in
//!   [`crate::output::Batch::rejections`] while every other file carries on.
//!
//! Only the aggregate "nothing survived" condition crosses from the second
//! kind into the first, as [`RankError::EmptyBatch`].

use crate::pipeline::detect::DocumentKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// All fatal errors returned by the resume-rank library.
#[derive(Debug, Error)]
pub enum RankError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request body is missing a required field or has the wrong shape.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Every submitted file was rejected by the normalisation pipeline.
    #[error("No valid files could be processed ({submitted} submitted)")]
    EmptyBatch { submitted: usize },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call failed on every attempt.
    #[error("Model analysis failed after {retries} retries: {detail}")]
    AnalysisFailed { retries: u32, detail: String },

    /// The final model call attempt exceeded the per-call timeout.
    #[error("Model analysis timed out after {secs}s")]
    AnalysisTimeout { secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Pipeline stage at which a file was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Reading the `{type, data}` record.
    Parse,
    /// Base64-decoding the payload.
    Decode,
    /// Size ceiling check.
    Validate,
    /// Declared-type classification and content sniffing.
    Detect,
    /// DOC/DOCX → PDF.
    Convert,
    /// PDF → PNG.
    Rasterise,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Parse => "parse",
            Stage::Decode => "decode",
            Stage::Validate => "validate",
            Stage::Detect => "detect",
            Stage::Convert => "convert",
            Stage::Rasterise => "rasterise",
        };
        f.write_str(s)
    }
}

/// A non-fatal error for a single uploaded file.
///
/// The batch continues unless ALL files fail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FileError {
    /// Entry is not a `{type, data}` record or carries no data payload.
    #[error("malformed entry: {reason}")]
    MalformedInput { reason: String },

    /// Payload is not valid base64.
    #[error("invalid base64 payload: {detail}")]
    DecodeError { detail: String },

    /// Payload exceeds the configured byte ceiling.
    #[error("{size} bytes exceeds the {limit}-byte limit at {stage} stage")]
    SizeExceeded {
        size: usize,
        limit: usize,
        stage: Stage,
    },

    /// Declared type is not one we handle, or the content contradicts it.
    #[error("unsupported type '{declared}': {reason}")]
    UnsupportedType { declared: String, reason: String },

    /// DOC/DOCX → PDF conversion produced no PDF.
    #[error("{kind} conversion failed: {detail}")]
    ConversionFailed { kind: DocumentKind, detail: String },

    /// PDF first-page rasterisation produced no image.
    #[error("rasterisation failed: {detail}")]
    RasterisationFailed { detail: String },

    /// Conversion or rasterisation exceeded the per-file timeout.
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },
}

impl FileError {
    /// Stage of the pipeline that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            FileError::MalformedInput { .. } => Stage::Parse,
            FileError::DecodeError { .. } => Stage::Decode,
            FileError::SizeExceeded { stage, .. } => *stage,
            FileError::UnsupportedType { .. } => Stage::Detect,
            FileError::ConversionFailed { .. } => Stage::Convert,
            FileError::RasterisationFailed { .. } => Stage::Rasterise,
            FileError::Timeout { stage, .. } => *stage,
        }
    }

    /// Malformed entries are dropped without a warning.
    pub fn is_silent(&self) -> bool {
        matches!(self, FileError::MalformedInput { .. })
    }
}
