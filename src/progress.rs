//! Progress-callback trait for per-file normalisation events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the assembler works through a batch. The CLI uses it to drive
//! an indicatif progress bar; the HTTP server leaves it unset.
//!
//! # Example
//!
//! ```rust
//! use resume_rank::{BatchProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     accepted: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, mime_type: &str) {
//!         let done = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("file {}/{} → {} ({} accepted)", index + 1, total, mime_type, done);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { accepted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::FileError;
use std::sync::Arc;

/// Called by the batch assembler as it processes each file.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the
/// per-file methods may be called concurrently and out of index order.
/// All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any file is processed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when work on a file begins. `index` is 0-based.
    fn on_file_start(&self, index: usize, total_files: usize) {
        let _ = (index, total_files);
    }

    /// Called when a file was normalised and added to the batch.
    fn on_file_complete(&self, index: usize, total_files: usize, mime_type: &str) {
        let _ = (index, total_files, mime_type);
    }

    /// Called when a file was rejected.
    fn on_file_error(&self, index: usize, total_files: usize, error: &FileError) {
        let _ = (index, total_files, error);
    }

    /// Called once after every file has been handled.
    fn on_batch_complete(&self, total_files: usize, accepted: usize) {
        let _ = (total_files, accepted);
    }
}

/// Type alias for the shared callback handle stored in config.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

/// A callback that ignores every event.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}
