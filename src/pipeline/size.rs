//! Byte-ceiling check applied at every point where a payload can grow.

use crate::error::{FileError, Stage};

/// Default ceiling for a single file: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Maximum accepted payload size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimit {
    max_bytes: usize,
}

impl SizeLimit {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// `true` iff `bytes` fits under the ceiling (inclusive).
    pub fn validate(&self, bytes: &[u8]) -> bool {
        bytes.len() <= self.max_bytes
    }

    /// Like [`validate`](Self::validate), but reports where the check failed.
    pub fn check(&self, bytes: &[u8], stage: Stage) -> Result<(), FileError> {
        if self.validate(bytes) {
            Ok(())
        } else {
            Err(FileError::SizeExceeded {
                size: bytes.len(),
                limit: self.max_bytes,
                stage,
            })
        }
    }
}

impl Default for SizeLimit {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}
