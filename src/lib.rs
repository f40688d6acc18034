//! # resume-rank
//!
//! Normalise résumé uploads into single still images and rank them against a
//! job description with a Vision Language Model (VLM).
//!
//! ## Why this crate?
//!
//! Candidates send whatever they have: phone photos, exported PDFs, Word
//! documents old and new. A vision model can compare them side by side only
//! if every résumé arrives as one image of the same kind. This crate does
//! that normalisation, isolates the files that cannot be handled, and hands
//! the surviving batch to the model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! {type, data} × N
//!  │
//!  ├─ 1. Decode     base64 → bytes, malformed entries skipped
//!  ├─ 2. Validate   byte ceiling (default 10 MiB)
//!  ├─ 3. Normalise  image: pass through
//!  │                pdf:   first page → PNG via pdfium (spawn_blocking)
//!  │                doc/x: LibreOffice → PDF → PNG
//!  ├─ 4. Encode     bytes → base64, submission order kept
//!  └─ 5. Analyse    one VLM call with every image + the job description
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resume_rank::{AnalysisConfig, PipelineConfig, RankRequest, Ranker, VisionAnalyzer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let analyzer = VisionAnalyzer::from_config(AnalysisConfig::default())?;
//!     let ranker = Ranker::new(&PipelineConfig::default(), Arc::new(analyzer));
//!     let request = RankRequest {
//!         files: vec![serde_json::json!({"type": "pdf", "data": "JVBERi0xLjc..."})],
//!         job_description: "Senior backend engineer".into(),
//!         job_post_id: "42".into(),
//!     };
//!     let output = ranker.rank(&request).await?;
//!     println!("{}", output.analysis);
//!     Ok(())
//! }
//! ```
//!
//! ## External Tools
//!
//! | Needed for | Tool | Configured by |
//! |------------|------|---------------|
//! | DOC/DOCX   | LibreOffice `soffice` | `PipelineConfig::converter_command` |
//! | PDF        | pdfium shared library | `PipelineConfig::pdfium_lib_path`, `PDFIUM_LIB_PATH` |
//!
//! Image uploads need neither.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resume-rank` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod rank;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{CandidateAnalyzer, JobPosting, VisionAnalyzer};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, PipelineConfig, PipelineConfigBuilder};
pub use error::{FileError, RankError, Stage};
pub use output::{Batch, BatchStats, EncodedImage, NormalizedImage, RankOutput, Rejection};
pub use pipeline::batch::BatchAssembler;
pub use pipeline::convert::{DocumentConverter, OfficeConverter};
pub use pipeline::detect::{DocumentKind, FileKind};
pub use pipeline::normalize::{FileNormalizer, InputFile};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use pipeline::size::SizeLimit;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use rank::{RankRequest, Ranker};
pub use server::{create_router, DEFAULT_MAX_REQUEST_BYTES};
