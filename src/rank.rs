//! Request-level orchestration: validate → assemble → analyse.
//!
//! [`Ranker`] is what the HTTP handler and the CLI both call. It owns one
//! [`BatchAssembler`] and one [`CandidateAnalyzer`] and is shared behind an
//! `Arc` across requests; neither holds per-request state.

use crate::analyze::{CandidateAnalyzer, JobPosting};
use crate::config::PipelineConfig;
use crate::error::RankError;
use crate::output::{Batch, RankOutput};
use crate::pipeline::batch::BatchAssembler;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// One ranking request: the uploads plus the job they are ranked for.
#[derive(Debug, Clone, PartialEq)]
pub struct RankRequest {
    /// Raw `{type, data}` records, unvalidated.
    pub files: Vec<Value>,
    pub job_description: String,
    pub job_post_id: String,
}

impl RankRequest {
    /// Reject requests that can never produce an answer.
    ///
    /// Per-file problems are not checked here; they belong to the pipeline.
    pub fn validate(&self) -> Result<(), RankError> {
        if self.files.is_empty() {
            return Err(RankError::InvalidRequest("'files' must not be empty".into()));
        }
        if self.job_description.trim().is_empty() {
            return Err(RankError::InvalidRequest(
                "'job_description' must not be empty".into(),
            ));
        }
        if self.job_post_id.trim().is_empty() {
            return Err(RankError::InvalidRequest(
                "'job_post_id' must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn job(&self) -> JobPosting {
        JobPosting::new(self.job_description.clone(), self.job_post_id.trim())
    }
}

/// Normalises a request's files and hands the surviving batch to the model.
#[derive(Clone)]
pub struct Ranker {
    assembler: BatchAssembler,
    analyzer: Arc<dyn CandidateAnalyzer>,
}

impl std::fmt::Debug for Ranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ranker")
            .field("analyzer", &"<dyn CandidateAnalyzer>")
            .finish_non_exhaustive()
    }
}

impl Ranker {
    /// Ranker with the default LibreOffice/pdfium pipeline.
    pub fn new(pipeline: &PipelineConfig, analyzer: Arc<dyn CandidateAnalyzer>) -> Self {
        Self::with_assembler(BatchAssembler::new(pipeline), analyzer)
    }

    pub fn with_assembler(assembler: BatchAssembler, analyzer: Arc<dyn CandidateAnalyzer>) -> Self {
        Self {
            assembler,
            analyzer,
        }
    }

    pub fn assembler(&self) -> &BatchAssembler {
        &self.assembler
    }

    /// Rank the candidates in `request`.
    ///
    /// # Errors
    /// - [`RankError::InvalidRequest`] when the request fails validation.
    /// - [`RankError::EmptyBatch`] when no file survived normalisation. The
    ///   analyzer is not called.
    /// - Whatever the analyzer returns.
    pub async fn rank(&self, request: &RankRequest) -> Result<RankOutput, RankError> {
        request.validate()?;

        let normalize_start = Instant::now();
        let batch = self.assembler.assemble(&request.files).await;
        let normalize_ms = normalize_start.elapsed().as_millis() as u64;

        self.analyze_batch(batch, &request.job(), normalize_ms).await
    }

    /// Send an already-assembled batch to the analyzer.
    pub async fn analyze_batch(
        &self,
        batch: Batch,
        job: &JobPosting,
        normalize_ms: u64,
    ) -> Result<RankOutput, RankError> {
        if batch.is_empty() {
            let submitted = batch.submitted();
            error!(submitted, job_post_id = %job.post_id, "No valid files could be processed");
            return Err(RankError::EmptyBatch { submitted });
        }

        let mut stats = batch.stats(normalize_ms);
        let analysis_start = Instant::now();
        let analysis = self.analyzer.analyze(&batch.images, job).await?;
        stats.analysis_duration_ms = analysis_start.elapsed().as_millis() as u64;

        info!(
            job_post_id = %job.post_id,
            accepted = stats.accepted,
            rejected = stats.rejected,
            analysis_ms = stats.analysis_duration_ms,
            "Ranking complete"
        );
        Ok(RankOutput {
            analysis,
            stats,
            rejections: batch.rejections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::EncodedImage;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CandidateAnalyzer for CountingAnalyzer {
        async fn analyze(
            &self,
            images: &[EncodedImage],
            job: &JobPosting,
        ) -> Result<String, RankError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} images for {}", images.len(), job.post_id))
        }
    }

    fn request(files: Vec<Value>) -> RankRequest {
        RankRequest {
            files,
            job_description: "Data engineer".into(),
            job_post_id: "99".into(),
        }
    }

    #[test]
    fn validate_rejects_blank_fields() {
        assert!(request(vec![]).validate().is_err());
        let mut r = request(vec![json!({})]);
        r.job_description = "   ".into();
        assert!(matches!(r.validate(), Err(RankError::InvalidRequest(_))));
        let mut r = request(vec![json!({})]);
        r.job_post_id = "".into();
        assert!(r.validate().is_err());
        assert!(request(vec![json!({})]).validate().is_ok());
    }

    #[tokio::test]
    async fn empty_batch_never_reaches_analyzer() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let ranker = Ranker::new(&PipelineConfig::default(), analyzer.clone());
        let err = ranker
            .rank(&request(vec![
                json!({"type": "gif", "data": STANDARD.encode(b"GIF89a")}),
                json!({"type": "png", "data": "***"}),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, RankError::EmptyBatch { submitted: 2 }));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn surviving_images_are_analysed() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let ranker = Ranker::new(&PipelineConfig::default(), analyzer.clone());
        let out = ranker
            .rank(&request(vec![
                json!({"type": "jpg", "data": STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0])}),
                json!({"type": "exe", "data": STANDARD.encode(b"MZ")}),
            ]))
            .await
            .unwrap();
        assert_eq!(out.analysis, "1 images for 99");
        assert_eq!(out.stats.accepted, 1);
        assert_eq!(out.stats.rejected, 1);
        assert_eq!(out.rejections[0].index, 1);
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }
}
