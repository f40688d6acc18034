//! Batch assembly: submitted `{type, data}` records → ordered [`Batch`].
//!
//! ## Failure isolation
//!
//! Every per-file problem (malformed record, bad base64, oversize, unknown
//! type, converter crash, timeout) becomes a [`Rejection`] and the file is
//! dropped. Nothing a single file does can abort the batch; an empty result
//! is returned as-is and left for the caller to escalate.
//!
//! ## Ordering under fan-out
//!
//! Files are independent, so up to `concurrency` of them are normalised at
//! once. `StreamExt::buffered` yields results in submission order regardless
//! of completion order, and each result carries its index, so the batch the
//! model sees lines up with the list the client sent.

use crate::config::PipelineConfig;
use crate::error::{FileError, Stage};
use crate::output::{Batch, EncodedImage, Rejection};
use crate::pipeline::detect::{FileKind, Route};
use crate::pipeline::encode::{decode_payload, encode_image};
use crate::pipeline::normalize::{FileNormalizer, InputFile};
use crate::pipeline::size::SizeLimit;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives [`FileNormalizer`] over every file of a request.
#[derive(Clone)]
pub struct BatchAssembler {
    normalizer: FileNormalizer,
    limit: SizeLimit,
    concurrency: usize,
    file_timeout: Duration,
    progress: Option<ProgressCallback>,
}

/// A submitted entry after the transport checks: its declared type, and
/// either the decoded file or the reason it was refused.
type Parsed = (Option<String>, Result<InputFile, FileError>);

/// Steps 1–2: shape check and base64 decode.
fn parse_entry(entry: &Value) -> Parsed {
    let declared_type = entry.get("type").and_then(Value::as_str).map(str::to_string);
    let input = entry
        .as_object()
        .ok_or_else(|| malformed("entry is not an object"))
        .and_then(|record| match record.get("data") {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
            Some(Value::String(_)) | Some(Value::Null) | None => Err(malformed("no data payload")),
            Some(_) => Err(malformed("data is not a string")),
        })
        .and_then(|data| {
            let bytes = decode_payload(data)?;
            Ok(InputFile::new(declared_type.as_deref().unwrap_or(""), bytes))
        });
    (declared_type, input)
}

impl BatchAssembler {
    /// Assembler using LibreOffice and pdfium.
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_normalizer(config, FileNormalizer::new(config))
    }

    /// Assembler around a pre-built normaliser (custom backends).
    pub fn with_normalizer(config: &PipelineConfig, normalizer: FileNormalizer) -> Self {
        Self {
            normalizer,
            limit: SizeLimit::new(config.max_file_size),
            concurrency: config.concurrency.max(1),
            file_timeout: Duration::from_secs(config.file_timeout_secs),
            progress: config.progress_callback.clone(),
        }
    }

    pub fn normalizer(&self) -> &FileNormalizer {
        &self.normalizer
    }

    /// Normalise a list of JSON `{type, data}` records.
    ///
    /// Entries that are not objects or carry no `data` string are skipped
    /// silently; every other failure is logged and skipped.
    pub async fn assemble(&self, raw_files: &[Value]) -> Batch {
        self.run(raw_files.iter().map(parse_entry).collect()).await
    }

    /// Normalise files whose bytes are already in hand (CLI, library users).
    pub async fn assemble_inputs(&self, files: Vec<InputFile>) -> Batch {
        let parsed = files
            .into_iter()
            .map(|file| (Some(file.declared_type.clone()), Ok(file)))
            .collect();
        self.run(parsed).await
    }

    async fn run(&self, items: Vec<Parsed>) -> Batch {
        let total = items.len();
        let start = Instant::now();
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        let outcomes: Vec<(usize, Option<String>, Result<EncodedImage, FileError>)> =
            stream::iter(items.into_iter().enumerate())
                .map(|(index, (declared_type, input))| {
                    self.process_entry(index, total, declared_type, input)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut batch = Batch::default();
        for (index, declared_type, outcome) in outcomes {
            match outcome {
                Ok(image) => batch.images.push(image),
                Err(error) => batch.rejections.push(Rejection {
                    index,
                    declared_type,
                    error,
                }),
            }
        }

        info!(
            submitted = total,
            accepted = batch.len(),
            rejected = batch.rejections.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch assembled"
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, batch.len());
        }
        batch
    }

    async fn process_entry(
        &self,
        index: usize,
        total: usize,
        declared_type: Option<String>,
        input: Result<InputFile, FileError>,
    ) -> (usize, Option<String>, Result<EncodedImage, FileError>) {
        if let Some(ref cb) = self.progress {
            cb.on_file_start(index, total);
        }
        let result = self.process(input).await;

        match &result {
            Ok(image) => {
                debug!(index, mime_type = %image.mime_type, "File normalised");
                if let Some(ref cb) = self.progress {
                    cb.on_file_complete(index, total, &image.mime_type);
                }
            }
            Err(error) => {
                let file_type = declared_type.as_deref().unwrap_or("");
                if error.is_silent() {
                    debug!(index, %error, "Skipping malformed entry");
                } else {
                    warn!(index, file_type, stage = %error.stage(), %error, "Skipping file");
                }
                if let Some(ref cb) = self.progress {
                    cb.on_file_error(index, total, error);
                }
            }
        }
        (index, declared_type, result)
    }

    /// Steps 3–5 for one parsed entry.
    async fn process(&self, input: Result<InputFile, FileError>) -> Result<EncodedImage, FileError> {
        let input = input?;
        self.limit.check(&input.bytes, Stage::Validate)?;

        let stage = timeout_stage(&input.declared_type);
        let image = tokio::time::timeout(self.file_timeout, self.normalizer.normalize(&input))
            .await
            .map_err(|_| FileError::Timeout {
                stage,
                secs: self.file_timeout.as_secs(),
            })??;
        Ok(encode_image(&image))
    }
}

/// Stage blamed when a whole file runs out of time.
fn timeout_stage(declared_type: &str) -> Stage {
    match FileKind::parse(declared_type).map(|k| k.route()) {
        Some(Route::ConvertThenRasterise(_)) => Stage::Convert,
        Some(Route::Rasterise) => Stage::Rasterise,
        _ => Stage::Detect,
    }
}

fn malformed(reason: &str) -> FileError {
    FileError::MalformedInput {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::convert::DocumentConverter;
    use crate::pipeline::detect::DocumentKind;
    use crate::pipeline::render::PageRasterizer;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::json;
    use std::sync::Arc;

    struct EchoBackend;

    #[async_trait]
    impl DocumentConverter for EchoBackend {
        async fn convert(&self, doc: &[u8], _kind: DocumentKind) -> Result<Vec<u8>, FileError> {
            Ok(doc.to_vec())
        }
    }

    #[async_trait]
    impl PageRasterizer for EchoBackend {
        async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<u8>, FileError> {
            Ok(pdf.to_vec())
        }
    }

    fn assembler(config: PipelineConfig) -> BatchAssembler {
        let backend = Arc::new(EchoBackend);
        let normalizer = FileNormalizer::with_backends(&config, backend.clone(), backend);
        BatchAssembler::with_normalizer(&config, normalizer)
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let a = assembler(PipelineConfig::default());
        let batch = a
            .assemble(&[
                json!("just a string"),
                json!({"type": "png"}),
                json!({"type": "png", "data": ""}),
                json!({"type": "png", "data": 42}),
                json!({"type": "png", "data": STANDARD.encode(b"ok")}),
            ])
            .await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.rejections.len(), 4);
        assert!(batch.rejections.iter().all(|r| r.error.is_silent()));
        assert_eq!(batch.rejections[0].index, 0);
    }

    #[tokio::test]
    async fn size_check_runs_on_decoded_bytes() {
        let a = assembler(PipelineConfig::builder().max_file_size(3).build().unwrap());
        let batch = a
            .assemble(&[
                json!({"type": "jpg", "data": STANDARD.encode(b"abc")}),
                json!({"type": "jpg", "data": STANDARD.encode(b"abcd")}),
            ])
            .await;
        assert_eq!(batch.len(), 1);
        assert!(matches!(
            batch.rejections[0].error,
            FileError::SizeExceeded {
                size: 4,
                limit: 3,
                stage: Stage::Validate
            }
        ));
    }

    #[tokio::test]
    async fn missing_type_is_unsupported_not_malformed() {
        let a = assembler(PipelineConfig::default());
        let batch = a.assemble(&[json!({"data": STANDARD.encode(b"x")})]).await;
        assert!(batch.is_empty());
        assert!(matches!(
            batch.rejections[0].error,
            FileError::UnsupportedType { .. }
        ));
        assert_eq!(batch.rejections[0].declared_type, None);
    }

    #[tokio::test]
    async fn assembly_runs_on_a_spawned_task() {
        fn assert_send<T: Send>(_: &T) {}

        let a = assembler(PipelineConfig::default());
        let files = vec![json!({"type": "png", "data": STANDARD.encode(b"ok")})];
        assert_send(&a.assemble(&files));

        let batch = tokio::spawn(async move { a.assemble(&files).await })
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn parse_entry_keeps_declared_type_of_refused_entries() {
        let (declared, input) = parse_entry(&json!({"type": "pdf", "data": 7}));
        assert_eq!(declared.as_deref(), Some("pdf"));
        assert!(matches!(input, Err(FileError::MalformedInput { .. })));
    }

    #[test]
    fn timeout_stage_follows_route() {
        assert_eq!(timeout_stage("docx"), Stage::Convert);
        assert_eq!(timeout_stage("pdf"), Stage::Rasterise);
        assert_eq!(timeout_stage("png"), Stage::Detect);
    }
}
