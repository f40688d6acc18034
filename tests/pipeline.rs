//! Integration tests for the normalisation pipeline.
//!
//! The rasteriser is stubbed so these run without pdfium. On unix the
//! converter is a real child process (a small `sh` script standing in for
//! `soffice`), which exercises the temp-directory and timeout handling end
//! to end.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use resume_rank::{
    BatchAssembler, BatchProgressCallback, DocumentConverter, DocumentKind, FileError,
    FileNormalizer, PageRasterizer, PipelineConfig, Stage,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Renders "PDFs" by prefixing a PNG signature, optionally after a delay
/// encoded in the document's last byte (tenths of a second).
#[derive(Default)]
struct StubRasterizer {
    seen: Mutex<Vec<Vec<u8>>>,
    delayed: bool,
}

#[async_trait]
impl PageRasterizer for StubRasterizer {
    async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<u8>, FileError> {
        self.seen.lock().unwrap().push(pdf.to_vec());
        if self.delayed {
            let tenths = *pdf.last().unwrap_or(&0) as u64;
            tokio::time::sleep(Duration::from_millis(tenths * 100)).await;
        }
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(pdf);
        Ok(png)
    }
}

struct StubConverter;

#[async_trait]
impl DocumentConverter for StubConverter {
    async fn convert(&self, doc: &[u8], kind: DocumentKind) -> Result<Vec<u8>, FileError> {
        if doc.starts_with(b"corrupt") {
            return Err(FileError::ConversionFailed {
                kind,
                detail: "source file could not be loaded".into(),
            });
        }
        Ok([b"%PDF-".as_slice(), doc].concat())
    }
}

fn assembler_with(config: &PipelineConfig, rasterizer: Arc<StubRasterizer>) -> BatchAssembler {
    let normalizer = FileNormalizer::with_backends(config, Arc::new(StubConverter), rasterizer);
    BatchAssembler::with_normalizer(config, normalizer)
}

fn entry(ty: &str, bytes: &[u8]) -> Value {
    json!({ "type": ty, "data": STANDARD.encode(bytes) })
}

fn decoded(data: &str) -> Vec<u8> {
    STANDARD.decode(data).expect("output is valid base64")
}

// ── Batch assembly ───────────────────────────────────────────────────────────

#[tokio::test]
async fn bad_files_are_dropped_and_good_ones_kept() {
    let config = PipelineConfig::builder().max_file_size(1024).build().unwrap();
    let assembler = assembler_with(&config, Arc::new(StubRasterizer::default()));

    let mut oversized_pdf = b"%PDF-1.7\n".to_vec();
    oversized_pdf.resize(2048, b' ');

    let batch = assembler
        .assemble(&[
            entry("jpeg", JPEG),
            json!({ "type": "png", "data": "not//valid==base64!!" }),
            entry("pdf", &oversized_pdf),
        ])
        .await;

    assert_eq!(batch.len(), 1);
    assert_eq!(batch.images[0].mime_type, "image/jpeg");
    assert_eq!(decoded(&batch.images[0].data), JPEG);

    let reasons: Vec<(usize, Stage)> = batch
        .rejections
        .iter()
        .map(|r| (r.index, r.error.stage()))
        .collect();
    assert_eq!(reasons, vec![(1, Stage::Decode), (2, Stage::Validate)]);
}

#[tokio::test]
async fn empty_and_all_failing_inputs_give_empty_batch() {
    let config = PipelineConfig::default();
    let assembler = assembler_with(&config, Arc::new(StubRasterizer::default()));

    let batch = assembler.assemble(&[]).await;
    assert!(batch.is_empty());
    assert_eq!(batch.submitted(), 0);

    let batch = assembler
        .assemble(&[
            entry("gif", b"GIF89a"),
            entry("docx", b"corrupt zip"),
            json!(null),
        ])
        .await;
    assert!(batch.is_empty());
    assert_eq!(batch.rejections.len(), 3);
    assert!(matches!(
        batch.rejections[1].error,
        FileError::ConversionFailed {
            kind: DocumentKind::Docx,
            ..
        }
    ));
}

#[tokio::test]
async fn images_round_trip_byte_identical() {
    let config = PipelineConfig::default();
    let assembler = assembler_with(&config, Arc::new(StubRasterizer::default()));
    let png: Vec<u8> = (0..=255u8).collect();
    let encoded = STANDARD.encode(&png);
    let wrapped = format!("data:image/png;base64,{}\n", encoded);

    let batch = assembler
        .assemble(&[
            json!({ "type": "png", "data": encoded }),
            json!({ "type": "PNG", "data": wrapped }),
        ])
        .await;

    assert_eq!(batch.len(), 2);
    assert_eq!(batch.images[0].data, encoded);
    assert_eq!(decoded(&batch.images[1].data), png);
    assert_eq!(batch.images[1].mime_type, "image/png");
}

#[tokio::test]
async fn order_is_preserved_under_concurrency() {
    let config = PipelineConfig::builder().concurrency(4).build().unwrap();
    let rasterizer = Arc::new(StubRasterizer {
        delayed: true,
        ..Default::default()
    });
    let assembler = assembler_with(&config, rasterizer.clone());

    // Earlier files take longer, so completion order is the reverse of input order.
    let files: Vec<Value> = (0..4u8)
        .map(|i| entry("pdf", &[b'%', b'P', b'D', b'F', b'0' + i, 4 - i]))
        .collect();
    let batch = assembler.assemble(&files).await;

    assert_eq!(batch.len(), 4);
    for (i, image) in batch.images.iter().enumerate() {
        let bytes = decoded(&image.data);
        assert_eq!(bytes[8 + 4], b'0' + i as u8, "image {i} out of order");
        assert_eq!(image.mime_type, "image/png");
    }
    assert_eq!(rasterizer.seen.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn documents_are_converted_then_rasterised() {
    let config = PipelineConfig::default();
    let rasterizer = Arc::new(StubRasterizer::default());
    let assembler = assembler_with(&config, rasterizer.clone());

    let batch = assembler
        .assemble(&[entry("doc", b"word97"), entry("docx", b"ooxml")])
        .await;

    assert_eq!(batch.len(), 2);
    let mut seen = rasterizer.seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![b"%PDF-ooxml".to_vec(), b"%PDF-word97".to_vec()]);
}

#[tokio::test]
async fn content_verification_rejects_spoofed_types() {
    let config = PipelineConfig::builder().verify_content(true).build().unwrap();
    let rasterizer = Arc::new(StubRasterizer::default());
    let assembler = assembler_with(&config, rasterizer.clone());

    let batch = assembler
        .assemble(&[entry("jpg", b"%PDF-1.7 actually a pdf"), entry("jpg", JPEG)])
        .await;

    assert_eq!(batch.len(), 1);
    assert_eq!(batch.rejections[0].index, 0);
    assert_eq!(batch.rejections[0].error.stage(), Stage::Detect);
    assert!(rasterizer.seen.lock().unwrap().is_empty());
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    summary: Mutex<Option<(usize, usize)>>,
}

impl BatchProgressCallback for Counting {
    fn on_file_start(&self, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_complete(&self, _index: usize, _total: usize, _mime_type: &str) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_error(&self, _index: usize, _total: usize, _error: &FileError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, total: usize, accepted: usize) {
        *self.summary.lock().unwrap() = Some((total, accepted));
    }
}

#[tokio::test]
async fn progress_callback_sees_every_file() {
    let counter = Arc::new(Counting::default());
    let config = PipelineConfig::builder()
        .progress_callback(counter.clone())
        .build()
        .unwrap();
    let assembler = assembler_with(&config, Arc::new(StubRasterizer::default()));

    assembler
        .assemble(&[entry("png", b"png"), entry("txt", b"hello"), entry("pdf", b"%PDF")])
        .await;

    assert_eq!(counter.started.load(Ordering::SeqCst), 3);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counter.failed.load(Ordering::SeqCst), 1);
    assert_eq!(*counter.summary.lock().unwrap(), Some((3, 2)));
}

// ── Real child-process converter (unix) ──────────────────────────────────────

#[cfg(unix)]
mod office {
    use super::*;
    use resume_rank::OfficeConverter;
    use std::path::Path;

    /// Mimics `soffice --convert-to pdf --outdir DIR SOURCE`.
    const CONVERTING: &str = r#"
outdir="$6"; src="$7"
base=$(basename "$src")
printf '%%PDF-1.4 from %s' "$base" > "$outdir/${base%.*}.pdf"
"#;
    const CRASHING: &str = "echo 'Error: source file could not be loaded' >&2\nexit 1\n";
    const SILENT: &str = "exit 0\n";
    const HANGING: &str = "sleep 30\n";
    /// Like the real launcher: the worker is a forked child that keeps
    /// writing into the output directory after the launcher is killed.
    const FORKING_LATE_WRITER: &str = r#"
outdir="$6"
( sleep 2; mkdir -p "$outdir/profile/user"; echo late > "$outdir/source.pdf" ) &
wait
"#;

    struct Harness {
        assembler: BatchAssembler,
        rasterizer: Arc<StubRasterizer>,
        _script: tempfile::NamedTempFile,
    }

    /// The script lives outside `temp_root` so the root starts and ends empty.
    fn assembler_running(script: &str, temp_root: &Path, timeout: u64) -> Harness {
        let script_file = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
        std::fs::write(script_file.path(), script).unwrap();
        let config = PipelineConfig::builder()
            .temp_dir(temp_root)
            .converter_command(["sh".to_string(), script_file.path().display().to_string()])
            .file_timeout_secs(timeout)
            .build()
            .unwrap();
        let rasterizer = Arc::new(StubRasterizer::default());
        let normalizer = FileNormalizer::with_backends(
            &config,
            Arc::new(OfficeConverter::new(&config)),
            rasterizer.clone(),
        );
        Harness {
            assembler: BatchAssembler::with_normalizer(&config, normalizer),
            rasterizer,
            _script: script_file,
        }
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn successful_conversion_leaves_no_temp_files() {
        let root = tempfile::tempdir().unwrap();
        let h = assembler_running(CONVERTING, root.path(), 30);

        let batch = h.assembler.assemble(&[entry("docx", b"PK\x03\x04 resume")]).await;

        assert_eq!(batch.len(), 1, "rejections: {:?}", batch.rejections);
        assert_eq!(
            h.rasterizer.seen.lock().unwrap()[0],
            b"%PDF-1.4 from source.docx".to_vec()
        );
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn crashing_converter_is_reported_and_cleaned_up() {
        let root = tempfile::tempdir().unwrap();
        let h = assembler_running(CRASHING, root.path(), 30);

        let batch = h.assembler.assemble(&[entry("doc", b"\xD0\xCF\x11\xE0")]).await;

        assert!(batch.is_empty());
        match &batch.rejections[0].error {
            FileError::ConversionFailed { kind, detail } => {
                assert_eq!(*kind, DocumentKind::Doc);
                assert!(detail.contains("could not be loaded"), "got: {detail}");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(h.rasterizer.seen.lock().unwrap().is_empty());
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn missing_output_pdf_is_a_failure() {
        let root = tempfile::tempdir().unwrap();
        let h = assembler_running(SILENT, root.path(), 30);

        let batch = h.assembler.assemble(&[entry("docx", b"PK")]).await;

        assert!(batch.is_empty());
        assert!(matches!(
            batch.rejections[0].error,
            FileError::ConversionFailed { .. }
        ));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn hung_converter_times_out_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let h = assembler_running(HANGING, root.path(), 1);

        let batch = h
            .assembler
            .assemble(&[entry("docx", b"PK"), entry("png", b"fine")])
            .await;

        assert_eq!(batch.len(), 1);
        assert!(matches!(
            batch.rejections[0].error,
            FileError::Timeout {
                stage: Stage::Convert,
                secs: 1
            }
        ));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn timed_out_converter_workers_are_killed() {
        let root = tempfile::tempdir().unwrap();
        let h = assembler_running(FORKING_LATE_WRITER, root.path(), 1);

        let batch = h.assembler.assemble(&[entry("docx", b"PK")]).await;

        assert!(matches!(
            batch.rejections[0].error,
            FileError::Timeout {
                stage: Stage::Convert,
                secs: 1
            }
        ));
        assert_eq!(entries(root.path()), 0);

        // Past the point where the forked worker would have written.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(entries(root.path()), 0);
    }
}
