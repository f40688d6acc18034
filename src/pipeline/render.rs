//! PDF rasterisation: render the first page to PNG via pdfium.
//!
//! ## Why only the first page?
//!
//! The model compares candidates side by side; one image per candidate keeps
//! the batch uniform and the request small. Page one of a résumé carries the
//! name, headline and most recent experience. Later pages are not rendered.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! Tokio worker threads keep serving other requests during rendering.
//!
//! ## Why a temp file?
//!
//! The PDF is written into a scratch directory that moves into the blocking
//! task. The directory is removed when the task finishes, even if the caller
//! has already given up on it after a timeout.

use crate::config::PipelineConfig;
use crate::error::{FileError, Stage};
use crate::pipeline::scratch_dir;
use crate::pipeline::size::SizeLimit;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(target_os = "macos")]
const PDFIUM_LIB_NAME: &str = "libpdfium.dylib";
#[cfg(target_os = "windows")]
const PDFIUM_LIB_NAME: &str = "pdfium.dll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PDFIUM_LIB_NAME: &str = "libpdfium.so";

/// Renders the first page of a PDF to a single PNG image.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, pdf_bytes: &[u8]) -> Result<Vec<u8>, FileError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    limit: SizeLimit,
    temp_root: Option<PathBuf>,
    lib_path: Option<PathBuf>,
    max_pixels: u32,
    timeout: Duration,
}

impl PdfiumRasterizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            limit: SizeLimit::new(config.max_file_size),
            temp_root: config.temp_dir.clone(),
            lib_path: config.pdfium_lib_path.clone(),
            max_pixels: config.max_rendered_pixels,
            timeout: Duration::from_secs(config.file_timeout_secs),
        }
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(&self, pdf_bytes: &[u8]) -> Result<Vec<u8>, FileError> {
        self.limit.check(pdf_bytes, Stage::Rasterise)?;

        let scratch = scratch_dir(self.temp_root.as_deref())
            .map_err(|e| failed(format!("cannot create temp dir: {e}")))?;
        let pdf_path = scratch.path().join("document.pdf");
        tokio::fs::write(&pdf_path, pdf_bytes)
            .await
            .map_err(|e| failed(format!("cannot write temp file: {e}")))?;

        let lib_path = self.lib_path.clone();
        let max_pixels = self.max_pixels;
        let task = tokio::task::spawn_blocking(move || {
            let result = render_first_page_blocking(&pdf_path, lib_path.as_deref(), max_pixels);
            drop(scratch);
            result
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(FileError::Timeout {
                stage: Stage::Rasterise,
                secs: self.timeout.as_secs(),
            }),
            Ok(Err(e)) => Err(failed(format!("render task panicked: {e}"))),
            Ok(Ok(result)) => result,
        }
    }
}

/// Blocking implementation of first-page rendering.
fn render_first_page_blocking(
    pdf_path: &Path,
    lib_path: Option<&Path>,
    max_pixels: u32,
) -> Result<Vec<u8>, FileError> {
    let pdfium = bind_pdfium(lib_path)?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| failed(format!("cannot open PDF: {:?}", e)))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(failed("PDF has no pages".into()));
    }
    info!("PDF loaded: {} pages, rendering page 1", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let page = pages
        .get(0)
        .map_err(|e| failed(format!("cannot load page 1: {:?}", e)))?;
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| failed(format!("cannot render page 1: {:?}", e)))?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());

    encode_png(&image)
}

/// Bind pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the working
/// directory, then the system library.
fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, FileError> {
    let explicit = lib_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match explicit {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_library(Path::new(".").join(PDFIUM_LIB_NAME))
            .or_else(|_| Pdfium::bind_to_system_library()),
    };

    bindings
        .map(Pdfium::new)
        .map_err(|e| failed(format!("pdfium library unavailable: {e}")))
}

/// PNG is lossless: JPEG artefacts around small type hurt legibility.
fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, FileError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| failed(format!("PNG encoding failed: {e}")))?;
    Ok(buf)
}

fn failed(detail: String) -> FileError {
    FileError::RasterisationFailed { detail }
}
