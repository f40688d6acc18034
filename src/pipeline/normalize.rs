//! Per-file normalisation: any accepted upload → one still image.
//!
//! [`FileNormalizer`] is the only place that knows which route a declared
//! type takes. The converter and rasteriser are trait objects, so tests and
//! alternative deployments plug in their own backends with
//! [`FileNormalizer::with_backends`].

use crate::config::PipelineConfig;
use crate::error::FileError;
use crate::output::NormalizedImage;
use crate::pipeline::convert::{DocumentConverter, OfficeConverter};
use crate::pipeline::detect::{FileKind, Route};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An uploaded file after base64 decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Caller-supplied type label, unverified unless `verify_content` is on.
    pub declared_type: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(declared_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            declared_type: declared_type.into(),
            bytes,
        }
    }
}

/// Routes each [`InputFile`] to pass-through, rasterisation, or
/// conversion-then-rasterisation.
///
/// Holds no mutable state: calling [`normalize`](Self::normalize) twice on
/// the same input yields equal results.
#[derive(Clone)]
pub struct FileNormalizer {
    converter: Arc<dyn DocumentConverter>,
    rasterizer: Arc<dyn PageRasterizer>,
    verify_content: bool,
}

impl fmt::Debug for FileNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileNormalizer")
            .field("converter", &"<dyn DocumentConverter>")
            .field("rasterizer", &"<dyn PageRasterizer>")
            .field("verify_content", &self.verify_content)
            .finish()
    }
}

impl FileNormalizer {
    /// Normaliser using LibreOffice and pdfium.
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(OfficeConverter::new(config)),
            Arc::new(PdfiumRasterizer::new(config)),
        )
    }

    /// Normaliser using caller-supplied backends.
    pub fn with_backends(
        config: &PipelineConfig,
        converter: Arc<dyn DocumentConverter>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        Self {
            converter,
            rasterizer,
            verify_content: config.verify_content,
        }
    }

    /// Turn one uploaded file into a single still image.
    ///
    /// Image types pass through untouched with `image/<declared type>`;
    /// PDFs are rasterised; DOC/DOCX are converted to PDF first. Anything
    /// else is [`FileError::UnsupportedType`].
    pub async fn normalize(&self, file: &InputFile) -> Result<NormalizedImage, FileError> {
        let kind = FileKind::parse(&file.declared_type).ok_or_else(|| {
            FileError::UnsupportedType {
                declared: file.declared_type.clone(),
                reason: if file.declared_type.trim().is_empty() {
                    "no type declared".into()
                } else {
                    "not a supported format".into()
                },
            }
        })?;

        if self.verify_content && !kind.matches_content(&file.bytes) {
            return Err(FileError::UnsupportedType {
                declared: file.declared_type.clone(),
                reason: "content does not match the declared type".into(),
            });
        }

        match kind.route() {
            Route::PassThrough => {
                let mime_type = kind
                    .image_mime()
                    .unwrap_or_else(|| format!("image/{kind}"));
                debug!(file_type = %kind, bytes = file.bytes.len(), "Passing image through");
                Ok(NormalizedImage {
                    mime_type,
                    bytes: file.bytes.clone(),
                })
            }
            Route::Rasterise => {
                let png = self.rasterizer.rasterize(&file.bytes).await?;
                Ok(png_image(png))
            }
            Route::ConvertThenRasterise(doc_kind) => {
                let pdf = self.converter.convert(&file.bytes, doc_kind).await?;
                let png = self.rasterizer.rasterize(&pdf).await?;
                Ok(png_image(png))
            }
        }
    }
}

fn png_image(bytes: Vec<u8>) -> NormalizedImage {
    NormalizedImage {
        mime_type: "image/png".to_string(),
        bytes,
    }
}
