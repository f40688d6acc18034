//! Format detection: classify a caller-declared file type and route it.
//!
//! The declared type is whatever the client put in the `type` field. By
//! default it is trusted as-is; [`FileKind::matches_content`] lets the
//! normaliser verify it against the leading bytes when
//! [`crate::config::PipelineConfig::verify_content`] is on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

const PDF_MAGIC: &[u8] = b"%PDF";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
/// OLE2 compound file header used by legacy Word `.doc`.
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
/// Local file header of a ZIP archive (OOXML container).
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"heim", b"heis", b"hevc", b"hevx", b"mif1", b"msf1",
];

/// Every file type the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Jpg,
    Jpeg,
    Png,
    Webp,
    Heic,
    Pdf,
    Doc,
    Docx,
}

/// Word-processor formats that must go through PDF first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Doc,
    Docx,
}

/// What the normaliser does with a given [`FileKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Already a still image; forwarded byte-for-byte.
    PassThrough,
    /// Rasterise the first page.
    Rasterise,
    /// Convert to PDF, then rasterise the first page.
    ConvertThenRasterise(DocumentKind),
}

impl FileKind {
    pub const ALL: [FileKind; 8] = [
        FileKind::Jpg,
        FileKind::Jpeg,
        FileKind::Png,
        FileKind::Webp,
        FileKind::Heic,
        FileKind::Pdf,
        FileKind::Doc,
        FileKind::Docx,
    ];

    /// Parse a declared type such as `"PNG"`, `" docx "` or `".pdf"`.
    ///
    /// Returns `None` for empty or unknown labels.
    pub fn parse(declared: &str) -> Option<Self> {
        let label = declared.trim();
        let label = label.strip_prefix('.').unwrap_or(label);
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(label))
    }

    /// Infer the kind from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Jpg => "jpg",
            FileKind::Jpeg => "jpeg",
            FileKind::Png => "png",
            FileKind::Webp => "webp",
            FileKind::Heic => "heic",
            FileKind::Pdf => "pdf",
            FileKind::Doc => "doc",
            FileKind::Docx => "docx",
        }
    }

    pub fn route(&self) -> Route {
        match self {
            FileKind::Jpg | FileKind::Jpeg | FileKind::Png | FileKind::Webp | FileKind::Heic => {
                Route::PassThrough
            }
            FileKind::Pdf => Route::Rasterise,
            FileKind::Doc => Route::ConvertThenRasterise(DocumentKind::Doc),
            FileKind::Docx => Route::ConvertThenRasterise(DocumentKind::Docx),
        }
    }

    /// MIME type of a pass-through image: `"image/" + declared type`.
    ///
    /// `jpg` deliberately maps to `image/jpg`, mirroring the declared label.
    pub fn image_mime(&self) -> Option<String> {
        match self.route() {
            Route::PassThrough => Some(format!("image/{}", self.as_str())),
            _ => None,
        }
    }

    /// Check the leading bytes against this kind's signature.
    pub fn matches_content(&self, bytes: &[u8]) -> bool {
        match self {
            FileKind::Jpg | FileKind::Jpeg => bytes.starts_with(JPEG_MAGIC),
            FileKind::Png => bytes.starts_with(PNG_MAGIC),
            FileKind::Webp => bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
            FileKind::Heic => is_heif(bytes),
            FileKind::Pdf => bytes.starts_with(PDF_MAGIC),
            FileKind::Doc => bytes.starts_with(CFB_MAGIC),
            FileKind::Docx => bytes.starts_with(ZIP_MAGIC),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DocumentKind {
    /// File extension LibreOffice needs to pick the right import filter.
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Doc => "doc",
            DocumentKind::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// ISO-BMFF: `[size:4]["ftyp"][major brand:4]`.
fn is_heif(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }
    HEIF_BRANDS.iter().any(|brand| &bytes[8..12] == *brand)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_and_dot_insensitive() {
        assert_eq!(FileKind::parse("PNG"), Some(FileKind::Png));
        assert_eq!(FileKind::parse(" docx "), Some(FileKind::Docx));
        assert_eq!(FileKind::parse(".pdf"), Some(FileKind::Pdf));
        assert_eq!(FileKind::parse(""), None);
        assert_eq!(FileKind::parse("gif"), None);
        assert_eq!(FileKind::parse("image/png"), None);
    }

    #[test]
    fn routes_are_exhaustive() {
        for kind in [FileKind::Jpg, FileKind::Jpeg, FileKind::Png, FileKind::Webp, FileKind::Heic] {
            assert_eq!(kind.route(), Route::PassThrough);
        }
        assert_eq!(FileKind::Pdf.route(), Route::Rasterise);
        assert_eq!(
            FileKind::Doc.route(),
            Route::ConvertThenRasterise(DocumentKind::Doc)
        );
        assert_eq!(
            FileKind::Docx.route(),
            Route::ConvertThenRasterise(DocumentKind::Docx)
        );
    }

    #[test]
    fn image_mime_follows_declared_label() {
        assert_eq!(FileKind::Jpg.image_mime().as_deref(), Some("image/jpg"));
        assert_eq!(FileKind::Heic.image_mime().as_deref(), Some("image/heic"));
        assert_eq!(FileKind::Pdf.image_mime(), None);
    }

    #[test]
    fn from_path_uses_extension() {
        assert_eq!(
            FileKind::from_path(Path::new("cv/Jane Doe.DOCX")),
            Some(FileKind::Docx)
        );
        assert_eq!(FileKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn content_signatures() {
        assert!(FileKind::Jpeg.matches_content(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]));
        assert!(!FileKind::Png.matches_content(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(FileKind::Pdf.matches_content(b"%PDF-1.7\n"));
        assert!(FileKind::Webp.matches_content(b"RIFF\x10\x00\x00\x00WEBPVP8 "));
        assert!(FileKind::Heic.matches_content(b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00"));
        assert!(!FileKind::Heic.matches_content(b"\x00\x00\x00\x18ftypisom"));
        assert!(FileKind::Docx.matches_content(b"PK\x03\x04\x14\x00"));
        assert!(FileKind::Doc.matches_content(CFB_MAGIC));
        assert!(!FileKind::Doc.matches_content(b"PK\x03\x04"));
    }
}
