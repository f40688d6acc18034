//! Pipeline stages for résumé normalisation.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap backends
//! (e.g. a sandboxed converter, an in-memory renderer) without touching the
//! stages around them.
//!
//! ## Data Flow
//!
//! ```text
//! batch ──▶ encode ──▶ size ──▶ normalize ──┬─▶ (image)  pass-through
//! {type,data} (base64)  (ceiling) (dispatch) ├─▶ (pdf)    render
//!                                            └─▶ (doc[x]) convert ─▶ render
//! ```
//!
//! 1. [`batch`]     — walk the submitted list, isolate per-file failures,
//!    keep input order under bounded fan-out
//! 2. [`encode`]    — base64 in, base64 out
//! 3. [`size`]      — byte ceiling, re-applied wherever a payload can grow
//! 4. [`detect`]    — declared type → route, optional magic-byte check
//! 5. [`normalize`] — per-file dispatch across the routes
//! 6. [`convert`]   — DOC/DOCX → PDF through LibreOffice; a child process
//! 7. [`render`]    — first PDF page → PNG through pdfium; runs in
//!    `spawn_blocking` because pdfium is not async-safe

pub mod batch;
pub mod convert;
pub mod detect;
pub mod encode;
pub mod normalize;
pub mod render;
pub mod size;

use std::path::Path;
use tempfile::TempDir;

/// Create a uniquely-named scratch directory for one conversion call.
///
/// Everything written inside is removed when the returned guard drops, on
/// success, error, timeout or unwinding alike.
pub(crate) fn scratch_dir(root: Option<&Path>) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("resume-rank-");
    match root {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
}
