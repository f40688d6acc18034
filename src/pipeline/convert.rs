//! Document conversion: DOC/DOCX bytes → PDF bytes.
//!
//! ## Why shell out?
//!
//! There is no pure-Rust Word layout engine. LibreOffice renders Word files
//! faithfully and has a headless batch mode, so [`OfficeConverter`] writes
//! the upload into a scratch directory, runs
//! `soffice --headless --convert-to pdf`, and reads the PDF back.
//!
//! ## Why a per-call profile?
//!
//! Two `soffice` processes sharing one user profile block on its lock file,
//! and the second silently exits without output. Pointing
//! `-env:UserInstallation` at the scratch directory gives every call its own
//! profile, so concurrent requests never serialise on (or corrupt) it.
//!
//! ## Process groups
//!
//! The `soffice` launcher forks `soffice.bin` and waits on it, so killing the
//! launcher alone leaves the real worker writing into a scratch directory
//! that is about to be deleted. On unix the converter is started as the
//! leader of a new process group and the whole group is killed on timeout,
//! or when the conversion future is dropped, before the scratch directory
//! goes away.

use crate::config::PipelineConfig;
use crate::error::{FileError, Stage};
use crate::pipeline::detect::DocumentKind;
use crate::pipeline::scratch_dir;
use crate::pipeline::size::SizeLimit;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tracing::{debug, warn};

/// Converts a word-processor document to PDF.
///
/// Implementations report every failure as a [`FileError`]; none may panic
/// or leave files behind.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, doc_bytes: &[u8], kind: DocumentKind) -> Result<Vec<u8>, FileError>;
}

/// [`DocumentConverter`] backed by the LibreOffice command line.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    command: Vec<String>,
    limit: SizeLimit,
    temp_root: Option<PathBuf>,
    timeout: Duration,
}

impl OfficeConverter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            command: config.converter_command.clone(),
            limit: SizeLimit::new(config.max_file_size),
            temp_root: config.temp_dir.clone(),
            timeout: Duration::from_secs(config.file_timeout_secs),
        }
    }
}

#[async_trait]
impl DocumentConverter for OfficeConverter {
    async fn convert(&self, doc_bytes: &[u8], kind: DocumentKind) -> Result<Vec<u8>, FileError> {
        if let Err(e) = self.limit.check(doc_bytes, Stage::Convert) {
            warn!(file_type = %kind, bytes = doc_bytes.len(), "Refusing to convert: {}", e);
            return Err(e);
        }

        let failed = |detail: String| FileError::ConversionFailed { kind, detail };

        let (program, leading_args) = self
            .command
            .split_first()
            .ok_or_else(|| failed("no converter command configured".into()))?;

        let scratch = scratch_dir(self.temp_root.as_deref())
            .map_err(|e| failed(format!("cannot create temp dir: {e}")))?;
        let source = scratch.path().join(format!("source.{}", kind.extension()));
        tokio::fs::write(&source, doc_bytes)
            .await
            .map_err(|e| failed(format!("cannot write temp file: {e}")))?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(leading_args)
            .arg(format!(
                "-env:UserInstallation={}",
                file_url(&scratch.path().join("profile"))
            ))
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(scratch.path())
            .arg(&source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| failed(format!("cannot run '{program}': {e}")))?;
        // Declared after `scratch`, so it drops (and kills) first.
        let mut group = GroupGuard::new(&child);

        let mut stderr_pipe = child.stderr.take();
        let collect_stderr = async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        };

        let waited = tokio::time::timeout(self.timeout, async {
            tokio::join!(child.wait(), collect_stderr)
        })
        .await;
        let (status, stderr) = match waited {
            Err(_) => {
                warn!(file_type = %kind, secs = self.timeout.as_secs(), "Converter timed out, killing it");
                group.kill();
                if let Err(e) = child.kill().await {
                    debug!("converter already gone: {e}");
                }
                return Err(FileError::Timeout {
                    stage: Stage::Convert,
                    secs: self.timeout.as_secs(),
                });
            }
            Ok((Err(e), _)) => return Err(failed(format!("cannot wait for '{program}': {e}"))),
            Ok((Ok(status), stderr)) => (status, stderr),
        };

        if !status.success() {
            return Err(failed(format!(
                "'{program}' exited with {}: {}",
                status,
                tail(&stderr)
            )));
        }

        let pdf_path = scratch.path().join("source.pdf");
        let pdf = tokio::fs::read(&pdf_path)
            .await
            .map_err(|e| failed(format!("no PDF produced ({e}): {}", tail(&stderr))))?;
        if pdf.is_empty() {
            return Err(failed("converter produced an empty PDF".into()));
        }

        debug!(
            file_type = %kind,
            input_bytes = doc_bytes.len(),
            pdf_bytes = pdf.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Converted document to PDF"
        );
        Ok(pdf)
    }
}

/// Kills the converter's process group when dropped, sweeping up any
/// workers the launcher left behind.
///
/// A no-op off unix, where `kill_on_drop` is all there is.
struct GroupGuard {
    pgid: Option<u32>,
}

impl GroupGuard {
    fn new(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.take() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                debug!(pgid, "killpg failed: {e}");
            }
        }
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

/// `file://` URL for LibreOffice's `-env:UserInstallation`.
fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    if raw.starts_with('/') {
        format!("file://{raw}")
    } else {
        format!("file:///{raw}")
    }
}

/// Last line of a child's stderr, for error messages.
fn tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("(no output)")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> PipelineConfig {
        PipelineConfig::builder()
            .temp_dir(dir)
            .converter_command(["definitely-not-a-real-soffice-binary"])
            .build()
            .unwrap()
    }

    #[test]
    fn file_url_forms() {
        assert_eq!(file_url(Path::new("/tmp/x/profile")), "file:///tmp/x/profile");
        assert_eq!(
            file_url(Path::new(r"C:\tmp\profile")),
            "file:///C:/tmp/profile"
        );
    }

    #[test]
    fn tail_picks_last_non_empty_line() {
        assert_eq!(tail(b"warn: x\nError: source file could not be loaded\n\n"), "Error: source file could not be loaded");
        assert_eq!(tail(b""), "(no output)");
    }

    #[tokio::test]
    async fn oversized_input_short_circuits_before_disk() {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .temp_dir(root.path())
            .max_file_size(4)
            .build()
            .unwrap();
        let err = OfficeConverter::new(&config)
            .convert(b"too large", DocumentKind::Docx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FileError::SizeExceeded {
                stage: Stage::Convert,
                ..
            }
        ));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_tool_is_a_failure_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let err = OfficeConverter::new(&config_in(root.path()))
            .convert(b"PK\x03\x04 fake docx", DocumentKind::Docx)
            .await
            .unwrap_err();
        match err {
            FileError::ConversionFailed { kind, detail } => {
                assert_eq!(kind, DocumentKind::Docx);
                assert!(detail.contains("cannot run"), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
