//! CLI binary for resume-rank.
//!
//! A thin shim over the library crate: `serve` runs the HTTP endpoint,
//! `rank` ranks local files, `normalize` runs the pipeline only.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use resume_rank::pipeline::encode::decode_payload;
use resume_rank::{
    create_router, AnalysisConfig, BatchAssembler, BatchProgressCallback, FileError, InputFile,
    JobPosting, PipelineConfig, ProgressCallback, Ranker, VisionAnalyzer,
    DEFAULT_MAX_REQUEST_BYTES,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a progress bar plus one log line per file. Files may finish out
/// of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    names: Vec<String>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(names: Vec<String>) -> Arc<Self> {
        let bar = ProgressBar::new(names.len() as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Normalising");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            names,
            errors: AtomicUsize::new(0),
        })
    }

    fn name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or("?")
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_file_start(&self, index: usize, _total: usize) {
        self.bar.set_message(self.name(index).to_string());
    }

    fn on_file_complete(&self, index: usize, _total: usize, mime_type: &str) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            self.name(index),
            dim(mime_type)
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, _total: usize, error: &FileError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let mut msg = error.to_string();
        if msg.chars().count() > 80 {
            msg = msg.chars().take(79).collect::<String>() + "\u{2026}";
        }
        self.bar.println(format!(
            "  {} {:<40}  {}",
            red("✗"),
            self.name(index),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, accepted: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} files normalised", green("✔"), bold(&accepted.to_string()));
        } else {
            eprintln!(
                "{} {}/{} files normalised  ({} rejected)",
                if accepted == 0 { red("✘") } else { bold("⚠") },
                bold(&accepted.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the HTTP endpoint on 127.0.0.1:5000
  resume-rank serve

  # Rank local résumés against a job description read from a file
  resume-rank rank --job-description @job.txt --job-post-id 42 cv/*.pdf cv/*.docx

  # Normalise only (no API key needed)
  resume-rank normalize --out-dir out/ alice.docx bob.pdf carol.jpg

SUPPORTED INPUT TYPES:
  jpg, jpeg, png, webp, heic   passed through unchanged
  pdf                          first page rendered to PNG (pdfium)
  doc, docx                    converted to PDF (LibreOffice), then rendered

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter (overrides --verbose / --quiet)

A .env file in the working directory is loaded at startup.
"#;

/// Normalise résumés and rank them with a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "resume-rank",
    version,
    about = "Normalise résumés (images, PDF, DOC/DOCX) and rank them with a Vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RESUME_RANK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RESUME_RANK_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP endpoint (`POST /analyze`, `GET /health`).
    Serve {
        #[arg(long, env = "RESUME_RANK_HOST", default_value = "127.0.0.1")]
        host: String,

        #[arg(long, env = "RESUME_RANK_PORT", default_value_t = 5000)]
        port: u16,

        /// Maximum request body size in bytes.
        #[arg(long, env = "RESUME_RANK_MAX_REQUEST_BYTES", default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
        max_request_bytes: usize,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Rank local résumé files against a job description.
    Rank {
        /// Job description text, or `@path` to read it from a file.
        #[arg(long)]
        job_description: String,

        #[arg(long)]
        job_post_id: String,

        /// Print `{analysis, stats, rejections}` as JSON.
        #[arg(long)]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "RESUME_RANK_NO_PROGRESS")]
        no_progress: bool,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Résumé files; the declared type is the file extension.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Normalise files to images without calling a model.
    Normalize {
        /// Directory for `NNN-<name>.<ext>` outputs (created if missing).
        #[arg(long)]
        out_dir: PathBuf,

        /// Disable progress bar.
        #[arg(long, env = "RESUME_RANK_NO_PROGRESS")]
        no_progress: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Per-file byte ceiling.
    #[arg(long, global = true, env = "RESUME_RANK_MAX_FILE_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_file_size: usize,

    /// Number of files normalised at once.
    #[arg(short, long, global = true, env = "RESUME_RANK_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-file conversion/rendering timeout in seconds.
    #[arg(long, global = true, env = "RESUME_RANK_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Document converter program (default: soffice).
    #[arg(long, global = true, env = "RESUME_RANK_CONVERTER")]
    converter: Option<String>,

    /// Path to the pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Check magic bytes against the declared type.
    #[arg(long, global = true, env = "RESUME_RANK_VERIFY_CONTENT")]
    verify_content: bool,
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    /// LLM model ID (default: gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RESUME_RANK_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "RESUME_RANK_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RESUME_RANK_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries on LLM failure.
    #[arg(long, env = "RESUME_RANK_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-attempt LLM call timeout in seconds.
    #[arg(long, env = "RESUME_RANK_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs when it is active.
    let show_progress = !cli.quiet
        && match &cli.command {
            Command::Serve { .. } => false,
            Command::Rank {
                json, no_progress, ..
            } => !json && !no_progress,
            Command::Normalize { no_progress, .. } => !no_progress,
        };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve {
            ref host,
            port,
            max_request_bytes,
            ref analysis,
        } => {
            let pipeline = build_pipeline_config(&cli.pipeline, None)?;
            let analyzer = VisionAnalyzer::from_config(build_analysis_config(analysis).await?)
                .context("Failed to configure LLM provider")?;
            let ranker = Arc::new(Ranker::new(&pipeline, Arc::new(analyzer)));
            let app = create_router(ranker, max_request_bytes);

            let listener = TcpListener::bind((host.as_str(), port))
                .await
                .with_context(|| format!("Failed to bind {host}:{port}"))?;
            tracing::info!("Listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await.context("Server error")?;
        }

        Command::Rank {
            ref job_description,
            ref job_post_id,
            json,
            ref analysis,
            ref files,
            ..
        } => {
            let description = read_job_description(job_description).await?;
            let job = JobPosting::new(description, job_post_id.trim());
            if job.description.trim().is_empty() || job.post_id.is_empty() {
                bail!("--job-description and --job-post-id must not be empty");
            }

            // Resolve the provider before spending time on conversion.
            let analyzer = VisionAnalyzer::from_config(build_analysis_config(analysis).await?)
                .context("Failed to configure LLM provider")?;

            let progress = show_progress.then(|| progress_for(files));
            let pipeline = build_pipeline_config(&cli.pipeline, progress)?;
            let ranker = Ranker::new(&pipeline, Arc::new(analyzer));

            let inputs = read_inputs(files).await?;
            let start = Instant::now();
            let batch = ranker.assembler().assemble_inputs(inputs).await;
            let normalize_ms = start.elapsed().as_millis() as u64;

            if !show_progress && !cli.quiet {
                report_rejections(files, &batch.rejections);
            }

            let output = ranker
                .analyze_batch(batch, &job, normalize_ms)
                .await
                .context("Ranking failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&output).context("Failed to serialise output")?
                );
            } else {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(output.analysis.as_bytes())
                    .context("Failed to write to stdout")?;
                if !output.analysis.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }
                if !cli.quiet {
                    eprintln!(
                        "   {} accepted  /  {} rejected  —  {}ms normalise, {}ms analysis",
                        output.stats.accepted,
                        output.stats.rejected,
                        dim(&output.stats.normalize_duration_ms.to_string()),
                        dim(&output.stats.analysis_duration_ms.to_string()),
                    );
                }
            }
        }

        Command::Normalize {
            ref out_dir,
            ref files,
            ..
        } => {
            let progress = show_progress.then(|| progress_for(files));
            let pipeline = build_pipeline_config(&cli.pipeline, progress)?;
            let assembler = BatchAssembler::new(&pipeline);

            tokio::fs::create_dir_all(out_dir)
                .await
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;

            let inputs = read_inputs(files).await?;
            let batch = assembler.assemble_inputs(inputs).await;
            if !show_progress && !cli.quiet {
                report_rejections(files, &batch.rejections);
            }

            // `images` keeps submission order but skips rejected files, so
            // walk the indices that were not rejected to recover the names.
            let rejected: Vec<usize> = batch.rejections.iter().map(|r| r.index).collect();
            let accepted = (0..files.len()).filter(|i| !rejected.contains(i));
            for (index, image) in accepted.zip(&batch.images) {
                let path = out_dir.join(output_name(index, &files[index], &image.mime_type));
                let bytes = decode_payload(&image.data)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                tokio::fs::write(&path, bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !cli.quiet {
                    println!("{}", path.display());
                }
            }

            if batch.is_empty() {
                bail!("No valid files could be processed ({} submitted)", files.len());
            }
        }
    }

    Ok(())
}

fn progress_for(files: &[PathBuf]) -> ProgressCallback {
    let names = files.iter().map(|p| display_name(p)).collect();
    CliProgressCallback::new(names) as Arc<dyn BatchProgressCallback>
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `alice.pdf` at index 2 → `002-alice.pdf.png`. The index keeps
/// same-named inputs from different directories apart.
fn output_name(index: usize, input: &Path, mime_type: &str) -> String {
    let ext = mime_type.trim_start_matches("image/");
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    if name.ends_with(&format!(".{ext}")) {
        format!("{index:03}-{name}")
    } else {
        format!("{index:03}-{name}.{ext}")
    }
}

fn report_rejections(files: &[PathBuf], rejections: &[resume_rank::Rejection]) {
    for r in rejections {
        let name = files.get(r.index).map(|p| display_name(p)).unwrap_or_default();
        eprintln!("  {} {}: {}", red("✗"), name, r.error);
    }
}

/// Read every file; the declared type is the extension, as a browser would send it.
async fn read_inputs(files: &[PathBuf]) -> Result<Vec<InputFile>> {
    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let declared = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        inputs.push(InputFile::new(declared, bytes));
    }
    Ok(inputs)
}

async fn read_job_description(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job description from {path}")),
        None => Ok(arg.to_string()),
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_pipeline_config(
    args: &PipelineArgs,
    progress: Option<ProgressCallback>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_file_size(args.max_file_size)
        .concurrency(args.concurrency)
        .file_timeout_secs(args.timeout)
        .verify_content(args.verify_content);

    if let Some(ref converter) = args.converter {
        builder = builder.converter_command(converter.split_whitespace());
    }
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to `AnalysisConfig`.
async fn build_analysis_config(args: &AnalysisArgs) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}
