//! CLI binary for edgequake-quizgen.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GenerationConfig` + `QuestionSpec`s and prints the quiz JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_quizgen::{
    extract_document_text, generate_from_pdf, generate_quiz, generate_to_file, write_quiz,
    BackendSelection, ErrorResponse, GenerationConfig, GenerationProgressCallback,
    ProgressCallback, QuestionKind, QuestionSpec, QuizGenError, QuizOutput, SelectionPolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over all (chunk, kind) calls plus a
/// log line per finished call. Calls finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<(usize, QuestionKind), Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} calls  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Generating");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, chunk_id: usize, kind: QuestionKind) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&(chunk_id, kind)))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, chunks: usize, total_calls: usize) {
        self.activate_bar(total_calls);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{chunks} chunks, {total_calls} generation calls…"))
        ));
    }

    fn on_call_start(&self, chunk_id: usize, kind: QuestionKind) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert((chunk_id, kind), Instant::now());
        }
        self.bar.set_message(format!("chunk {chunk_id} / {kind}"));
    }

    fn on_call_complete(&self, chunk_id: usize, kind: QuestionKind, accepted: usize, rejected: usize) {
        let secs = self.elapsed_secs(chunk_id, kind);
        let mark = if accepted > 0 { green("✓") } else { yellow("∅") };
        let rejected = if rejected > 0 {
            yellow(&format!("{rejected} rejected"))
        } else {
            String::new()
        };
        self.bar.println(format!(
            "  {} Chunk {:>3}  {:<18}  {}  {}  {}",
            mark,
            chunk_id,
            kind.to_string(),
            dim(&format!("{accepted:>2} items")),
            dim(&format!("{secs:.1}s")),
            rejected,
        ));
        self.bar.inc(1);
    }

    fn on_call_error(&self, chunk_id: usize, kind: QuestionKind, error: &str) {
        let secs = self.elapsed_secs(chunk_id, kind);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}  {:<18}  {}  {}",
            red("✗"),
            chunk_id,
            kind.to_string(),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_generation_complete(&self, total_calls: usize, succeeded: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        let abandoned = total_calls.saturating_sub(succeeded + failed);
        self.bar.finish_and_clear();

        if failed == 0 && abandoned == 0 {
            eprintln!(
                "{} {} calls completed",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} calls completed  ({} failed, {} abandoned)",
                if succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total_calls,
                red(&failed.to_string()),
                yellow(&abandoned.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # 5 MCQs, 3 short answers, 3 fill-in-the-blanks (stdout)
  quizgen lecture.pdf

  # Only multiple choice, written to a file
  quizgen --mcq 8 --short 0 --blanks 0 lecture.pdf -o quiz.json

  # Plain text input, offline mock backend
  quizgen --plain-text --backend mock notes.txt

  # Local Ollama model
  quizgen --backend local --model llama3.2 lecture.pdf

  # Quiz from a URL, with diagnostics and stats
  quizgen --json https://arxiv.org/pdf/1706.03762

  # Give up after 30 seconds and keep whatever finished
  quizgen --deadline-ms 30000 book.pdf

  # Print the extracted text only (no API key needed)
  quizgen --extract-only lecture.pdf

BACKENDS:
  mock     Deterministic offline generator, for demos and testing
  local    Ollama on localhost (default model llama3.2)
  remote   Hosted LLM (default gpt-4.1-nano when OPENAI_API_KEY is set)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Generate quizzes from PDF files, URLs and text using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "quizgen",
    version,
    about = "Generate quizzes from PDF files, URLs and text using LLMs",
    long_about = "Generate multiple choice, short answer and fill-in-the-blank questions from \
a document (local PDF, PDF URL or plain text). The text is chunked, every chunk is sent to the \
selected backend once per question kind, and the replies are repaired, validated, deduplicated \
and merged into one quiz JSON document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path, HTTP/HTTPS URL, or text file with --plain-text ("-" reads stdin).
    input: String,

    /// Write the quiz JSON to this file instead of stdout.
    #[arg(short, long, env = "QUIZGEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Treat the input as UTF-8 text instead of a PDF.
    #[arg(long, env = "QUIZGEN_PLAIN_TEXT")]
    plain_text: bool,

    /// Number of multiple choice questions (0 skips the kind).
    #[arg(long, env = "QUIZGEN_MCQ", default_value_t = 5,
          value_parser = clap::value_parser!(u8).range(0..=10))]
    mcq: u8,

    /// Number of short answer questions (0 skips the kind).
    #[arg(long, env = "QUIZGEN_SHORT", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=10))]
    short: u8,

    /// Number of fill-in-the-blank questions (0 skips the kind).
    #[arg(long, env = "QUIZGEN_BLANKS", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=10))]
    blanks: u8,

    /// Options per multiple choice question.
    #[arg(long, env = "QUIZGEN_OPTIONS", default_value_t = 4)]
    options: usize,

    /// Generation backend: mock, local, remote.
    #[arg(long, env = "QUIZGEN_BACKEND", default_value = "remote")]
    backend: BackendSelection,

    /// LLM model ID (e.g. gpt-4.1-nano, llama3.2).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Maximum characters per chunk.
    #[arg(long, env = "QUIZGEN_CHUNK_SIZE", default_value_t = 4000)]
    chunk_size: usize,

    /// Characters of the previous chunk repeated at the start of the next.
    #[arg(long, env = "QUIZGEN_OVERLAP", default_value_t = 200)]
    overlap: usize,

    /// Per-attempt backend timeout in milliseconds.
    #[arg(long, env = "QUIZGEN_TIMEOUT_MS", default_value_t = 60_000)]
    timeout_ms: u64,

    /// Wall-clock budget for the whole generation phase, in milliseconds.
    #[arg(long, env = "QUIZGEN_DEADLINE_MS")]
    deadline_ms: Option<u64>,

    /// Number of concurrent backend calls.
    #[arg(short, long, env = "QUIZGEN_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Retries per call on a transient backend failure.
    #[arg(long, env = "QUIZGEN_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Similarity (0, 1] at which two questions count as duplicates.
    #[arg(long, env = "QUIZGEN_DEDUP_THRESHOLD", default_value_t = 1.0)]
    dedup_threshold: f64,

    /// Which items survive truncation: earliest-chunk, round-robin.
    #[arg(long, env = "QUIZGEN_SELECTION", default_value = "earliest-chunk")]
    selection: SelectionPolicy,

    /// Reject documents with fewer characters of text than this.
    #[arg(long, env = "QUIZGEN_MIN_CHARS", default_value_t = 100)]
    min_chars: usize,

    /// Max LLM output tokens per call.
    #[arg(long, env = "QUIZGEN_MAX_TOKENS", default_value_t = 3000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "QUIZGEN_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "QUIZGEN_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "QUIZGEN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "QUIZGEN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output the full result (quiz, diagnostics, stats) as JSON; errors too.
    #[arg(long, env = "QUIZGEN_JSON")]
    json: bool,

    /// Print the extracted document text only, no generation.
    #[arg(long)]
    extract_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "QUIZGEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "QUIZGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "QUIZGEN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while it is visible.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.extract_only;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let extracted = extract_document_text(&cli.input, &config)
            .await
            .context("Failed to extract text")?;
        write_line(&mut io::stdout().lock(), &extracted.text).context("Failed to write to stdout")?;
        if !cli.quiet {
            eprintln!(
                "{} pages, {} empty, {} chars",
                extracted.page_count,
                extracted.empty_pages,
                extracted.text.chars().count()
            );
        }
        return Ok(());
    }

    let specs = build_specs(&cli);
    if specs.is_empty() {
        anyhow::bail!("Nothing to generate: --mcq, --short and --blanks are all 0");
    }

    // ── Run generation ───────────────────────────────────────────────────
    let result = run(&cli, &specs, &config).await;
    let output = match result {
        Ok(output) => output,
        Err(e) if cli.json => {
            let body = ErrorResponse::from(&e);
            println!(
                "{}",
                serde_json::to_string_pretty(&body).context("Failed to serialise error")?
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Quiz generation failed")),
    };

    if let Some(ref output_path) = cli.output {
        if !cli.quiet {
            eprintln!(
                "{}  {} questions  {}ms  →  {}",
                if output.is_complete() { green("✔") } else { cyan("⚠") },
                output.total_questions(),
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let json = if cli.json {
            serde_json::to_string_pretty(&output)
        } else {
            serde_json::to_string_pretty(&output.document)
        }
        .context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet && !cli.json {
        print_summary(&output);
    }

    Ok(())
}

/// Write `text` and a trailing newline.
fn write_line(out: &mut impl Write, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Read the input and run the pipeline, writing `-o` when given.
async fn run(
    cli: &Cli,
    specs: &[QuestionSpec],
    config: &GenerationConfig,
) -> Result<QuizOutput, QuizGenError> {
    if cli.plain_text {
        let text = read_plain_text(&cli.input).await?;
        let output = generate_quiz(&text, specs, config).await?;
        if let Some(ref path) = cli.output {
            write_quiz(&output, path).await?;
        }
        return Ok(output);
    }

    match cli.output {
        Some(ref path) => generate_to_file(&cli.input, path, specs, config).await,
        None => generate_from_pdf(&cli.input, specs, config).await,
    }
}

async fn read_plain_text(input: &str) -> Result<String, QuizGenError> {
    if input == "-" {
        return tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map(|_| buf)
        })
        .await
        .map_err(|e| QuizGenError::Internal(format!("stdin reader panicked: {e}")))?
        .map_err(|e| QuizGenError::Internal(format!("Failed to read stdin: {e}")));
    }

    tokio::fs::read_to_string(input)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => QuizGenError::FileNotFound {
                path: PathBuf::from(input),
            },
            io::ErrorKind::PermissionDenied => QuizGenError::PermissionDenied {
                path: PathBuf::from(input),
            },
            io::ErrorKind::InvalidData => {
                QuizGenError::Internal(format!("'{input}' is not UTF-8 text: {e}"))
            }
            _ => QuizGenError::InvalidInput {
                input: input.to_string(),
            },
        })
}

/// One spec per kind with a non-zero count, in document order.
fn build_specs(cli: &Cli) -> Vec<QuestionSpec> {
    [
        QuestionSpec::mcq(cli.mcq as usize).with_option_count(cli.options),
        QuestionSpec::short_answer(cli.short as usize),
        QuestionSpec::fill_blank(cli.blanks as usize),
    ]
    .into_iter()
    .filter(|spec| spec.count > 0)
    .collect()
}

/// Map CLI args to `GenerationConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GenerationConfig> {
    let mut builder = GenerationConfig::builder()
        .backend(cli.backend)
        .max_chunk_chars(cli.chunk_size)
        .overlap_chars(cli.overlap)
        .backend_timeout_ms(cli.timeout_ms)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .dedup_threshold(cli.dedup_threshold)
        .selection(cli.selection)
        .min_text_chars(cli.min_chars)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ms) = cli.deadline_ms {
        builder = builder.request_deadline_ms(ms);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &QuizOutput) {
    let d = &output.diagnostics;
    eprintln!(
        "   {} mcq  /  {} short answer  /  {} fill-in  —  {}ms total",
        bold(&output.document.mcq.len().to_string()),
        bold(&output.document.short_answer.len().to_string()),
        bold(&output.document.fill_in_the_blanks.len().to_string()),
        output.stats.total_duration_ms,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&output.stats.prompt_tokens.to_string()),
        dim(&output.stats.completion_tokens.to_string()),
    );
    for s in &d.shortfalls {
        eprintln!(
            "   {} only {}/{} {}",
            yellow("⚠"),
            s.delivered,
            s.requested,
            s.kind.label()
        );
    }
    for (kind, counts) in d.failure_counts() {
        if counts.parse + counts.validation > 0 {
            eprintln!(
                "   {}",
                dim(&format!(
                    "{kind}: {} unparseable replies, {} rejected items",
                    counts.parse, counts.validation
                ))
            );
        }
    }
    if output.stats.duplicates_removed > 0 {
        eprintln!(
            "   {}",
            dim(&format!("{} duplicates removed", output.stats.duplicates_removed))
        );
    }
    if d.deadline_exceeded {
        eprintln!(
            "   {} deadline expired, {} calls abandoned",
            yellow("⚠"),
            d.abandoned_calls.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `room` bytes, then fails.
    struct Full {
        room: usize,
    }

    impl Write for Full {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            let n = buf.len().min(self.room);
            self.room -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_line_appends_newline() {
        let mut buf = Vec::new();
        write_line(&mut buf, "page one").unwrap();
        assert_eq!(buf, b"page one\n");
    }

    #[test]
    fn failed_trailing_newline_is_an_error() {
        let err = write_line(&mut Full { room: 5 }, "hello").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
