//! CLI binary for edgequake-any2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` / `ConversionRequest` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_any2md::{
    ConversionConfig, ConversionInput, ConversionProgressCallback, ConversionRequest, ImageLayout,
    Orchestrator, ProgressCallback, ProgressDetail, SaveOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

/// Terminal progress callback: one bar from 0 to 100 %, the current stage
/// as its message.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_progress(&self, percent: f64, detail: Option<&ProgressDetail>) {
        self.bar.set_position(percent.round() as u64);
        if let Some(detail) = detail {
            match &detail.message {
                Some(message) => self.bar.set_message(format!("{}: {}", detail.status, message)),
                None => self.bar.set_message(detail.status.clone()),
            }
        }
        if percent >= 100.0 {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Print Markdown to stdout
  any2md report.csv

  # Save into out/report_<timestamp>/document.md with images next to it
  any2md slides.html -o out/

  # Save straight into out/notes.md
  any2md notes.txt -o out/ --no-subdir

  # A single web page, or a crawl of its child pages
  any2md https://example.com/docs/
  any2md https://example.com/docs/ --type parenturl --max-pages 25 -o site/

  # Unnamed or misnamed input: declare the type
  any2md upload.bin --type csv --category data

  # Structured output
  any2md photo.png --json

  # List the types this build can convert
  any2md --list-types

ENVIRONMENT VARIABLES:
  ANY2MD_API_KEY          Default converter credential
  ANY2MD_OCR_API_KEY      Credential passed to PDF converters
  RUST_LOG                Overrides the log filter (e.g. edgequake_any2md=debug)
"#;

/// Convert files, buffers and web pages to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "any2md",
    version,
    about = "Convert documents, data files, images and web pages to Markdown",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "list_types")]
    input: Option<String>,

    /// Save into this directory (Markdown + images + extra files) instead of
    /// printing to stdout.
    #[arg(short, long, env = "ANY2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Declared type: an extension (csv), a web token (url, parenturl) or a
    /// MIME type (text/csv).
    #[arg(long = "type", env = "ANY2MD_TYPE")]
    file_type: Option<String>,

    /// Declared category (data, text, image, web, audio, video, document).
    #[arg(long, env = "ANY2MD_CATEGORY")]
    category: Option<String>,

    /// Name to use for the input instead of its file name.
    #[arg(long, env = "ANY2MD_NAME")]
    name: Option<String>,

    /// Write `<name>.md` straight into the output directory instead of a
    /// timestamped subdirectory.
    #[arg(long, env = "ANY2MD_NO_SUBDIR")]
    no_subdir: bool,

    /// Put every image in this directory (relative to the output).
    #[arg(long, env = "ANY2MD_IMAGE_DIR")]
    image_dir: Option<String>,

    /// Converter option, repeatable: KEY=VALUE. VALUE is parsed as JSON when
    /// it can be, otherwise taken as a string.
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Default converter credential.
    #[arg(long, env = "ANY2MD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Ask PDF converters to OCR.
    #[arg(long, env = "ANY2MD_OCR")]
    ocr: bool,

    /// Credential for the OCR backend.
    #[arg(long, env = "ANY2MD_OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,

    /// Maximum pages fetched by a parenturl crawl.
    #[arg(long, env = "ANY2MD_MAX_PAGES", default_value_t = 10)]
    max_pages: usize,

    /// HTTP timeout in seconds for web inputs.
    #[arg(long, env = "ANY2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output the full result as JSON instead of Markdown.
    #[arg(long, env = "ANY2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ANY2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Print the registered type tokens and exit.
    #[arg(long)]
    list_types: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ANY2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ANY2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar covers INFO-level feedback; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.list_types;
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
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let orchestrator = Orchestrator::builtin(config);

    // ── List types ───────────────────────────────────────────────────────
    if cli.list_types {
        let handle = orchestrator
            .registry()
            .initialize()
            .await
            .context("Failed to initialize converters")?;
        for token in handle.tokens() {
            println!("{token}");
        }
        return Ok(());
    }

    let request = build_request(&cli)?;

    // ── Save mode ────────────────────────────────────────────────────────
    if let Some(ref output_dir) = cli.output {
        let mut options = if cli.no_subdir {
            SaveOptions::direct()
        } else {
            SaveOptions::default()
        };
        if let Some(ref dir) = cli.image_dir {
            options = options.with_image_layout(ImageLayout::Shared(dir.clone()));
        }

        let saved = orchestrator
            .convert_and_save(&request, output_dir, options)
            .await
            .context("Conversion failed")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&saved).context("Failed to serialise output")?
            );
        } else if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&saved.main_file.display().to_string()));
            for skipped in &saved.skipped {
                eprintln!("   {} {}", red("✗"), dim(&skipped.to_string()));
            }
        }
        return Ok(());
    }

    // ── Stdout mode ──────────────────────────────────────────────────────
    let result = orchestrator.convert_file(&request).await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise output")?
        );
    } else if result.success {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.content.as_bytes())
            .context("Failed to write to stdout")?;
        if !result.content.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !result.success {
        anyhow::bail!(
            "Conversion of {} failed: {}",
            result.name,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    if !cli.quiet && !cli.json {
        eprintln!(
            "{}  {} ({})  {}",
            green("✔"),
            bold(&result.name),
            result.kind,
            dim(&format!("{} chars, {} images", result.content.len(), result.images.len())),
        );
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .use_ocr(cli.ocr)
        .max_crawl_pages(cli.max_pages)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref key) = cli.ocr_api_key {
        builder = builder.ocr_api_key(key.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to a `ConversionRequest`.
fn build_request(cli: &Cli) -> Result<ConversionRequest> {
    let input = cli
        .input
        .as_deref()
        .context("An input path or URL is required")?;

    let mut request = ConversionRequest::new(ConversionInput::parse(input));
    if let Some(ref t) = cli.file_type {
        request = request.declared_type(t.clone());
    }
    if let Some(ref c) = cli.category {
        request = request.declared_category(c.clone());
    }
    if let Some(ref n) = cli.name {
        request = request.original_file_name(n.clone());
    }
    for raw in &cli.options {
        let (key, value) = parse_option(raw)?;
        request = request.option(key, value);
    }
    Ok(request)
}

/// Parse one `--option KEY=VALUE`.
fn parse_option(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid option '{raw}': expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Invalid option '{}': empty key", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
