//! # edgequake-any2md
//!
//! Convert files, buffers and web pages to Markdown through a registry of
//! pluggable converters.
//!
//! Each input is resolved to a single type token (`"csv"`, `"pdf"`,
//! `"url"`, ...), dispatched to the converter registered for it, and the
//! converter's loosely shaped output is normalized into one
//! [`CanonicalResult`]. Results can then be persisted as a Markdown file
//! with YAML frontmatter, its images, and any extra documents.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (path | buffer | URL)
//!  │
//!  ├─ 1. Resolve   declared type / category / file name → type token
//!  ├─ 2. Lookup    lazily initialized registry, bounded retries
//!  ├─ 3. Convert   converter-specific, options adjusted per type
//!  ├─ 4. Normalize any converter shape → CanonicalResult
//!  └─ 5. Persist   images, frontmatter merge, image reference rewrite
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_any2md::{ConversionConfig, ConversionRequest, Orchestrator, SaveOptions};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::builtin(ConversionConfig::default());
//!     let request = ConversionRequest::new(PathBuf::from("report.csv"));
//!
//!     let result = orchestrator.convert_file(&request).await;
//!     println!("{} ({}): success={}", result.name, result.kind, result.success);
//!
//!     let saved = orchestrator
//!         .convert_and_save(&request, "out", SaveOptions::default())
//!         .await?;
//!     println!("wrote {}", saved.main_file.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Built-in Converters
//!
//! | Token(s) | Converter | Notes |
//! |----------|-----------|-------|
//! | `txt`, `text`, `md`, `markdown` | text | Passed through, existing frontmatter kept |
//! | `csv`, `tsv` | csv | GFM table, delimiter auto-detected |
//! | `html`, `htm` | html | `html2md`, inline `data:` images extracted |
//! | `png`, `jpg`, `jpeg`, `gif`, `webp` | image | Embedded with dimensions |
//! | `url` | web-page | Single page fetch; also the web fallback |
//! | `parenturl` | web-crawl | Same-site crawl, one file per page |
//!
//! Further converters (PDF, Office, audio transcription, ...) plug in through
//! [`Converter`] and a custom [`RegistrySetup`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `any2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-any2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod converters;
pub mod error;
pub mod fs;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod retry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageLayout, SaveOptions};
pub use convert::Orchestrator;
pub use error::{Any2MdError, ItemError};
pub use output::{CanonicalResult, ConfigMap, ImageData, ImageRef, OutputFile, PersistedOutput, RawResult};
pub use pipeline::input::{ConversionInput, ConversionRequest};
pub use pipeline::normalize::standardize_result;
pub use pipeline::persist::{save_conversion_result, SaveRequest};
pub use pipeline::resolve::resolve_type;
pub use progress::{
    ConversionProgressCallback, NoopProgressCallback, ProgressCallback, ProgressDetail, ProgressTracker,
};
pub use registry::{
    Converter, ConverterConfig, ConverterInput, ConverterRegistry, RegistryBuilder, RegistryHandle, RegistrySetup,
};
