//! Built-in format adapters.
//!
//! Each adapter implements [`crate::registry::Converter`] for one family of
//! formats. Formats not covered here (office documents, PDF, audio, video)
//! are plugged in by registering external converters with a custom
//! [`crate::registry::RegistrySetup`].
//!
//! | Adapter | Tokens |
//! |---------|--------|
//! | [`text::TextConverter`] | `txt`, `text`, `md`, `markdown` |
//! | [`csv::CsvConverter`] | `csv`, `tsv` |
//! | [`html::HtmlConverter`] | `html`, `htm` |
//! | [`image::ImageConverter`] | `png`, `jpg`, `jpeg`, `gif`, `webp` |
//! | [`web::UrlConverter`] | `url` (also the web fallback) |
//! | [`web::ParentUrlConverter`] | `parenturl` |

pub mod csv;
pub mod html;
pub mod image;
pub mod text;
pub mod web;

use crate::config::ConversionConfig;
use crate::error::Any2MdError;
use crate::registry::{ConverterInput, ConverterRegistry, RegistryBuilder, RegistryHandle, RegistrySetup};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Bytes scanned for NUL when sniffing text.
const SNIFF_LEN: usize = 8192;

/// Registers every built-in adapter.
#[derive(Debug, Clone)]
pub struct BuiltinSetup {
    web: web::WebSettings,
}

impl BuiltinSetup {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            web: web::WebSettings::from_config(config),
        }
    }
}

#[async_trait]
impl RegistrySetup for BuiltinSetup {
    async fn setup(&self) -> Result<RegistryHandle, Any2MdError> {
        debug!("Registering built-in converters");
        RegistryBuilder::new()
            .register(text::TextConverter::new())
            .register(csv::CsvConverter::new())
            .register(html::HtmlConverter::new())
            .register(image::ImageConverter::new())
            .register(web::UrlConverter::new(self.web.clone())?)
            .register(web::ParentUrlConverter::new(self.web.clone())?)
            .web_fallback(web::UrlConverter::new(self.web.clone())?)
            .build()
    }
}

impl ConverterRegistry {
    /// A registry of the built-in adapters.
    pub fn builtin(config: &ConversionConfig) -> Self {
        ConverterRegistry::new(BuiltinSetup::new(config))
    }
}

/// UTF-8 text of a byte input, BOM stripped, invalid sequences replaced.
pub(crate) fn decode_text(input: &ConverterInput, kind: &str) -> Result<String, Any2MdError> {
    let bytes = input
        .as_bytes()
        .ok_or_else(|| Any2MdError::conversion_failed(kind, "expected file contents, got a URL"))?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Byte input without NUL bytes near the start.
pub(crate) fn looks_like_text(input: &ConverterInput) -> bool {
    match input.as_bytes() {
        Some(bytes) => !bytes[..bytes.len().min(SNIFF_LEN)].contains(&0),
        None => false,
    }
}

/// `reports/Q3 Summary.csv` → `Q3 Summary`.
pub(crate) fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
