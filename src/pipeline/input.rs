//! Input handling: what the caller hands us and how it is named and read.
//!
//! A request carries one of three input shapes. Paths are read into memory
//! right before the converter runs; URLs are passed through untouched (web
//! converters do their own fetching); buffers are used as-is but must be
//! named by the caller, since nothing else can tell us what they are.

use crate::error::Any2MdError;
use crate::output::ConfigMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The raw input of a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionInput {
    /// In-memory file contents.
    Buffer(Vec<u8>),
    /// A local file.
    Path(PathBuf),
    /// An HTTP/HTTPS URL.
    Url(String),
}

impl ConversionInput {
    /// Classify a user-supplied string as a URL or a path.
    pub fn parse(input: &str) -> Self {
        if is_url(input) {
            ConversionInput::Url(input.to_string())
        } else {
            ConversionInput::Path(PathBuf::from(input))
        }
    }

    /// Final path component of a path input.
    pub fn path_basename(&self) -> Option<String> {
        match self {
            ConversionInput::Path(p) => p.file_name().map(|n| n.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    /// Human-readable label for logs.
    pub fn describe(&self) -> String {
        match self {
            ConversionInput::Buffer(b) => format!("<buffer: {} bytes>", b.len()),
            ConversionInput::Path(p) => p.display().to_string(),
            ConversionInput::Url(u) => u.clone(),
        }
    }
}

impl From<Vec<u8>> for ConversionInput {
    fn from(bytes: Vec<u8>) -> Self {
        ConversionInput::Buffer(bytes)
    }
}

impl From<PathBuf> for ConversionInput {
    fn from(path: PathBuf) -> Self {
        ConversionInput::Path(path)
    }
}

impl From<&Path> for ConversionInput {
    fn from(path: &Path) -> Self {
        ConversionInput::Path(path.to_path_buf())
    }
}

/// One conversion call. Not modified once dispatch begins.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: ConversionInput,
    /// Declared type: an extension (`"pdf"`), a web token (`"url"`,
    /// `"parenturl"`) or a MIME type (`"text/csv"`).
    pub declared_type: Option<String>,
    /// Declared category, e.g. `"data"`, `"audio"`, `"web"`.
    pub declared_category: Option<String>,
    /// Name of the file the input came from. Required for buffers.
    pub original_file_name: Option<String>,
    /// Converter credential; falls back to the config's `api_key`.
    pub api_key: Option<String>,
    /// Passed through to the converter.
    pub options: ConfigMap,
}

impl ConversionRequest {
    pub fn new(input: impl Into<ConversionInput>) -> Self {
        Self {
            input: input.into(),
            declared_type: None,
            declared_category: None,
            original_file_name: None,
            api_key: None,
            options: ConfigMap::new(),
        }
    }

    pub fn declared_type(mut self, t: impl Into<String>) -> Self {
        self.declared_type = Some(t.into());
        self
    }

    pub fn declared_category(mut self, c: impl Into<String>) -> Self {
        self.declared_category = Some(c.into());
        self
    }

    pub fn original_file_name(mut self, name: impl Into<String>) -> Self {
        self.original_file_name = Some(name.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The file name used to sniff the type: the declared original name,
    /// else the path's basename.
    pub fn naming_hint(&self) -> Option<String> {
        self.original_file_name
            .clone()
            .or_else(|| self.input.path_basename())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Derive the display name of the input.
///
/// Buffers must carry `original_file_name`. URL-shaped inputs are named
/// `host/path`. Paths use the declared name if any, else their basename.
pub fn derive_file_name(request: &ConversionRequest, web: bool) -> Result<String, Any2MdError> {
    match &request.input {
        ConversionInput::Buffer(_) => request
            .original_file_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or(Any2MdError::MissingFileName),
        ConversionInput::Url(url) => Ok(url_file_name(url)),
        ConversionInput::Path(path) => {
            if web {
                return Ok(url_file_name(&path.to_string_lossy()));
            }
            request
                .original_file_name
                .clone()
                .or_else(|| request.input.path_basename())
                .ok_or_else(|| Any2MdError::InvalidInput {
                    input: path.display().to_string(),
                })
        }
    }
}

/// `https://example.com/docs/intro/` → `example.com/docs/intro`.
pub fn url_file_name(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("");
            let path = parsed.path().trim_end_matches('/');
            let name = format!("{host}{path}");
            if name.is_empty() {
                url.to_string()
            } else {
                name
            }
        }
        Err(_) => url.to_string(),
    }
}

/// Load the bytes of a buffer or path input.
pub async fn read_input(input: &ConversionInput) -> Result<Vec<u8>, Any2MdError> {
    match input {
        ConversionInput::Buffer(bytes) => Ok(bytes.clone()),
        ConversionInput::Path(path) => {
            let bytes = tokio::fs::read(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Any2MdError::FileNotFound { path: path.clone() }
                } else {
                    Any2MdError::InputReadFailed {
                        path: path.clone(),
                        source: e,
                    }
                }
            })?;
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        ConversionInput::Url(url) => Err(Any2MdError::InvalidInput { input: url.clone() }),
    }
}

/// The URL string of a web request.
pub fn url_of(input: &ConversionInput) -> Result<String, Any2MdError> {
    match input {
        ConversionInput::Url(url) => Ok(url.clone()),
        ConversionInput::Path(p) => Ok(p.to_string_lossy().into_owned()),
        ConversionInput::Buffer(bytes) => String::from_utf8(bytes.clone())
            .map(|s| s.trim().to_string())
            .map_err(|_| Any2MdError::InvalidInput {
                input: "<binary buffer>".into(),
            }),
    }
}
