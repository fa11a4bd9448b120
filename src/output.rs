//! Data model shared by converters, the normalizer and the persistence stage.
//!
//! * [`RawResult`]: whatever a converter hands back. Untrusted: the JSON
//!   body may be `null`, may omit any field, and may carry nested objects
//!   that reuse reserved names like `content`.
//! * [`CanonicalResult`]: the normalized shape every caller sees.
//! * [`PersistedOutput`]: what the persistence stage wrote to disk.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Free-form option map passed through to converters.
pub type ConfigMap = Map<String, Value>;

/// Bytes of an image produced by a converter.
///
/// Converters hand over either raw bytes or a base64 string, which may be a
/// full `data:` URL. Decoding happens once, in the persistence stage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ImageData {
    /// Base64 text, optionally prefixed `data:<mime>;base64,`.
    Encoded(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl From<Vec<u8>> for ImageData {
    fn from(bytes: Vec<u8>) -> Self {
        ImageData::Bytes(bytes)
    }
}

impl From<String> for ImageData {
    fn from(encoded: String) -> Self {
        ImageData::Encoded(encoded)
    }
}

/// An image extracted by a converter.
///
/// `path` is relative to the output directory (e.g. `images/fig-1.png`).
/// `src` optionally records the reference the converter used in the
/// Markdown body when it differs from `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub path: String,
    #[serde(skip_serializing)]
    pub data: ImageData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl ImageRef {
    pub fn new(path: impl Into<String>, data: impl Into<ImageData>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
            src: None,
        }
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }
}

/// An additional Markdown document written next to the main file
/// (multi-file / site-crawl mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    /// Path relative to the output directory, e.g. `pages/intro.md`.
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub metadata: ConfigMap,
}

impl OutputFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            metadata: ConfigMap::new(),
        }
    }
}

/// Converter output before normalization.
///
/// `body` is the untrusted JSON document (`content`, `metadata`, `success`,
/// anything else the converter felt like returning). Binary artefacts travel
/// separately in `images` and `files` so they never pass through JSON.
#[derive(Debug, Clone, Default)]
pub struct RawResult {
    pub body: Value,
    pub images: Vec<ImageRef>,
    pub files: Vec<OutputFile>,
}

impl RawResult {
    /// A converter that returned nothing at all.
    pub fn null() -> Self {
        Self::default()
    }

    /// A result carrying only Markdown content.
    pub fn markdown(content: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("content".into(), Value::String(content.into()));
        Self {
            body: Value::Object(body),
            ..Self::default()
        }
    }

    /// Add a key to `body.metadata`, turning `body` into an object if needed.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if !self.body.is_object() {
            self.body = Value::Object(Map::new());
        }
        if let Value::Object(body) = &mut self.body {
            let meta = body
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if !meta.is_object() {
                *meta = Value::Object(Map::new());
            }
            if let Value::Object(meta) = meta {
                meta.insert(key.into(), value.into());
            }
        }
        self
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_file(mut self, file: OutputFile) -> Self {
        self.files.push(file);
        self
    }
}

impl From<Value> for RawResult {
    fn from(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }
}

/// The normalized result of one conversion.
///
/// `content` is never empty: a placeholder body is substituted when the
/// converter produced no text, and failures carry a short failure notice.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalResult {
    pub success: bool,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub file_type: String,
    pub name: String,
    pub category: String,
    pub metadata: ConfigMap,
    pub images: Vec<ImageRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<OutputFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Remaining converter fields, sanitized.
    #[serde(flatten)]
    pub extra: ConfigMap,
}

impl CanonicalResult {
    /// Build a failure result with every identity field populated.
    pub fn failure(kind: &str, name: &str, category: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            content: format!("# Conversion Failed\n\nCould not convert `{name}`: {error}\n"),
            kind: kind.to_string(),
            file_type: kind.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            metadata: ConfigMap::new(),
            images: Vec::new(),
            files: Vec::new(),
            error: Some(error),
            extra: ConfigMap::new(),
        }
    }
}

/// What the persistence stage wrote.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedOutput {
    pub success: bool,
    /// Directory that holds the main file and its images.
    pub output_path: PathBuf,
    /// Full path of the main Markdown file.
    pub main_file: PathBuf,
    /// Frontmatter written at the top of the main file.
    pub metadata: ConfigMap,
    /// Images and extra files that could not be written.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<ItemError>,
}
