//! Result normalization: untrusted [`RawResult`] → [`CanonicalResult`].
//!
//! Converters are free to return anything: `null`, an empty object, or a
//! body whose nested objects reuse reserved names (`metadata.content: null`,
//! `details.type: "x"`). The canonical result is built field by field, and
//! each reserved field is read only from its own top-level key of the raw
//! body. Nothing nested can shadow it.
//!
//! ## Field order
//!
//! `success`, `type`, `fileType`, `name`, `category`, `metadata` (raw
//! metadata first, then a forced `converter` key), `images`, and last of all
//! `content`, which falls back to a placeholder when the converter produced
//! no text. [`standardize_result`] never fails and never panics.

use crate::output::{CanonicalResult, ConfigMap, ImageRef, OutputFile, RawResult};
use crate::pipeline::encode::split_data_url;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Value forced into `metadata.converter`.
pub const CONVERTER_ID: &str = "edgequake-any2md";

/// Containers nested deeper than this are replaced by [`TRUNCATED_TAG`].
const MAX_DEPTH: usize = 32;

/// Arrays of at least this many byte-sized integers are treated as binary.
const BINARY_ARRAY_MIN: usize = 64;

/// Placeholder for structures too deep to carry around.
pub const TRUNCATED_TAG: &str = "[Truncated]";

/// Keys owned by the canonical result; never copied through `extra`.
const RESERVED_KEYS: &[&str] = &[
    "success", "content", "type", "fileType", "file_type", "name", "category", "metadata",
    "images", "files", "error",
];

/// Normalize a converter result.
///
/// # Invariants
/// * `content` is never empty or whitespace-only.
/// * `content == raw.body.content` whenever that string has visible text,
///   whatever else the body contains.
pub fn standardize_result(raw: RawResult, kind: &str, name: &str, category: &str) -> CanonicalResult {
    let RawResult {
        body,
        images: typed_images,
        files: typed_files,
    } = raw;

    // 1. null / non-object → {}
    let mut fields = match body {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            debug!("Converter returned a non-object body ({}); ignoring it", type_name(&other));
            Map::new()
        }
    };

    // Pull every reserved key out of the spread before sanitizing it.
    let raw_content = fields.remove("content");
    let raw_success = fields.remove("success");
    let raw_metadata = fields.remove("metadata");
    let raw_images = fields.remove("images");
    let raw_files = fields.remove("files");
    let raw_error = fields.remove("error");
    for key in RESERVED_KEYS {
        fields.remove(*key);
    }

    // 2–3. Sanitized remainder is the base.
    let extra = sanitize_map(fields);

    // 4. Explicit fields, fixed order.
    let success = !matches!(raw_success, Some(Value::Bool(false)));

    let mut metadata = match raw_metadata.map(sanitize_value) {
        Some(Value::Object(map)) => map,
        _ => ConfigMap::new(),
    };
    metadata.insert("converter".into(), Value::String(CONVERTER_ID.into()));

    let images = if typed_images.is_empty() {
        lenient_list::<ImageRef>(raw_images)
    } else {
        typed_images
    };
    let files = if typed_files.is_empty() {
        lenient_list::<OutputFile>(raw_files)
    } else {
        typed_files
    };

    let error = match raw_error {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    };

    // 5. Content last; only the top-level key may set it.
    let content = match raw_content {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => placeholder_content(kind),
    };

    CanonicalResult {
        success,
        content,
        kind: kind.to_string(),
        file_type: kind.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        metadata,
        images,
        files,
        error,
        extra,
    }
}

/// Markdown body used when a converter produced no text.
pub fn placeholder_content(kind: &str) -> String {
    let label = if kind.is_empty() {
        "input".to_string()
    } else {
        kind.to_uppercase()
    };
    format!(
        "# Conversion Result\n\n\
         The {label} file was processed successfully, but no text content was extracted.\n\n\
         Some formats legitimately produce no text, for example audio or video without \
         speech, or documents that contain only images.\n"
    )
}

/// Replace binary payloads and over-deep structures.
///
/// * `data:<mime>;base64,…` strings → `{type: "binary", mime, size}`
/// * arrays of ≥ 64 integers in `0..=255` → `{type: "binary", size}`
/// * containers nested deeper than 32 levels → `"[Truncated]"`
pub fn sanitize_value(value: Value) -> Value {
    sanitize_at(value, 0)
}

fn sanitize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| (k, sanitize_at(v, 1)))
        .collect()
}

fn sanitize_at(value: Value, depth: usize) -> Value {
    match value {
        Value::String(s) => match split_data_url(&s) {
            Some((mime, payload)) => binary_summary(Some(mime), payload.len() / 4 * 3),
            None => Value::String(s),
        },
        Value::Array(_) | Value::Object(_) if depth >= MAX_DEPTH => {
            Value::String(TRUNCATED_TAG.into())
        }
        Value::Array(items) => {
            if items.len() >= BINARY_ARRAY_MIN && items.iter().all(is_byte) {
                binary_summary(None, items.len())
            } else {
                Value::Array(items.into_iter().map(|v| sanitize_at(v, depth + 1)).collect())
            }
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_at(v, depth + 1)))
                .collect(),
        ),
        other => other,
    }
}

fn binary_summary(mime: Option<&str>, size: usize) -> Value {
    match mime {
        Some(m) => json!({ "type": "binary", "mime": m, "size": size }),
        None => json!({ "type": "binary", "size": size }),
    }
}

fn is_byte(v: &Value) -> bool {
    v.as_u64().is_some_and(|n| n <= 255)
}

/// Deserialize the well-formed items of a JSON array, dropping the rest.
fn lenient_list<T: serde::de::DeserializeOwned>(value: Option<Value>) -> Vec<T> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!("Dropping malformed item from converter result: {}", e);
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
