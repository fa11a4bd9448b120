//! File-type resolution: derive one canonical type token from ambiguous
//! input signals.
//!
//! A token is a lowercase extension without the leading dot (`"pdf"`,
//! `"csv"`) or one of the reserved web tokens (`"url"`, `"parenturl"`).
//!
//! ## Resolution order (first match wins)
//!
//! 1. A declared web token is returned verbatim; web inputs are never
//!    extension-sniffed.
//! 2. Category `data`: the file name's extension if it is `csv`, `xlsx` or
//!    `xls`, otherwise `csv`.
//! 3. The file name's real extension, lowercased.
//! 4. Fallbacks: the declared type (extension or MIME type), URL inputs,
//!    the input path's extension, then a per-category default.

use crate::pipeline::input::ConversionInput;
use std::path::Path;

/// Single-page web input.
pub const URL_TOKEN: &str = "url";
/// Web input crawled for child pages.
pub const PARENT_URL_TOKEN: &str = "parenturl";

const DATA_TOKENS: &[&str] = &["csv", "xlsx", "xls"];
const DATA_DEFAULT: &str = "csv";

pub const AUDIO_TOKENS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac", "aac"];
pub const VIDEO_TOKENS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
const IMAGE_TOKENS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg"];
const DOCUMENT_TOKENS: &[&str] = &["pdf", "docx", "doc", "pptx", "ppt", "odt", "rtf", "epub"];
const TEXT_TOKENS: &[&str] = &["txt", "text", "md", "markdown", "html", "htm"];

/// MIME types the resolver knows without consulting the registry.
const MIME_TOKENS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("text/csv", "csv"),
    ("text/tab-separated-values", "tsv"),
    ("text/plain", "txt"),
    ("text/markdown", "md"),
    ("text/html", "html"),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("audio/mpeg", "mp3"),
    ("audio/wav", "wav"),
    ("video/mp4", "mp4"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xlsx",
    ),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "pptx",
    ),
];

/// Lowercase, trim, and drop a leading dot.
pub fn normalize_token(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

pub fn is_web_token(token: &str) -> bool {
    token == URL_TOKEN || token == PARENT_URL_TOKEN
}

pub fn is_audio_token(token: &str) -> bool {
    AUDIO_TOKENS.contains(&token)
}

pub fn is_video_token(token: &str) -> bool {
    VIDEO_TOKENS.contains(&token)
}

/// The extension of `file_name`, if it has a real one.
///
/// `"report.PDF"` → `"pdf"`; `"README"` and `".env"` have none.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|e| normalize_token(&e.to_string_lossy()))
        .filter(|e| !e.is_empty())
}

/// Look up a MIME type in the built-in table. Parameters are ignored.
pub fn token_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
    MIME_TOKENS
        .iter()
        .find(|(m, _)| *m == essence)
        .map(|(_, t)| *t)
}

/// Category of a type token, used for identity fields and dispatch.
pub fn category_for(token: &str) -> &'static str {
    if is_web_token(token) {
        "web"
    } else if DATA_TOKENS.contains(&token) || token == "tsv" {
        "data"
    } else if is_audio_token(token) {
        "audio"
    } else if is_video_token(token) {
        "video"
    } else if IMAGE_TOKENS.contains(&token) {
        "image"
    } else if DOCUMENT_TOKENS.contains(&token) {
        "document"
    } else if TEXT_TOKENS.contains(&token) {
        "text"
    } else {
        "unknown"
    }
}

/// Resolve the type token of an input. `None` means unsupported.
pub fn resolve_type(
    input: &ConversionInput,
    declared_type: Option<&str>,
    declared_category: Option<&str>,
    file_name: Option<&str>,
) -> Option<String> {
    let declared = declared_type.map(normalize_token).filter(|t| !t.is_empty());
    let category = declared_category.map(normalize_token);

    // 1. Web tokens pass through untouched.
    if let Some(t) = declared.as_deref() {
        if is_web_token(t) {
            return Some(t.to_string());
        }
    }

    let name_ext = file_name.and_then(extension_of);

    // 2. Data files default to CSV rather than failing.
    if category.as_deref() == Some("data") {
        return Some(match name_ext.as_deref() {
            Some(ext) if DATA_TOKENS.contains(&ext) => ext.to_string(),
            _ => DATA_DEFAULT.to_string(),
        });
    }

    // 3. A real extension on the file name.
    if let Some(ext) = name_ext {
        return Some(ext);
    }

    // 4. Fallbacks.
    if let Some(t) = declared {
        if t.contains('/') {
            if let Some(token) = token_for_mime(&t) {
                return Some(token.to_string());
            }
        } else {
            return Some(t);
        }
    }
    match input {
        ConversionInput::Url(_) => return Some(URL_TOKEN.to_string()),
        ConversionInput::Path(p) => {
            if let Some(ext) = extension_of(&p.to_string_lossy()) {
                return Some(ext);
            }
        }
        ConversionInput::Buffer(_) => {}
    }
    match category.as_deref() {
        Some("web") => Some(URL_TOKEN.to_string()),
        Some("text") => Some("txt".to_string()),
        _ => None,
    }
}
