//! Post-processing: deterministic cleanup of converter Markdown before it
//! is written.
//!
//! Two jobs:
//!
//! * **Image references.** Once images are on disk, standard links that
//!   point at them (`![alt](images/fig-1.png)`) become wiki-link embeds
//!   (`![[images/fig-1.png]]`). Remote targets are never touched, and
//!   neither are links that match no written image. The "Extracted Images"
//!   heading some converters append is removed since images are now inline.
//! * **Body tidying.** Line endings, invisible Unicode, runs of blank lines
//!   and the final newline are normalized.
//!
//! ## Rule Order
//!
//! [`tidy_markdown`] normalizes line endings first so the heading regex in
//! [`strip_extracted_images_heading`] only ever sees `\n`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

// ── Image reference rewriting ────────────────────────────────────────────────

/// `![alt](target)` with an optional `"title"` and `<...>` brackets.
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"!\[([^\]]*)\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#).unwrap()
});

static RE_EXTRACTED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^#{1,6}[ \t]*Extracted Images[ \t]*:?[ \t]*(?:\n|\z)").unwrap());

/// Written images, looked up by the references a converter may have used.
#[derive(Debug, Default)]
pub struct ImageIndex {
    by_path: HashMap<String, String>,
    by_basename: HashMap<String, String>,
}

impl ImageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an image written to `final_path`, known in the body as
    /// `declared` (and optionally `src`).
    pub fn insert(&mut self, declared: &str, src: Option<&str>, final_path: &str) {
        for reference in std::iter::once(declared).chain(src) {
            let key = normalise_target(reference);
            if key.is_empty() {
                continue;
            }
            self.by_basename
                .entry(basename(&key).to_string())
                .or_insert_with(|| final_path.to_string());
            self.by_path.insert(key, final_path.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Full relative path first, then basename.
    pub fn lookup(&self, target: &str) -> Option<&str> {
        let key = normalise_target(target);
        self.by_path
            .get(&key)
            .or_else(|| self.by_basename.get(basename(&key)))
            .map(String::as_str)
    }
}

/// Rewrite links to written images as `![[path]]` embeds.
pub fn rewrite_image_references(content: &str, index: &ImageIndex) -> String {
    if index.is_empty() {
        return content.to_string();
    }
    RE_IMAGE
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let target = &caps[2];
            if is_remote_target(target) {
                return caps[0].to_string();
            }
            match index.lookup(target) {
                Some(path) => format!("![[{path}]]"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Remove "Extracted Images" section headings.
pub fn strip_extracted_images_heading(content: &str) -> String {
    RE_EXTRACTED_HEADING.replace_all(content, "").into_owned()
}

/// Targets with no local file behind them.
pub fn is_remote_target(target: &str) -> bool {
    let t = target.trim().to_lowercase();
    t.starts_with("http://") || t.starts_with("https://") || t.starts_with("//") || t.starts_with("data:")
}

fn normalise_target(target: &str) -> String {
    let t = target.trim();
    let t = t.split(['?', '#']).next().unwrap_or(t);
    let mut t = t.replace("%20", " ").replace('\\', "/");
    while let Some(rest) = t.strip_prefix("./") {
        t = rest.to_string();
    }
    t
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ── Body tidying ─────────────────────────────────────────────────────────────

/// Normalize a Markdown body for writing.
///
/// 1. CRLF / CR → LF
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Collapse 4+ consecutive newlines to 3
/// 4. End with exactly one newline
pub fn tidy_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
