//! YAML frontmatter: extraction, merging and formatting.
//!
//! Output documents start with a `---`-delimited block, a blank line, then
//! the body. Converters (and Markdown inputs) may already carry a block; it
//! is parsed with `serde_yaml`, merged with the caller's metadata, and
//! re-emitted by a small formatter that writes plain scalars where YAML
//! allows and JSON-quoted strings everywhere else.
//!
//! ## Merge rules
//!
//! * Caller keys override extracted keys, except:
//!   arrays are unioned (extracted order first) and objects are shallow-merged.
//! * `type` and `converted` are always set last and always win.

use crate::output::ConfigMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

static RE_FRONTMATTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A---[ \t]*\r?\n(?:(.*?)\r?\n)?(?:---|\.\.\.)[ \t]*(?:\r?\n|\z)").unwrap()
});

/// Words YAML would read as something other than a string.
const RESERVED_WORDS: &[&str] = &["true", "false", "yes", "no", "on", "off", "null", "~"];

/// A document split into its frontmatter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontmatter {
    pub metadata: ConfigMap,
    pub content: String,
}

/// Does `text` open with a frontmatter block?
pub fn has_frontmatter(text: &str) -> bool {
    RE_FRONTMATTER.is_match(text)
}

/// Split a leading frontmatter block off `text`.
///
/// Text without a block, or with a block that is not a YAML mapping, comes
/// back unchanged with empty metadata.
pub fn extract_frontmatter(text: &str) -> Frontmatter {
    let unchanged = || Frontmatter {
        metadata: ConfigMap::new(),
        content: text.to_string(),
    };

    let Some(caps) = RE_FRONTMATTER.captures(text) else {
        return unchanged();
    };
    let yaml = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let body_start = caps.get(0).map(|m| m.end()).unwrap_or(0);

    let metadata = if yaml.trim().is_empty() {
        ConfigMap::new()
    } else {
        let parsed = serde_yaml::from_str::<serde_yaml::Value>(yaml)
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string()));
        match parsed {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => ConfigMap::new(),
            Ok(_) => {
                warn!("Frontmatter is not a mapping; leaving it in the body");
                return unchanged();
            }
            Err(e) => {
                warn!("Unparseable frontmatter ({}); leaving it in the body", e);
                return unchanged();
            }
        }
    };

    Frontmatter {
        metadata,
        content: text[body_start..].trim_start_matches(['\r', '\n']).to_string(),
    }
}

/// Merge extracted frontmatter with caller metadata.
pub fn merge_metadata(
    extracted: ConfigMap,
    caller: &ConfigMap,
    kind: &str,
    converted: &str,
) -> ConfigMap {
    let mut merged = extracted;
    for (key, incoming) in caller {
        match (merged.get_mut(key), incoming) {
            (Some(Value::Array(existing)), Value::Array(items)) => {
                for item in items {
                    if !existing.contains(item) {
                        existing.push(item.clone());
                    }
                }
            }
            (Some(Value::Object(existing)), Value::Object(fields)) => {
                for (k, v) in fields {
                    existing.insert(k.clone(), v.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), incoming.clone());
            }
        }
    }
    merged.insert("type".into(), Value::String(kind.to_string()));
    merged.insert("converted".into(), Value::String(converted.to_string()));
    merged
}

/// Render metadata as a `---` block, trailing newline included.
pub fn format_metadata(metadata: &ConfigMap) -> String {
    let mut yaml = String::from("---\n");
    for (key, value) in metadata {
        let key = yaml_key(key);
        match value {
            Value::Null => continue,
            Value::Array(items) if items.is_empty() => yaml.push_str(&format!("{key}: []\n")),
            Value::Array(items) => {
                yaml.push_str(&format!("{key}:\n"));
                for item in items {
                    yaml.push_str(&format!("  - {}\n", yaml_inline(item)));
                }
            }
            Value::Object(fields) if fields.is_empty() => yaml.push_str(&format!("{key}: {{}}\n")),
            Value::Object(fields) => {
                yaml.push_str(&format!("{key}:\n"));
                for (k, v) in fields {
                    yaml.push_str(&format!("  {}: {}\n", yaml_key(k), yaml_inline(v)));
                }
            }
            scalar => yaml.push_str(&format!("{key}: {}\n", yaml_inline(scalar))),
        }
    }
    yaml.push_str("---\n");
    yaml
}

/// Frontmatter, a blank line, then the body.
pub fn build_document(metadata: &ConfigMap, body: &str) -> String {
    format!(
        "{}\n{}",
        format_metadata(metadata),
        body.trim_start_matches(['\r', '\n'])
    )
}

fn yaml_key(key: &str) -> String {
    if is_plain_safe(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

/// Scalars as YAML scalars; nested containers as JSON flow (valid YAML).
fn yaml_inline(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if is_plain_safe(s) => s.clone(),
        Value::String(s) => quote(s),
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".into()),
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.replace('"', "\\\"")))
}

fn is_plain_safe(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    if s.trim() != s || first.is_ascii_digit() {
        return false;
    }
    if "-?:,[]{}#&*!|>'\"%@`.+".contains(first) {
        return false;
    }
    if s.contains(": ") || s.contains(" #") || s.ends_with(':') {
        return false;
    }
    if s.chars().any(|c| c.is_control()) {
        return false;
    }
    !RESERVED_WORDS.contains(&s.to_lowercase().as_str())
}
