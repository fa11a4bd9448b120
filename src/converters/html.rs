//! HTML → Markdown via `html2md`.
//!
//! Scripts and styles are dropped before conversion. Inline `data:` images
//! are lifted out of the Markdown into [`ImageRef`]s under `images/` so the
//! persistence stage writes them as files.

use super::{decode_text, file_stem, looks_like_text};
use crate::error::Any2MdError;
use crate::output::{ConfigMap, ImageData, ImageRef, RawResult};
use crate::pipeline::encode::extension_for_mime;
use crate::registry::{Converter, ConverterConfig, ConverterInput};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_SIZE: usize = 50 * 1024 * 1024;

static RE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static RE_SCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script>").unwrap());
static RE_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style\b.*?</style>").unwrap());
static RE_DATA_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(\s*(data:(image/[A-Za-z0-9.+-]+);base64,[A-Za-z0-9+/=\s]+?)\s*\)").unwrap()
});
static RE_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Markdown rendering of one HTML page.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlPage {
    pub markdown: String,
    pub title: Option<String>,
    pub images: Vec<ImageRef>,
}

impl HtmlPage {
    pub fn into_raw(self) -> RawResult {
        let mut raw = RawResult::markdown(self.markdown);
        if let Some(title) = self.title {
            raw = raw.with_metadata("title", title);
        }
        raw.images = self.images;
        raw
    }
}

pub struct HtmlConverter {
    config: ConverterConfig,
}

impl HtmlConverter {
    pub fn new() -> Self {
        Self {
            config: ConverterConfig::new("html")
                .extensions(&["html", "htm"])
                .mime_types(&["text/html", "application/xhtml+xml"])
                .max_size(MAX_SIZE),
        }
    }
}

impl Default for HtmlConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for HtmlConverter {
    fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn validate(&self, input: &ConverterInput) -> bool {
        looks_like_text(input)
    }

    async fn convert(
        &self,
        input: ConverterInput,
        name: &str,
        _api_key: Option<&str>,
        _options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        let html = decode_text(&input, "html")?;
        Ok(html_to_markdown(&html, &file_stem(name)).into_raw())
    }
}

/// Convert an HTML document. `prefix` names lifted images
/// (`images/<prefix>-1.png`, ...).
pub fn html_to_markdown(html: &str, prefix: &str) -> HtmlPage {
    let title = RE_TITLE
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty());

    let cleaned = RE_SCRIPT.replace_all(html, "");
    let cleaned = RE_STYLE.replace_all(&cleaned, "");
    let markdown = html2md::parse_html(&cleaned);
    let (markdown, images) = extract_inline_images(&markdown, prefix);

    HtmlPage {
        markdown: markdown.trim().to_string(),
        title,
        images,
    }
}

/// Replace `![alt](data:image/...;base64,...)` links with file paths and
/// return the payloads as images.
pub fn extract_inline_images(markdown: &str, prefix: &str) -> (String, Vec<ImageRef>) {
    let slug = slugify(prefix);
    let mut images = Vec::new();
    let rewritten = RE_DATA_IMAGE.replace_all(markdown, |caps: &regex::Captures<'_>| {
        let ext = extension_for_mime(&caps[3]);
        let path = format!("images/{}-{}.{}", slug, images.len() + 1, ext);
        images.push(ImageRef::new(path.clone(), ImageData::Encoded(caps[2].to_string())));
        format!("![{}]({})", &caps[1], path)
    });
    (rewritten.into_owned(), images)
}

/// Lowercase ASCII slug, `-` separated; `"page"` if nothing is left.
pub fn slugify(text: &str) -> String {
    let slug = RE_SLUG.replace_all(&text.to_lowercase(), "-").trim_matches('-').to_string();
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::decode_image_data;

    #[test]
    fn lifts_data_url_images() {
        let md = "Intro\n\n![logo](data:image/png;base64,aGVsbG8=)\n\n![remote](https://x.org/a.png)";
        let (out, images) = extract_inline_images(md, "My Page");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].path, "images/my-page-1.png");
        assert_eq!(decode_image_data(&images[0].data).unwrap(), b"hello");
        assert!(out.contains("![logo](images/my-page-1.png)"));
        assert!(out.contains("![remote](https://x.org/a.png)"));
    }

    #[test]
    fn jpeg_gets_jpg_extension() {
        let (_, images) = extract_inline_images("![](data:image/jpeg;base64,AAAA)", "p");
        assert_eq!(images[0].path, "images/p-1.jpg");
    }

    #[test]
    fn converts_html_and_reads_title() {
        let html = "<html><head><title>Q3 &amp; Q4</title><style>h1{}</style></head>\
                    <body><h1>Report</h1><p>Hello <b>world</b></p>\
                    <script>alert(1)</script></body></html>";
        let page = html_to_markdown(html, "report");
        assert_eq!(page.title.as_deref(), Some("Q3 & Q4"));
        assert!(page.markdown.contains("Report"));
        assert!(page.markdown.contains("world"));
        assert!(!page.markdown.contains("alert"));
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("Docs / Getting Started!"), "docs-getting-started");
        assert_eq!(slugify("///"), "page");
    }
}
