//! Web pages: single-page fetch (`url`) and same-site crawl (`parenturl`).
//!
//! Pages are fetched with `reqwest` under the configured timeout and user
//! agent, then rendered with [`html_to_markdown`]. Remote images stay as
//! links; inline `data:` images are lifted like any HTML input.
//!
//! A crawl visits pages breadth-first, a few at a time, following only links
//! on the same host whose path lies under the parent URL's path. Child pages
//! that fail are skipped. A failing parent page fails the conversion.

use super::html::{html_to_markdown, slugify, HtmlPage};
use crate::config::ConversionConfig;
use crate::error::Any2MdError;
use crate::output::{ConfigMap, OutputFile, RawResult};
use crate::pipeline::resolve::extension_of;
use crate::registry::{Converter, ConverterConfig, ConverterInput};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};

static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<a\b[^>]*?\bhref\s*=\s*["']([^"'#]+)"#).unwrap());

/// Child pages fetched at once.
const CRAWL_CONCURRENCY: usize = 4;

/// Extensions a crawler still treats as pages.
const PAGE_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "jsp"];

/// Network settings shared by the web converters.
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_pages: usize,
}

impl WebSettings {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            timeout_secs: config.download_timeout_secs,
            user_agent: config.user_agent.clone(),
            max_pages: config.max_crawl_pages,
        }
    }

    fn client(&self) -> Result<reqwest::Client, Any2MdError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| Any2MdError::RegistryInit(format!("HTTP client: {e}")))
    }
}

/// Fetch a page body as text.
async fn fetch_html(client: &reqwest::Client, url: &str, timeout_secs: u64) -> Result<String, Any2MdError> {
    info!("Fetching {}", url);
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Any2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Any2MdError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Any2MdError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    response.text().await.map_err(|e| Any2MdError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn require_url(input: &ConverterInput, kind: &str) -> Result<Url, Any2MdError> {
    let raw = input
        .as_url()
        .ok_or_else(|| Any2MdError::conversion_failed(kind, "expected a URL"))?;
    Url::parse(raw).map_err(|e| Any2MdError::conversion_failed(kind, format!("invalid URL '{raw}': {e}")))
}

fn is_http(input: &ConverterInput) -> bool {
    input
        .as_url()
        .is_some_and(|u| u.starts_with("http://") || u.starts_with("https://"))
}

// ── url ──────────────────────────────────────────────────────────────────

/// Converts a single web page.
pub struct UrlConverter {
    config: ConverterConfig,
    settings: WebSettings,
    client: reqwest::Client,
}

impl UrlConverter {
    pub fn new(settings: WebSettings) -> Result<Self, Any2MdError> {
        Ok(Self {
            config: ConverterConfig::new("web-page").extensions(&["url"]),
            client: settings.client()?,
            settings,
        })
    }
}

#[async_trait]
impl Converter for UrlConverter {
    fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn validate(&self, input: &ConverterInput) -> bool {
        is_http(input)
    }

    async fn convert(
        &self,
        input: ConverterInput,
        name: &str,
        _api_key: Option<&str>,
        _options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        let url = require_url(&input, "url")?;
        let html = fetch_html(&self.client, url.as_str(), self.settings.timeout_secs).await?;
        let page = html_to_markdown(&html, name);
        Ok(page.into_raw().with_metadata("source_url", url.as_str()))
    }
}

// ── parenturl ────────────────────────────────────────────────────────────

/// Crawls a parent page and the pages below it.
pub struct ParentUrlConverter {
    config: ConverterConfig,
    settings: WebSettings,
    client: reqwest::Client,
}

impl ParentUrlConverter {
    pub fn new(settings: WebSettings) -> Result<Self, Any2MdError> {
        Ok(Self {
            config: ConverterConfig::new("web-crawl").extensions(&["parenturl"]),
            client: settings.client()?,
            settings,
        })
    }
}

#[async_trait]
impl Converter for ParentUrlConverter {
    fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn validate(&self, input: &ConverterInput) -> bool {
        is_http(input)
    }

    async fn convert(
        &self,
        input: ConverterInput,
        name: &str,
        _api_key: Option<&str>,
        options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        let parent = require_url(&input, "parenturl")?;
        let max_pages = options
            .get("max_pages")
            .and_then(Value::as_u64)
            .map(|n| n.max(1) as usize)
            .unwrap_or(self.settings.max_pages);

        let mut crawl = Crawl::new(&parent);
        let mut pages: Vec<(Url, HtmlPage)> = Vec::new();

        while pages.len() < max_pages {
            let batch = crawl.take(CRAWL_CONCURRENCY.min(max_pages - pages.len()));
            if batch.is_empty() {
                break;
            }
            // `buffered` keeps queue order, so output is stable across runs.
            let fetched: Vec<_> = stream::iter(batch)
                .map(|url| async move {
                    let html = fetch_html(&self.client, url.as_str(), self.settings.timeout_secs).await;
                    (url, html)
                })
                .buffered(CRAWL_CONCURRENCY)
                .collect()
                .await;

            for (url, html) in fetched {
                let html = match html {
                    Ok(html) => html,
                    Err(e) if url == crawl.root => return Err(e),
                    Err(e) => {
                        warn!("Skipping {}: {}", url, e);
                        continue;
                    }
                };
                crawl.enqueue_links(&html, &url);
                let page = html_to_markdown(&html, &page_slug(&url));
                pages.push((url, page));
            }
        }
        info!("Crawled {} pages under {}", pages.len(), parent);

        Ok(assemble_site(&parent, name, pages))
    }
}

/// Breadth-first frontier restricted to one host and path prefix.
struct Crawl {
    root: Url,
    prefix: String,
    queue: VecDeque<Url>,
    seen: HashSet<String>,
}

impl Crawl {
    fn new(root: &Url) -> Self {
        let root = canonical(root);
        let prefix = root.path().trim_end_matches('/').to_string();
        let mut seen = HashSet::new();
        seen.insert(visit_key(&root));
        Self {
            queue: VecDeque::from([root.clone()]),
            root,
            prefix,
            seen,
        }
    }

    /// Pop up to `n` queued URLs.
    fn take(&mut self, n: usize) -> Vec<Url> {
        let n = n.min(self.queue.len());
        self.queue.drain(..n).collect()
    }

    fn enqueue_links(&mut self, html: &str, base: &Url) {
        for link in child_links(html, base, &self.root, &self.prefix) {
            if self.seen.insert(visit_key(&link)) {
                debug!("Queued {}", link);
                self.queue.push_back(link);
            }
        }
    }
}

/// Links in `html` on `root`'s host whose path lies under `prefix`.
fn child_links(html: &str, base: &Url, root: &Url, prefix: &str) -> Vec<Url> {
    RE_HREF
        .captures_iter(html)
        .filter_map(|c| base.join(c[1].trim()).ok())
        .map(|u| canonical(&u))
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .filter(|u| u.host_str() == root.host_str())
        .filter(|u| {
            let path = u.path().trim_end_matches('/');
            path.starts_with(prefix) && (path.len() == prefix.len() || path[prefix.len()..].starts_with('/'))
        })
        .filter(|u| match extension_of(u.path()) {
            Some(ext) => PAGE_EXTENSIONS.contains(&ext.as_str()),
            None => true,
        })
        .collect()
}

/// Drop fragment and query so one page is visited once.
fn canonical(url: &Url) -> Url {
    let mut u = url.clone();
    u.set_fragment(None);
    u.set_query(None);
    u
}

/// `/docs` and `/docs/` are the same page. The URL itself keeps its slash
/// since relative links resolve against it.
fn visit_key(url: &Url) -> String {
    let s = url.as_str();
    match s.strip_suffix('/') {
        Some(trimmed) if url.path() != "/" => trimmed.to_string(),
        _ => s.to_string(),
    }
}

fn page_slug(url: &Url) -> String {
    slugify(url.path())
}

fn assemble_site(parent: &Url, name: &str, pages: Vec<(Url, HtmlPage)>) -> RawResult {
    let title = pages
        .first()
        .and_then(|(_, p)| p.title.clone())
        .unwrap_or_else(|| name.to_string());

    let mut index = format!("# {title}\n\nSource: <{parent}>\n\n## Pages\n\n");
    let mut raw = RawResult::default();
    let mut used = HashSet::new();

    for (url, page) in pages {
        let mut slug = page_slug(&url);
        let mut n = 2;
        while !used.insert(slug.clone()) {
            slug = format!("{}-{}", page_slug(&url), n);
            n += 1;
        }
        let label = page.title.clone().unwrap_or_else(|| url.path().to_string());
        index.push_str(&format!("- [{label}](pages/{slug}.md)\n"));

        let mut file = OutputFile::new(format!("pages/{slug}.md"), page.markdown);
        file.metadata.insert("title".into(), Value::String(label));
        file.metadata.insert("source_url".into(), Value::String(url.to_string()));
        raw.images.extend(page.images);
        raw.files.push(file);
    }

    let crawled = raw.files.len();
    let mut body = RawResult::markdown(index)
        .with_metadata("title", title)
        .with_metadata("source_url", parent.as_str())
        .with_metadata("pages_crawled", crawled);
    body.images = raw.images;
    body.files = raw.files;
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn child_links_stay_under_parent() {
        let root = url("https://docs.example.org/guide/");
        let html = r#"
            <a href="intro">Intro</a>
            <a href="/guide/setup/?x=1#top">Setup</a>
            <a href="/guidebook/">Other</a>
            <a href="/blog/post">Blog</a>
            <a href="https://elsewhere.org/guide/a">External</a>
            <a href="/guide/manual.pdf">PDF</a>
            <a href="mailto:me@example.org">Mail</a>
        "#;
        let links: Vec<String> = child_links(html, &root, &root, "/guide")
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            links,
            vec![
                "https://docs.example.org/guide/intro",
                "https://docs.example.org/guide/setup/",
            ]
        );
    }

    #[test]
    fn crawl_deduplicates() {
        let root = url("https://x.org/docs");
        let mut crawl = Crawl::new(&root);
        assert_eq!(crawl.take(4), vec![root.clone()]);
        let html = r#"<a href="/docs/a">a</a><a href="/docs/a#frag">a again</a><a href="/docs">self</a>"#;
        crawl.enqueue_links(html, &root);
        let next: Vec<String> = crawl.take(4).into_iter().map(|u| u.to_string()).collect();
        assert_eq!(next, vec!["https://x.org/docs/a"]);
        assert!(crawl.take(4).is_empty());
    }

    #[test]
    fn trailing_slash_root_is_visited_once() {
        let root = url("https://x.org/docs/");
        let mut crawl = Crawl::new(&root);
        assert_eq!(crawl.take(4), vec![root.clone()]);
        let html = r#"<a href="/docs">home</a><a href="/docs/">home again</a><a href="a/">a</a><a href="/docs/a">a again</a>"#;
        crawl.enqueue_links(html, &root);
        let next: Vec<String> = crawl.take(4).into_iter().map(|u| u.to_string()).collect();
        assert_eq!(next, vec!["https://x.org/docs/a/"]);
        assert!(crawl.take(4).is_empty());
    }

    #[test]
    fn site_assembly_writes_one_file_per_page() {
        let parent = url("https://x.org/docs/");
        let page = |title: &str, md: &str| HtmlPage {
            markdown: md.to_string(),
            title: Some(title.to_string()),
            images: Vec::new(),
        };
        let raw = assemble_site(
            &parent,
            "x.org/docs",
            vec![
                (parent.clone(), page("Docs", "# Docs")),
                (url("https://x.org/docs/intro"), page("Intro", "# Intro")),
            ],
        );
        assert_eq!(raw.files.len(), 2);
        assert_eq!(raw.files[0].path, "pages/docs.md");
        assert_eq!(raw.files[1].path, "pages/docs-intro.md");
        assert_eq!(raw.files[1].metadata["source_url"], "https://x.org/docs/intro");
        let content = raw.body["content"].as_str().unwrap();
        assert!(content.starts_with("# Docs\n"));
        assert!(content.contains("- [Intro](pages/docs-intro.md)"));
        assert_eq!(raw.body["metadata"]["pages_crawled"], 2);
    }

    #[tokio::test]
    async fn rejects_byte_input() {
        let settings = WebSettings::from_config(&ConversionConfig::default());
        let c = UrlConverter::new(settings).unwrap();
        let input = ConverterInput::Bytes(b"https://x.org".to_vec());
        assert!(!c.validate(&input));
        let err = c.convert(input, "x", None, &ConfigMap::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("URL conversion failed"));
    }
}
