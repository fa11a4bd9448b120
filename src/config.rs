//! Configuration types for conversion and persistence.
//!
//! Orchestrator behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. How results land on disk is a
//! separate, per-save concern captured by [`SaveOptions`].

use crate::error::Any2MdError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::time::Duration;

/// Longest retry schedule accepted by the builder.
const MAX_RETRY_SCHEDULE: usize = 10;

/// Configuration for the conversion orchestrator and built-in converters.
///
/// # Example
/// ```rust
/// use edgequake_any2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .lookup_retry_delays_ms(vec![100, 200])
///     .max_crawl_pages(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_crawl_pages, 5);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Waits between converter lookups while the registry initialises.
    /// Default: `[500, 1000]`, i.e. three lookups in total.
    pub lookup_retry_delays_ms: Vec<u64>,

    /// Minimum spacing between forwarded progress updates. Default: 250.
    /// 0 % and 100 % always pass through.
    pub progress_interval_ms: u64,

    /// Request timeout for the web converters, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Maximum pages fetched by the `parenturl` crawler, parent included.
    /// Default: 10.
    pub max_crawl_pages: usize,

    /// User agent sent by the web converters.
    pub user_agent: String,

    /// Ask document converters to OCR. Surfaced into `pdf` options only.
    pub use_ocr: bool,

    /// Credential for the OCR/document backend. Surfaced into `pdf` options
    /// only and stripped from audio/video requests.
    pub ocr_api_key: Option<String>,

    /// Default converter credential when a request carries none.
    pub api_key: Option<String>,

    /// Optional progress sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            lookup_retry_delays_ms: vec![500, 1000],
            progress_interval_ms: 250,
            download_timeout_secs: 120,
            max_crawl_pages: 10,
            user_agent: concat!("any2md/", env!("CARGO_PKG_VERSION")).to_string(),
            use_ocr: false,
            ocr_api_key: None,
            api_key: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("lookup_retry_delays_ms", &self.lookup_retry_delays_ms)
            .field("progress_interval_ms", &self.progress_interval_ms)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_crawl_pages", &self.max_crawl_pages)
            .field("user_agent", &self.user_agent)
            .field("use_ocr", &self.use_ocr)
            .field("ocr_api_key", &self.ocr_api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Lookup retry schedule as durations.
    pub fn lookup_retry_delays(&self) -> Vec<Duration> {
        self.lookup_retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn lookup_retry_delays_ms(mut self, delays: Vec<u64>) -> Self {
        self.config.lookup_retry_delays_ms = delays;
        self
    }

    pub fn progress_interval_ms(mut self, ms: u64) -> Self {
        self.config.progress_interval_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_crawl_pages(mut self, n: usize) -> Self {
        self.config.max_crawl_pages = n;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn use_ocr(mut self, v: bool) -> Self {
        self.config.use_ocr = v;
        self
    }

    pub fn ocr_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.ocr_api_key = Some(key.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Any2MdError> {
        let c = &self.config;
        if c.lookup_retry_delays_ms.len() > MAX_RETRY_SCHEDULE {
            return Err(Any2MdError::InvalidConfig(format!(
                "At most {} lookup retries are allowed, got {}",
                MAX_RETRY_SCHEDULE,
                c.lookup_retry_delays_ms.len()
            )));
        }
        if c.download_timeout_secs == 0 {
            return Err(Any2MdError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_crawl_pages == 0 {
            return Err(Any2MdError::InvalidConfig(
                "max_crawl_pages must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Persistence options ──────────────────────────────────────────────────

/// Where extracted images are written, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageLayout {
    /// Keep the relative directory each converter declared. (default)
    #[default]
    Declared,
    /// Flatten every image into one shared directory.
    Shared(String),
}

/// Options for [`crate::pipeline::persist::save_conversion_result`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Write into `<output_dir>/<name>_<epoch-ms>/document.md`. When false,
    /// write `<output_dir>/<name>.md` directly and the caller owns
    /// uniqueness. Default: true.
    pub create_subdirectory: bool,

    /// Image placement. Default: [`ImageLayout::Declared`].
    pub image_layout: ImageLayout,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            create_subdirectory: true,
            image_layout: ImageLayout::default(),
        }
    }
}

impl SaveOptions {
    /// Options for writing straight into a caller-owned directory.
    pub fn direct() -> Self {
        Self {
            create_subdirectory: false,
            ..Self::default()
        }
    }

    pub fn with_image_layout(mut self, layout: ImageLayout) -> Self {
        self.image_layout = layout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_three_lookups() {
        let c = ConversionConfig::default();
        assert_eq!(c.lookup_retry_delays_ms, vec![500, 1000]);
        assert_eq!(c.progress_interval_ms, 250);
    }

    #[test]
    fn rejects_long_retry_schedule() {
        let err = ConversionConfig::builder()
            .lookup_retry_delays_ms(vec![1; 11])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("lookup retries"));
    }

    #[test]
    fn rejects_zero_crawl_pages() {
        assert!(ConversionConfig::builder().max_crawl_pages(0).build().is_err());
    }

    #[test]
    fn debug_redacts_credentials() {
        let c = ConversionConfig::builder()
            .ocr_api_key("sk-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn direct_save_options() {
        let o = SaveOptions::direct();
        assert!(!o.create_subdirectory);
        assert_eq!(o.image_layout, ImageLayout::Declared);
    }
}
