//! Converter registry: the `Converter` trait and a lazily built,
//! explicitly owned map from type tokens to converters.
//!
//! The registry is assembled once, on first use, by a [`RegistrySetup`].
//! Concurrent first callers share one setup run. A failed setup leaves the
//! registry uninitialized, so the next call gets a fresh attempt instead of
//! a cached error. After setup the map is read-only.
//!
//! ```text
//! ConverterRegistry ──initialize()──▶ RegistrySetup::setup()
//!        │                                   │
//!        └──── Arc<RegistryHandle> ◀─────────┘ (memoized)
//! ```

use crate::error::Any2MdError;
use crate::output::{ConfigMap, RawResult};
use crate::pipeline::resolve::{is_web_token, normalize_token};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

// ── Converter trait ──────────────────────────────────────────────────────

/// Static description of a converter, used for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    pub name: String,
    /// Type tokens handled, lowercase without the dot.
    pub extensions: Vec<String>,
    pub mime_types: Vec<String>,
    /// Largest accepted input in bytes. `None` means unlimited.
    pub max_size: Option<usize>,
}

impl ConverterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: Vec::new(),
            mime_types: Vec::new(),
            max_size: None,
        }
    }

    pub fn extensions(mut self, exts: &[&str]) -> Self {
        self.extensions = exts.iter().map(|e| normalize_token(e)).collect();
        self
    }

    pub fn mime_types(mut self, mimes: &[&str]) -> Self {
        self.mime_types = mimes.iter().map(|m| m.to_lowercase()).collect();
        self
    }

    pub fn max_size(mut self, bytes: usize) -> Self {
        self.max_size = Some(bytes);
        self
    }
}

/// What a converter receives: file bytes, or a URL for web converters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverterInput {
    Bytes(Vec<u8>),
    Url(String),
}

impl ConverterInput {
    /// Size used for the `max_size` check. URLs count as zero.
    pub fn len(&self) -> usize {
        match self {
            ConverterInput::Bytes(b) => b.len(),
            ConverterInput::Url(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ConverterInput::Bytes(b) => b.is_empty(),
            ConverterInput::Url(u) => u.is_empty(),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ConverterInput::Bytes(b) => Some(b),
            ConverterInput::Url(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            ConverterInput::Url(u) => Some(u),
            ConverterInput::Bytes(_) => None,
        }
    }
}

/// One format adapter.
///
/// `convert` may return any [`RawResult`] shape; the orchestrator
/// normalizes it. Errors should be built with
/// [`Any2MdError::conversion_failed`] so they carry the type prefix.
#[async_trait]
pub trait Converter: Send + Sync {
    fn config(&self) -> &ConverterConfig;

    /// Cheap content check run before `convert`.
    fn validate(&self, _input: &ConverterInput) -> bool {
        true
    }

    async fn convert(
        &self,
        input: ConverterInput,
        name: &str,
        api_key: Option<&str>,
        options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError>;
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Assembles a [`RegistryHandle`].
#[derive(Default)]
pub struct RegistryBuilder {
    by_token: HashMap<String, Arc<dyn Converter>>,
    by_mime: HashMap<String, Arc<dyn Converter>>,
    web_fallback: Option<Arc<dyn Converter>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a converter under every extension and MIME type it
    /// declares. A later registration for the same key replaces the
    /// earlier one.
    pub fn register(self, converter: impl Converter + 'static) -> Self {
        self.register_arc(Arc::new(converter))
    }

    pub fn register_arc(mut self, converter: Arc<dyn Converter>) -> Self {
        let config = converter.config();
        debug!("Registering converter: {}", config.name);
        for ext in &config.extensions {
            if let Some(old) = self.by_token.insert(ext.clone(), Arc::clone(&converter)) {
                debug!("'{}' now handled by {} (was {})", ext, config.name, old.config().name);
            }
        }
        for mime in &config.mime_types {
            self.by_mime.insert(mime.clone(), Arc::clone(&converter));
        }
        self
    }

    /// Converter used for `url`/`parenturl` when nothing is registered
    /// for the token, and as the single retry after a web converter fails.
    pub fn web_fallback(mut self, converter: impl Converter + 'static) -> Self {
        self.web_fallback = Some(Arc::new(converter));
        self
    }

    /// Validate and freeze. An empty map is an initialization error.
    pub fn build(self) -> Result<RegistryHandle, Any2MdError> {
        if self.by_token.is_empty() {
            return Err(Any2MdError::RegistryInit(
                "no converters registered".to_string(),
            ));
        }
        Ok(RegistryHandle {
            by_token: Arc::new(self.by_token),
            by_mime: Arc::new(self.by_mime),
            web_fallback: self.web_fallback,
        })
    }
}

// ── Handle ───────────────────────────────────────────────────────────────

/// The initialized, read-only converter map.
#[derive(Clone)]
pub struct RegistryHandle {
    by_token: Arc<HashMap<String, Arc<dyn Converter>>>,
    by_mime: Arc<HashMap<String, Arc<dyn Converter>>>,
    web_fallback: Option<Arc<dyn Converter>>,
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("tokens", &self.tokens())
            .field("web_fallback", &self.web_fallback.is_some())
            .finish()
    }
}

impl RegistryHandle {
    pub fn converter_by_extension(&self, token: &str) -> Option<Arc<dyn Converter>> {
        self.by_token.get(&normalize_token(token)).cloned()
    }

    /// Parameters (`; charset=...`) are ignored.
    pub fn converter_by_mime_type(&self, mime: &str) -> Option<Arc<dyn Converter>> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        self.by_mime.get(&essence).cloned()
    }

    /// Every registered type token, sorted.
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.by_token.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn has_web_fallback(&self) -> bool {
        self.web_fallback.is_some()
    }

    /// Generic dispatch: the registered converter for `token`, else the
    /// web fallback for web tokens.
    pub async fn convert_to_markdown(
        &self,
        token: &str,
        input: ConverterInput,
        name: &str,
        api_key: Option<&str>,
        options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        if let Some(converter) = self.converter_by_extension(token) {
            return converter.convert(input, name, api_key, options).await;
        }
        match &self.web_fallback {
            Some(fallback) if is_web_token(token) => {
                debug!("No '{}' converter; using web fallback {}", token, fallback.config().name);
                fallback.convert(input, name, api_key, options).await
            }
            _ => Err(Any2MdError::UnsupportedFileType {
                token: token.to_string(),
            }),
        }
    }

    /// Fetch a URL through the web fallback, bypassing the token map.
    pub async fn convert_web_direct(
        &self,
        url: &str,
        name: &str,
        api_key: Option<&str>,
        options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        let fallback = self
            .web_fallback
            .as_ref()
            .ok_or_else(|| Any2MdError::UnsupportedFileType {
                token: "url".to_string(),
            })?;
        fallback
            .convert(ConverterInput::Url(url.to_string()), name, api_key, options)
            .await
    }
}

/// A converter that routes through [`RegistryHandle::convert_to_markdown`].
///
/// Synthesized for web tokens that have no converter of their own.
pub struct DispatchConverter {
    handle: Arc<RegistryHandle>,
    token: String,
    config: ConverterConfig,
}

impl DispatchConverter {
    pub fn new(handle: Arc<RegistryHandle>, token: &str) -> Self {
        Self {
            config: ConverterConfig::new(format!("dispatch:{token}")).extensions(&[token]),
            handle,
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl Converter for DispatchConverter {
    fn config(&self) -> &ConverterConfig {
        &self.config
    }

    async fn convert(
        &self,
        input: ConverterInput,
        name: &str,
        api_key: Option<&str>,
        options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        self.handle
            .convert_to_markdown(&self.token, input, name, api_key, options)
            .await
    }
}

// ── Lazy registry ────────────────────────────────────────────────────────

/// Builds the converter map on first use.
#[async_trait]
pub trait RegistrySetup: Send + Sync {
    async fn setup(&self) -> Result<RegistryHandle, Any2MdError>;
}

/// Setup that hands out an already built map.
struct Prebuilt(RegistryHandle);

#[async_trait]
impl RegistrySetup for Prebuilt {
    async fn setup(&self) -> Result<RegistryHandle, Any2MdError> {
        Ok(self.0.clone())
    }
}

/// Owned, lazily initialized converter registry.
///
/// Construct one at the application's composition root and share it via
/// `Arc`. Tests build their own instances with stub setups.
pub struct ConverterRegistry {
    setup: Arc<dyn RegistrySetup>,
    cell: OnceCell<Arc<RegistryHandle>>,
}

impl ConverterRegistry {
    pub fn new(setup: impl RegistrySetup + 'static) -> Self {
        Self {
            setup: Arc::new(setup),
            cell: OnceCell::new(),
        }
    }

    /// A registry over an already built map.
    pub fn from_handle(handle: RegistryHandle) -> Self {
        Self::new(Prebuilt(handle))
    }

    /// Assemble the map if needed and return it.
    ///
    /// Concurrent callers wait on one setup run. On failure nothing is
    /// cached.
    pub async fn initialize(&self) -> Result<Arc<RegistryHandle>, Any2MdError> {
        self.cell
            .get_or_try_init(|| async {
                info!("Initializing converter registry");
                match self.setup.setup().await {
                    Ok(handle) => {
                        info!("Converter registry ready: {} types", handle.tokens().len());
                        Ok(Arc::new(handle))
                    }
                    Err(e) => {
                        warn!("Converter registry initialization failed: {}", e);
                        Err(e)
                    }
                }
            })
            .await
            .cloned()
    }

    /// The map, if initialization already succeeded.
    pub fn get(&self) -> Option<Arc<RegistryHandle>> {
        self.cell.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}
