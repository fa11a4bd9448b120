//! Conversion entry points: the orchestrator.
//!
//! [`Orchestrator::convert_file`] runs one request through the pipeline and
//! always returns a [`CanonicalResult`]. Every failure (unresolvable type,
//! missing converter, converter error) comes back as a failure-shaped result
//! with the identity fields populated. [`Orchestrator::convert_and_save`]
//! additionally persists the result and is stricter: failures are `Err`.
//!
//! ## Steps
//!
//! ```text
//! resolve type ─▶ name input ─▶ look up converter (bounded retry)
//!      ─▶ read input ─▶ adjust options ─▶ guard (size, validate)
//!      ─▶ convert (web: one fallback) ─▶ normalize
//! ```

use crate::config::{ConversionConfig, SaveOptions};
use crate::error::Any2MdError;
use crate::fs::TokioFs;
use crate::output::{CanonicalResult, ConfigMap, PersistedOutput};
use crate::pipeline::input::{derive_file_name, read_input, url_of, ConversionRequest};
use crate::pipeline::normalize::standardize_result;
use crate::pipeline::persist::{save_with, SaveRequest};
use crate::pipeline::resolve::{
    category_for, is_audio_token, is_video_token, is_web_token, normalize_token, resolve_type,
};
use crate::progress::{ProgressDetail, ProgressTracker};
use crate::registry::{Converter, ConverterInput, ConverterRegistry, DispatchConverter, RegistryHandle};
use crate::retry::retry_with_schedule;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Option keys that carry document/OCR credentials.
const DOCUMENT_CREDENTIAL_KEYS: &[&str] = &["ocr_api_key", "document_api_key"];

/// Placeholder for identity fields not yet known when a request fails.
const UNKNOWN: &str = "unknown";

/// Identity fields, filled in as the pipeline learns them.
struct Identity {
    kind: String,
    name: String,
    category: String,
}

/// A converter picked for a request.
struct Dispatch {
    converter: Arc<dyn Converter>,
    handle: Arc<RegistryHandle>,
    /// Built on the fly for a web token with no converter of its own.
    synthesized: bool,
}

/// Runs conversion requests against a converter registry.
pub struct Orchestrator {
    registry: Arc<ConverterRegistry>,
    config: ConversionConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<ConverterRegistry>, config: ConversionConfig) -> Self {
        Self { registry, config }
    }

    /// An orchestrator over the built-in converters.
    pub fn builtin(config: ConversionConfig) -> Self {
        let registry = Arc::new(ConverterRegistry::builtin(&config));
        Self::new(registry, config)
    }

    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert one input. Never fails; check `success` on the result.
    pub async fn convert_file(&self, request: &ConversionRequest) -> CanonicalResult {
        let progress = self.tracker();
        let mut identity = Identity::from_request(request);

        let result = match self.try_convert(request, &progress, &mut identity).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Conversion of {} failed: {}", identity.name, e);
                CanonicalResult::failure(&identity.kind, &identity.name, &identity.category, e.to_string())
            }
        };
        progress.update(100.0, Some(&ProgressDetail::status(if result.success { "done" } else { "failed" })));
        result
    }

    /// Convert one input and write it under `output_dir`.
    ///
    /// # Errors
    /// Any conversion failure, including a converter that reported
    /// `success: false`, and any fatal persistence error.
    pub async fn convert_and_save(
        &self,
        request: &ConversionRequest,
        output_dir: impl AsRef<Path>,
        options: SaveOptions,
    ) -> Result<PersistedOutput, Any2MdError> {
        let progress = self.tracker();
        let outcome = self.save_inner(request, output_dir.as_ref(), options, &progress).await;
        let status = match &outcome {
            Ok(_) => "done",
            Err(e) => {
                warn!("Nothing saved: {}", e);
                "failed"
            }
        };
        progress.update(100.0, Some(&ProgressDetail::status(status)));
        outcome
    }

    async fn save_inner(
        &self,
        request: &ConversionRequest,
        output_dir: &Path,
        options: SaveOptions,
        progress: &ProgressTracker,
    ) -> Result<PersistedOutput, Any2MdError> {
        let mut identity = Identity::from_request(request);
        let result = self.try_convert(request, progress, &mut identity).await?;
        if !result.success {
            return Err(Any2MdError::ConversionFailed {
                kind: result.kind.to_uppercase(),
                reason: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "converter reported failure".to_string()),
            });
        }

        let save = SaveRequest::from_result(&result, output_dir, options);
        save_with(&TokioFs, save, Some(progress)).await
    }

    fn tracker(&self) -> ProgressTracker {
        ProgressTracker::new(
            self.config.progress_callback.clone(),
            Duration::from_millis(self.config.progress_interval_ms),
        )
    }

    async fn try_convert(
        &self,
        request: &ConversionRequest,
        progress: &ProgressTracker,
        identity: &mut Identity,
    ) -> Result<CanonicalResult, Any2MdError> {
        let start = Instant::now();
        progress.update(5.0, Some(&ProgressDetail::status("initializing")));

        // ── Step 1: Resolve type ─────────────────────────────────────────
        let hint = request.naming_hint();
        let token = match resolve_type(
            &request.input,
            request.declared_type.as_deref(),
            request.declared_category.as_deref(),
            hint.as_deref(),
        ) {
            Some(token) => token,
            None => self.token_from_registry_mime(request).await.ok_or_else(|| {
                Any2MdError::UnresolvableType {
                    name: hint.clone().unwrap_or_else(|| request.input.describe()),
                }
            })?,
        };
        let web = is_web_token(&token);
        identity.kind = token.clone();
        if request.declared_category.is_none() {
            identity.category = category_for(&token).to_string();
        }
        debug!("Resolved type '{}' (category {})", token, identity.category);

        // ── Step 2: Name the input ───────────────────────────────────────
        let name = derive_file_name(request, web)?;
        identity.name = name.clone();
        info!("Starting conversion: {} as {}", name, token);

        // ── Step 3: Converter lookup ─────────────────────────────────────
        let dispatch = self.lookup(&token).await?;
        debug!(
            "Dispatching {} to {}{}",
            name,
            dispatch.converter.config().name,
            if dispatch.synthesized { " (synthesized)" } else { "" }
        );

        // ── Step 4: Input ────────────────────────────────────────────────
        let (input, url) = if web {
            let url = url_of(&request.input)?;
            (ConverterInput::Url(url.clone()), Some(url))
        } else {
            (ConverterInput::Bytes(read_input(&request.input).await?), None)
        };

        // ── Step 5: Options ──────────────────────────────────────────────
        let options = self.adjust_options(&token, &request.options);
        let api_key = request.api_key.as_deref().or(self.config.api_key.as_deref());

        // ── Step 6: Guards ───────────────────────────────────────────────
        if let Some(max) = dispatch.converter.config().max_size {
            if input.len() > max {
                return Err(Any2MdError::FileTooLarge {
                    kind: token.clone(),
                    name,
                    size: input.len(),
                    max,
                });
            }
        }
        if !dispatch.converter.validate(&input) {
            return Err(Any2MdError::ValidationFailed { kind: token.clone(), name });
        }

        // ── Step 7: Convert ──────────────────────────────────────────────
        progress.update(20.0, Some(&ProgressDetail::status("converting").with_message(name.clone())));
        let raw = match dispatch.converter.convert(input, &name, api_key, &options).await {
            Ok(raw) => raw,
            Err(e) => match url {
                Some(url) if !dispatch.synthesized && dispatch.handle.has_web_fallback() => {
                    warn!("{} converter failed ({}); trying direct web conversion", token, e);
                    dispatch
                        .handle
                        .convert_web_direct(&url, &name, api_key, &options)
                        .await
                        .map_err(|e| prefixed(&token, e))?
                }
                _ => return Err(prefixed(&token, e)),
            },
        };

        // ── Step 8: Normalize ────────────────────────────────────────────
        progress.update(95.0, Some(&ProgressDetail::status("finalizing")));
        let result = standardize_result(raw, &token, &name, &identity.category);
        info!(
            "Converted {} ({}) in {}ms: {} chars, {} images",
            name,
            token,
            start.elapsed().as_millis(),
            result.content.len(),
            result.images.len()
        );
        Ok(result)
    }

    /// Declared MIME types the static table does not know.
    async fn token_from_registry_mime(&self, request: &ConversionRequest) -> Option<String> {
        let declared = request.declared_type.as_deref()?;
        if !declared.contains('/') {
            return None;
        }
        let handle = self.registry.initialize().await.ok()?;
        let converter = handle.converter_by_mime_type(declared)?;
        converter.config().extensions.first().cloned()
    }

    /// Find the converter for `token`, tolerating a registry that is slow
    /// to come up.
    async fn lookup(&self, token: &str) -> Result<Dispatch, Any2MdError> {
        let delays = self.config.lookup_retry_delays();
        let attempts = delays.len() + 1;

        retry_with_schedule(&delays, |attempt| async move {
            let handle = self.registry.initialize().await?;
            if let Some(converter) = handle.converter_by_extension(token) {
                return Ok(Dispatch {
                    converter,
                    handle,
                    synthesized: false,
                });
            }
            if is_web_token(token) && handle.has_web_fallback() {
                return Ok(Dispatch {
                    converter: Arc::new(DispatchConverter::new(Arc::clone(&handle), token)),
                    handle,
                    synthesized: true,
                });
            }
            debug!("No converter for '{}' on lookup {}", token, attempt + 1);
            Err(Any2MdError::UnsupportedFileType {
                token: token.to_string(),
            })
        })
        .await
        .map_err(|e| match e {
            Any2MdError::UnsupportedFileType { token } => Any2MdError::ConverterNotFound { token, attempts },
            other => other,
        })
    }

    fn adjust_options(&self, token: &str, options: &ConfigMap) -> ConfigMap {
        let mut options = options.clone();
        if token == "pdf" {
            let use_ocr = self.config.use_ocr || options.get("use_ocr").and_then(Value::as_bool).unwrap_or(false);
            options.insert("use_ocr".into(), Value::Bool(use_ocr));
            if !options.contains_key("ocr_api_key") {
                if let Some(key) = &self.config.ocr_api_key {
                    options.insert("ocr_api_key".into(), Value::String(key.clone()));
                }
            }
            info!(
                "PDF conversion: OCR {}, OCR credential {}",
                if use_ocr { "enabled" } else { "disabled" },
                if options.contains_key("ocr_api_key") { "present" } else { "absent" }
            );
        } else if is_audio_token(token) || is_video_token(token) {
            for key in DOCUMENT_CREDENTIAL_KEYS {
                if options.remove(*key).is_some() {
                    debug!("Removed '{}' from {} options", key, token);
                }
            }
        }
        options
    }
}

impl Identity {
    fn from_request(request: &ConversionRequest) -> Self {
        Self {
            kind: request
                .declared_type
                .as_deref()
                .map(normalize_token)
                .filter(|t| !t.is_empty() && !t.contains('/'))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            name: request.naming_hint().unwrap_or_else(|| UNKNOWN.to_string()),
            category: request
                .declared_category
                .as_deref()
                .map(normalize_token)
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// Give converter errors the uniform `<TYPE> conversion failed:` prefix.
fn prefixed(token: &str, e: Any2MdError) -> Any2MdError {
    match e {
        e @ Any2MdError::ConversionFailed { .. } => e,
        other => Any2MdError::conversion_failed(token, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RawResult;
    use crate::progress::ConversionProgressCallback;
    use crate::registry::{ConverterConfig, RegistryBuilder, RegistrySetup};
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Seen {
        options: Option<ConfigMap>,
        api_key: Option<String>,
        input: Option<ConverterInput>,
    }

    struct Stub {
        config: ConverterConfig,
        reply: Result<Value, &'static str>,
        valid: bool,
        seen: Arc<Mutex<Seen>>,
    }

    impl Stub {
        fn ok(name: &str, exts: &[&str], content: &str) -> Self {
            Self {
                config: ConverterConfig::new(name).extensions(exts),
                reply: Ok(json!({ "content": content })),
                valid: true,
                seen: Arc::new(Mutex::new(Seen::default())),
            }
        }

        fn failing(name: &str, exts: &[&str], reason: &'static str) -> Self {
            Self {
                reply: Err(reason),
                ..Self::ok(name, exts, "")
            }
        }
    }

    #[async_trait]
    impl Converter for Stub {
        fn config(&self) -> &ConverterConfig {
            &self.config
        }

        fn validate(&self, _input: &ConverterInput) -> bool {
            self.valid
        }

        async fn convert(
            &self,
            input: ConverterInput,
            _name: &str,
            api_key: Option<&str>,
            options: &ConfigMap,
        ) -> Result<RawResult, Any2MdError> {
            let mut seen = self.seen.lock().unwrap();
            seen.options = Some(options.clone());
            seen.api_key = api_key.map(str::to_string);
            seen.input = Some(input);
            match &self.reply {
                Ok(body) => Ok(RawResult::from(body.clone())),
                Err(reason) => Err(Any2MdError::DownloadFailed {
                    url: "stub".into(),
                    reason: reason.to_string(),
                }),
            }
        }
    }

    fn fast_config() -> ConversionConfig {
        ConversionConfig::builder()
            .lookup_retry_delays_ms(vec![1, 1])
            .progress_interval_ms(0)
            .build()
            .unwrap()
    }

    fn orchestrator(builder: RegistryBuilder, config: ConversionConfig) -> Orchestrator {
        let handle = builder.build().unwrap();
        Orchestrator::new(Arc::new(ConverterRegistry::from_handle(handle)), config)
    }

    fn buffer(bytes: &[u8], name: &str) -> ConversionRequest {
        ConversionRequest::new(bytes.to_vec()).original_file_name(name)
    }

    #[tokio::test]
    async fn converts_buffer_with_name() {
        let o = orchestrator(
            RegistryBuilder::new().register(Stub::ok("text", &["txt"], "# Hello")),
            fast_config(),
        );
        let r = o.convert_file(&buffer(b"hello", "greeting.txt")).await;
        assert!(r.success, "{:?}", r.error);
        assert_eq!(r.content, "# Hello");
        assert_eq!((r.kind.as_str(), r.name.as_str(), r.category.as_str()), ("txt", "greeting.txt", "text"));
    }

    #[tokio::test]
    async fn buffer_without_name_fails_with_identity() {
        let o = orchestrator(
            RegistryBuilder::new().register(Stub::ok("text", &["txt"], "x")),
            fast_config(),
        );
        let r = o
            .convert_file(&ConversionRequest::new(b"hello".to_vec()).declared_type("txt"))
            .await;
        assert!(!r.success);
        assert_eq!(r.kind, "txt");
        assert_eq!(r.file_type, "txt");
        assert_eq!(r.name, UNKNOWN);
        assert_eq!(r.category, "text");
        assert!(r.error.unwrap().contains("originalFileName"));
        assert!(!r.content.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_type_is_a_failure_result() {
        let o = orchestrator(
            RegistryBuilder::new().register(Stub::ok("text", &["txt"], "x")),
            fast_config(),
        );
        let r = o.convert_file(&buffer(b"?", "mystery")).await;
        assert!(!r.success);
        assert_eq!(r.kind, UNKNOWN);
        assert_eq!(r.name, "mystery");
        assert!(r.error.unwrap().contains("Could not determine"));
    }

    struct AlwaysFails(Arc<AtomicUsize>);

    #[async_trait]
    impl RegistrySetup for AlwaysFails {
        async fn setup(&self) -> Result<RegistryHandle, Any2MdError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Any2MdError::RegistryInit("not unpacked yet".into()))
        }
    }

    #[tokio::test]
    async fn lookup_gives_up_after_three_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let o = Orchestrator::new(
            Arc::new(ConverterRegistry::new(AlwaysFails(Arc::clone(&calls)))),
            fast_config(),
        );
        let r = o.convert_file(&buffer(b"x", "a.txt")).await;
        assert!(!r.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(r.error.unwrap().contains("not unpacked yet"));
    }

    #[tokio::test]
    async fn missing_converter_reports_attempts() {
        let o = orchestrator(
            RegistryBuilder::new().register(Stub::ok("text", &["txt"], "x")),
            fast_config(),
        );
        let r = o.convert_file(&buffer(b"x", "deck.pptx")).await;
        assert!(!r.success);
        assert_eq!(r.kind, "pptx");
        assert_eq!(r.category, "document");
        assert!(r.error.unwrap().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn audio_requests_lose_document_credentials() {
        let stub = Stub::ok("audio", &["mp3"], "transcript");
        let seen = Arc::clone(&stub.seen);
        let o = orchestrator(RegistryBuilder::new().register(stub), fast_config());

        let request = buffer(b"ID3", "talk.mp3")
            .option("ocr_api_key", "secret-1")
            .option("document_api_key", "secret-2")
            .option("language", "en");
        assert!(o.convert_file(&request).await.success);

        let options = seen.lock().unwrap().options.clone().unwrap();
        assert!(!options.contains_key("ocr_api_key"));
        assert!(!options.contains_key("document_api_key"));
        assert_eq!(options["language"], "en");
    }

    #[tokio::test]
    async fn pdf_requests_get_ocr_settings() {
        let stub = Stub::ok("pdf", &["pdf"], "text");
        let seen = Arc::clone(&stub.seen);
        let config = ConversionConfig::builder()
            .use_ocr(true)
            .ocr_api_key("ocr-key")
            .api_key("default-key")
            .build()
            .unwrap();
        let o = orchestrator(RegistryBuilder::new().register(stub), config);
        assert!(o.convert_file(&buffer(b"%PDF-1.7", "a.pdf")).await.success);

        let seen = seen.lock().unwrap();
        let options = seen.options.clone().unwrap();
        assert_eq!(options["use_ocr"], true);
        assert_eq!(options["ocr_api_key"], "ocr-key");
        assert_eq!(seen.api_key.as_deref(), Some("default-key"));
    }

    #[tokio::test]
    async fn request_api_key_beats_config() {
        let stub = Stub::ok("text", &["txt"], "x");
        let seen = Arc::clone(&stub.seen);
        let config = ConversionConfig::builder().api_key("default").build().unwrap();
        let o = orchestrator(RegistryBuilder::new().register(stub), config);
        o.convert_file(&buffer(b"x", "a.txt").api_key("mine")).await;
        assert_eq!(seen.lock().unwrap().api_key.as_deref(), Some("mine"));
    }

    #[tokio::test]
    async fn failing_web_converter_falls_back_once() {
        let fallback = Stub::ok("page", &[], "# From fallback");
        let fallback_seen = Arc::clone(&fallback.seen);
        let o = orchestrator(
            RegistryBuilder::new()
                .register(Stub::ok("text", &["txt"], "x"))
                .register(Stub::failing("browser", &["url"], "navigation timeout"))
                .web_fallback(fallback),
            fast_config(),
        );

        let request = ConversionRequest::new(crate::pipeline::input::ConversionInput::Url(
            "https://example.com/docs/".into(),
        ))
        .declared_type("url");
        let r = o.convert_file(&request).await;
        assert!(r.success, "{:?}", r.error);
        assert_eq!(r.content, "# From fallback");
        assert_eq!(r.name, "example.com/docs");
        assert_eq!(r.category, "web");
        assert_eq!(
            fallback_seen.lock().unwrap().input,
            Some(ConverterInput::Url("https://example.com/docs/".into()))
        );
    }

    #[tokio::test]
    async fn web_token_without_converter_is_synthesized() {
        let o = orchestrator(
            RegistryBuilder::new()
                .register(Stub::ok("text", &["txt"], "x"))
                .web_fallback(Stub::ok("page", &[], "# Crawled")),
            fast_config(),
        );
        let request = ConversionRequest::new(crate::pipeline::input::ConversionInput::Url("https://x.org".into()))
            .declared_type("parenturl");
        let r = o.convert_file(&request).await;
        assert!(r.success);
        assert_eq!(r.kind, "parenturl");
        assert_eq!(r.content, "# Crawled");
    }

    #[tokio::test]
    async fn converter_errors_are_type_prefixed() {
        let o = orchestrator(
            RegistryBuilder::new().register(Stub::failing("csv", &["csv"], "bad quote")),
            fast_config(),
        );
        let r = o.convert_file(&buffer(b"a,b", "d.csv")).await;
        assert!(!r.success);
        assert!(r.error.unwrap().starts_with("CSV conversion failed:"));
    }

    #[tokio::test]
    async fn guards_run_before_convert() {
        let mut invalid = Stub::ok("text", &["txt"], "x");
        invalid.valid = false;
        let o = orchestrator(RegistryBuilder::new().register(invalid), fast_config());
        let r = o.convert_file(&buffer(b"x", "a.txt")).await;
        assert!(r.error.unwrap().contains("Invalid txt content"));

        let mut small = Stub::ok("text", &["txt"], "x");
        small.config = small.config.max_size(2);
        let seen = Arc::clone(&small.seen);
        let o = orchestrator(RegistryBuilder::new().register(small), fast_config());
        let r = o.convert_file(&buffer(b"toolong", "a.txt")).await;
        assert!(r.error.unwrap().contains("at most 2 bytes"));
        assert!(seen.lock().unwrap().input.is_none());
    }

    #[tokio::test]
    async fn declared_mime_type_resolves_through_registry() {
        let mut stub = Stub::ok("custom", &["cst"], "custom");
        stub.config = stub.config.mime_types(&["application/x-custom"]);
        let o = orchestrator(RegistryBuilder::new().register(stub), fast_config());
        let request = ConversionRequest::new(b"x".to_vec())
            .declared_type("application/x-custom")
            .original_file_name("upload");
        let r = o.convert_file(&request).await;
        assert!(r.success, "{:?}", r.error);
        assert_eq!(r.kind, "cst");
    }

    #[tokio::test]
    async fn reads_path_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("notes.txt");
        std::fs::write(&path, "from disk").unwrap();

        let stub = Stub::ok("text", &["txt"], "ok");
        let seen = Arc::clone(&stub.seen);
        let o = orchestrator(RegistryBuilder::new().register(stub), fast_config());
        let r = o.convert_file(&ConversionRequest::new(path)).await;
        assert!(r.success);
        assert_eq!(r.name, "notes.txt");
        assert_eq!(
            seen.lock().unwrap().input,
            Some(ConverterInput::Bytes(b"from disk".to_vec()))
        );
    }

    struct Checkpoints(Mutex<Vec<(f64, String)>>);

    impl ConversionProgressCallback for Checkpoints {
        fn on_progress(&self, percent: f64, detail: Option<&ProgressDetail>) {
            let status = detail.map(|d| d.status.clone()).unwrap_or_default();
            self.0.lock().unwrap().push((percent, status));
        }
    }

    #[tokio::test]
    async fn reports_progress_checkpoints() {
        let sink = Arc::new(Checkpoints(Mutex::new(Vec::new())));
        let config = ConversionConfig::builder()
            .progress_interval_ms(0)
            .progress_callback(sink.clone())
            .build()
            .unwrap();
        let o = orchestrator(RegistryBuilder::new().register(Stub::ok("text", &["txt"], "x")), config);
        o.convert_file(&buffer(b"x", "a.txt")).await;

        let seen = sink.0.lock().unwrap().clone();
        let percents: Vec<f64> = seen.iter().map(|(p, _)| *p).collect();
        assert_eq!(percents, vec![5.0, 20.0, 95.0, 100.0]);
        assert_eq!(seen[3].1, "done");
    }

    #[tokio::test]
    async fn convert_and_save_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(
            RegistryBuilder::new().register(Stub::ok("text", &["txt"], "# Saved\n\nBody")),
            fast_config(),
        );
        let out = o
            .convert_and_save(&buffer(b"x", "memo.txt"), dir.path(), SaveOptions::direct())
            .await
            .unwrap();
        assert_eq!(out.main_file, dir.path().join("memo.md"));
        let doc = std::fs::read_to_string(&out.main_file).unwrap();
        assert!(doc.contains("title: memo\n"));
        assert!(doc.contains("converter: edgequake-any2md\n"));
        assert!(doc.ends_with("# Saved\n\nBody\n"));
    }

    #[tokio::test]
    async fn convert_and_save_surfaces_failures() {
        let dir = tempfile::tempdir().unwrap();
        let o = orchestrator(
            RegistryBuilder::new().register(Stub::failing("csv", &["csv"], "bad")),
            fast_config(),
        );
        let err = o
            .convert_and_save(&buffer(b"x", "d.csv"), dir.path(), SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Any2MdError::ConversionFailed { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn convert_and_save_reports_failed_progress() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Checkpoints(Mutex::new(Vec::new())));
        let config = ConversionConfig::builder()
            .lookup_retry_delays_ms(vec![1, 1])
            .progress_interval_ms(0)
            .progress_callback(sink.clone())
            .build()
            .unwrap();
        let o = orchestrator(
            RegistryBuilder::new()
                .register(Stub::failing("csv", &["csv"], "bad"))
                .register(Stub::ok("text", &["txt"], "x")),
            config,
        );

        // Converter failure, unknown type, then a persistence failure.
        assert!(o
            .convert_and_save(&buffer(b"x", "d.csv"), dir.path(), SaveOptions::default())
            .await
            .is_err());
        assert!(o
            .convert_and_save(&buffer(b"x", "d.xyz"), dir.path(), SaveOptions::default())
            .await
            .is_err());
        assert!(o
            .convert_and_save(&buffer(b"x", "a.txt"), "", SaveOptions::default())
            .await
            .is_err());

        let seen = sink.0.lock().unwrap().clone();
        let finals: Vec<&(f64, String)> = seen.iter().filter(|(p, _)| *p >= 100.0).collect();
        assert_eq!(finals.len(), 3, "{seen:?}");
        assert!(finals.iter().all(|(_, status)| status == "failed"), "{seen:?}");
        assert_eq!(seen.last().unwrap(), &(100.0, "failed".to_string()));
    }
}
