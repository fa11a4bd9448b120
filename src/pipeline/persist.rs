//! Result persistence: write a converted document, its images and any extra
//! files to disk.
//!
//! ## On-disk layout
//!
//! ```text
//! <output_dir>/
//!   <name>_<epoch-ms>/        # or output_dir itself in direct mode
//!     document.md             # or <name>.md in direct mode
//!     images/...              # only if images were extracted
//!     pages/...               # only in multi-file mode
//! ```
//!
//! Missing `content`, `name` or `type`, an empty output directory, and an
//! uncreatable base directory are fatal. A single image or extra file that
//! cannot be written is logged, recorded in
//! [`PersistedOutput::skipped`], and the save carries on.

use crate::config::{ImageLayout, SaveOptions};
use crate::error::{Any2MdError, ItemError};
use crate::fs::{FileSystem, TokioFs};
use crate::output::{CanonicalResult, ConfigMap, ImageRef, OutputFile, PersistedOutput};
use crate::pipeline::encode::decode_image_data;
use crate::pipeline::frontmatter::{build_document, extract_frontmatter, has_frontmatter, merge_metadata};
use crate::pipeline::postprocess::{
    rewrite_image_references, strip_extracted_images_heading, tidy_markdown, ImageIndex,
};
use crate::pipeline::resolve::is_web_token;
use crate::progress::{ProgressDetail, ProgressTracker};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Main file name when a per-conversion subdirectory is created.
pub const MAIN_FILE_NAME: &str = "document.md";

/// Everything needed to persist one conversion.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub content: String,
    /// Caller metadata merged into the frontmatter.
    pub metadata: ConfigMap,
    pub images: Vec<ImageRef>,
    pub files: Vec<OutputFile>,
    pub name: String,
    /// Type token, written as the frontmatter `type`.
    pub kind: String,
    pub output_dir: PathBuf,
    pub options: SaveOptions,
}

impl SaveRequest {
    pub fn new(
        content: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            content: content.into(),
            metadata: ConfigMap::new(),
            images: Vec::new(),
            files: Vec::new(),
            name: name.into(),
            kind: kind.into(),
            output_dir: output_dir.into(),
            options: SaveOptions::default(),
        }
    }

    /// Build a save request from a normalized conversion result.
    ///
    /// The frontmatter gets the result's metadata plus `title` (the file
    /// stem, unless the converter set one), `source` and `category`.
    pub fn from_result(
        result: &CanonicalResult,
        output_dir: impl Into<PathBuf>,
        options: SaveOptions,
    ) -> Self {
        let mut metadata = ConfigMap::new();
        if !result.metadata.contains_key("title") {
            metadata.insert("title".into(), Value::String(title_for(&result.name, &result.kind)));
        }
        metadata.extend(result.metadata.clone());
        metadata.insert("source".into(), Value::String(result.name.clone()));
        metadata.insert("category".into(), Value::String(result.category.clone()));

        Self {
            content: result.content.clone(),
            metadata,
            images: result.images.clone(),
            files: result.files.clone(),
            name: result.name.clone(),
            kind: result.kind.clone(),
            output_dir: output_dir.into(),
            options,
        }
    }

    pub fn metadata(mut self, metadata: ConfigMap) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }

    pub fn files(mut self, files: Vec<OutputFile>) -> Self {
        self.files = files;
        self
    }

    pub fn options(mut self, options: SaveOptions) -> Self {
        self.options = options;
        self
    }
}

/// Persist a conversion result on the real file system.
pub async fn save_conversion_result(request: SaveRequest) -> Result<PersistedOutput, Any2MdError> {
    save_with(&TokioFs, request, None).await
}

/// Persist a conversion result through `fs`, reporting image writes into
/// the 95–99 % band of `progress`.
pub async fn save_with(
    fs: &dyn FileSystem,
    request: SaveRequest,
    progress: Option<&ProgressTracker>,
) -> Result<PersistedOutput, Any2MdError> {
    // ── Step 0: Required fields ──────────────────────────────────────────
    if request.content.trim().is_empty() {
        return Err(Any2MdError::MissingField("content"));
    }
    if request.name.trim().is_empty() {
        return Err(Any2MdError::MissingField("name"));
    }
    if request.kind.trim().is_empty() {
        return Err(Any2MdError::MissingField("type"));
    }
    if request.output_dir.as_os_str().is_empty() {
        return Err(Any2MdError::MissingField("output_dir"));
    }

    // ── Step 1: Base path ────────────────────────────────────────────────
    let base_name = sanitize_base_name(&request.name, &request.kind);
    let output_path = if request.options.create_subdirectory {
        request
            .output_dir
            .join(format!("{}_{}", base_name, Utc::now().timestamp_millis()))
    } else {
        request.output_dir.clone()
    };

    // ── Step 2: Create it ────────────────────────────────────────────────
    fs.create_dir_all(&output_path)
        .await
        .map_err(|source| Any2MdError::OutputDirFailed {
            path: output_path.clone(),
            source,
        })?;
    debug!("Output directory ready: {}", output_path.display());

    // ── Step 3: Images ───────────────────────────────────────────────────
    let (index, mut skipped) = write_images(
        fs,
        &output_path,
        &request.images,
        &request.options.image_layout,
        progress,
    )
    .await;

    // ── Step 4: Body cleanup and reference rewrite ───────────────────────
    let extracted = extract_frontmatter(&request.content);
    let body = tidy_markdown(&extracted.content);
    let body = rewrite_image_references(&body, &index);
    let body = strip_extracted_images_heading(&body);

    // ── Step 5: Main file name ───────────────────────────────────────────
    let main_file = if request.options.create_subdirectory {
        output_path.join(MAIN_FILE_NAME)
    } else {
        output_path.join(format!("{base_name}.md"))
    };

    // ── Step 6: Frontmatter ──────────────────────────────────────────────
    let converted = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let metadata = merge_metadata(extracted.metadata, &request.metadata, &request.kind, &converted);
    let document = build_document(&metadata, &body);

    // ── Step 7: Main file ────────────────────────────────────────────────
    fs.write(&main_file, document.as_bytes())
        .await
        .map_err(|source| Any2MdError::OutputWriteFailed {
            path: main_file.clone(),
            source,
        })?;

    // ── Step 8: Extra files ──────────────────────────────────────────────
    if !request.files.is_empty() {
        skipped.extend(
            write_extra_files(fs, &output_path, &request.files, &index, &request.kind, &converted).await,
        );
    }

    info!(
        "Saved {} → {} ({} images, {} extra files, {} skipped)",
        request.name,
        main_file.display(),
        request.images.len(),
        request.files.len(),
        skipped.len()
    );

    Ok(PersistedOutput {
        success: true,
        output_path,
        main_file,
        metadata,
        skipped,
    })
}

/// Write every image, grouped by target directory. Returns the index of
/// images that made it to disk plus the ones that did not.
async fn write_images(
    fs: &dyn FileSystem,
    base: &Path,
    images: &[ImageRef],
    layout: &ImageLayout,
    progress: Option<&ProgressTracker>,
) -> (ImageIndex, Vec<ItemError>) {
    let mut index = ImageIndex::new();
    let mut skipped = Vec::new();
    if images.is_empty() {
        return (index, skipped);
    }

    let mut groups: BTreeMap<PathBuf, Vec<(&ImageRef, PathBuf)>> = BTreeMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    for image in images {
        let target = match layout {
            ImageLayout::Declared => image.path.clone(),
            ImageLayout::Shared(dir) => {
                shared_target(dir.trim_end_matches(['/', '\\']), file_name_of(&image.path), &mut taken)
            }
        };
        match safe_relative(&target) {
            Some(rel) => {
                let parent = rel.parent().map(Path::to_path_buf).unwrap_or_default();
                groups.entry(parent).or_default().push((image, rel));
            }
            None => {
                warn!("Skipping image with unsafe path '{}'", target);
                skipped.push(ItemError::UnsafePath { path: target });
            }
        }
    }

    let total = images.len();
    let mut done = skipped.len();
    let detail = ProgressDetail::status("saving").with_message("Writing images");

    for (dir, members) in groups {
        if !dir.as_os_str().is_empty() {
            if let Err(e) = fs.create_dir_all(&base.join(&dir)).await {
                warn!("Cannot create image directory '{}': {}", dir.display(), e);
                for (_, rel) in &members {
                    skipped.push(ItemError::ImageWriteFailed {
                        path: slash_path(rel),
                        detail: e.to_string(),
                    });
                }
                done += members.len();
                continue;
            }
        }

        for (image, rel) in members {
            let rel_str = slash_path(&rel);
            match decode_image_data(&image.data) {
                Ok(bytes) => match fs.write(&base.join(&rel), &bytes).await {
                    Ok(()) => {
                        debug!("Wrote image {} ({} bytes)", rel_str, bytes.len());
                        index.insert(&image.path, image.src.as_deref(), &rel_str);
                    }
                    Err(e) => {
                        warn!("Failed to write image '{}': {}", rel_str, e);
                        skipped.push(ItemError::ImageWriteFailed {
                            path: rel_str,
                            detail: e.to_string(),
                        });
                    }
                },
                Err(e) => {
                    warn!("Failed to decode image '{}': {}", rel_str, e);
                    skipped.push(ItemError::ImageDecodeFailed {
                        path: rel_str,
                        detail: e.to_string(),
                    });
                }
            }
            done += 1;
            if let Some(p) = progress {
                p.update_scaled(done as f64 / total as f64 * 100.0, 95.0, 99.0, Some(&detail));
            }
        }
    }

    (index, skipped)
}

/// Flattened target inside a shared image directory. Repeated file names
/// get `-2`, `-3`, ... before their extension.
fn shared_target(dir: &str, file_name: &str, taken: &mut HashSet<String>) -> String {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    let mut candidate = file_name.to_string();
    let mut n = 2;
    while !taken.insert(candidate.to_lowercase()) {
        candidate = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        n += 1;
    }
    format!("{dir}/{candidate}")
}

/// Write multi-file outputs, adding frontmatter where missing. Image links
/// in their bodies are rewritten against `index` like the main document's.
async fn write_extra_files(
    fs: &dyn FileSystem,
    base: &Path,
    files: &[OutputFile],
    index: &ImageIndex,
    kind: &str,
    converted: &str,
) -> Vec<ItemError> {
    let mut skipped = Vec::new();
    for file in files {
        let Some(rel) = safe_relative(&file.path) else {
            warn!("Skipping extra file with unsafe path '{}'", file.path);
            skipped.push(ItemError::UnsafePath {
                path: file.path.clone(),
            });
            continue;
        };
        let target = base.join(&rel);

        let document = if has_frontmatter(&file.content) {
            // Keep the block as written; only the body after it is rewritten.
            let body = extract_frontmatter(&file.content).content;
            let (front, rest) = file.content.split_at(file.content.len() - body.len());
            format!("{front}{}", strip_extracted_images_heading(&rewrite_image_references(rest, index)))
        } else {
            let mut title = ConfigMap::new();
            let stem = strip_short_extension(file_name_of(&file.path));
            title.insert("title".into(), Value::String(stem.to_string()));
            let metadata = merge_metadata(title, &file.metadata, kind, converted);
            let body = rewrite_image_references(&tidy_markdown(&file.content), index);
            build_document(&metadata, &strip_extracted_images_heading(&body))
        };

        let result = match target.parent() {
            Some(parent) => fs.create_dir_all(parent).await,
            None => Ok(()),
        };
        let result = match result {
            Ok(()) => fs.write(&target, document.as_bytes()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to write extra file '{}': {}", file.path, e);
            skipped.push(ItemError::FileWriteFailed {
                path: file.path.clone(),
                detail: e.to_string(),
            });
        }
    }
    skipped
}

/// File-system safe base name for the output directory or main file.
///
/// Characters invalid in paths (and `/`) become `_`. A short alphanumeric
/// extension is dropped, except for web inputs whose names are `host/path`.
pub fn sanitize_base_name(name: &str, kind: &str) -> String {
    let stem = if is_web_token(kind) {
        name
    } else {
        strip_short_extension(name)
    };
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

fn strip_short_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => name,
    }
}

fn title_for(name: &str, kind: &str) -> String {
    if is_web_token(kind) {
        name.to_string()
    } else {
        strip_short_extension(file_name_of(name)).to_string()
    }
}

fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// A relative path with no root, prefix or `..` component.
fn safe_relative(path: &str) -> Option<PathBuf> {
    let normalised = path.trim().replace('\\', "/");
    if normalised.is_empty() || normalised.starts_with('/') {
        return None;
    }
    let mut out = PathBuf::new();
    for component in Path::new(&normalised).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ImageData;
    use async_trait::async_trait;
    use serde_json::json;
    use std::io;

    const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    /// Delegates to the real file system, failing writes or directory
    /// creation for paths that contain `fail_on`.
    struct FlakyFs {
        fail_on: &'static str,
        fail_dirs: bool,
    }

    #[async_trait]
    impl FileSystem for FlakyFs {
        async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            if self.fail_dirs && path.to_string_lossy().contains(self.fail_on) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            TokioFs.create_dir_all(path).await
        }

        async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
            if !self.fail_dirs && path.to_string_lossy().contains(self.fail_on) {
                return Err(io::Error::other("disk full"));
            }
            TokioFs.write(path, data).await
        }
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn subdirectory_layout_and_link_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let request = SaveRequest::new(
            "![alt](images/foo.png)\n\n![remote](https://x/y.png)\n",
            "Report.pdf",
            "pdf",
            dir.path(),
        )
        .images(vec![ImageRef::new("images/foo.png", PNG_BYTES.to_vec())]);

        let out = save_conversion_result(request).await.unwrap();
        assert!(out.success);
        assert_eq!(out.main_file.file_name().unwrap(), MAIN_FILE_NAME);
        let sub = out.output_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(sub.starts_with("Report_"), "got {sub}");

        let doc = read(&out.main_file);
        assert!(doc.starts_with("---\n"));
        assert!(doc.contains("![[images/foo.png]]"));
        assert!(!doc.contains("![alt](images/foo.png)"));
        assert!(doc.contains("![remote](https://x/y.png)"));
        assert_eq!(std::fs::read(out.output_path.join("images/foo.png")).unwrap(), PNG_BYTES);
    }

    #[tokio::test]
    async fn direct_mode_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let request = SaveRequest::new("# Hi", "notes.txt", "txt", dir.path()).options(SaveOptions::direct());
        let out = save_conversion_result(request).await.unwrap();
        assert_eq!(out.output_path, dir.path());
        assert_eq!(out.main_file, dir.path().join("notes.md"));
        let doc = read(&out.main_file);
        assert!(doc.contains("type: txt\n"));
        assert!(doc.ends_with("---\n\n# Hi\n"));
    }

    #[tokio::test]
    async fn existing_frontmatter_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let content = "---\ntitle: A\nconverted: 1999-01-01\n---\n\nBody\n";
        let mut meta = ConfigMap::new();
        meta.insert("type".into(), json!("pdf"));
        let request = SaveRequest::new(content, "a.md", "pdf", dir.path())
            .metadata(meta)
            .options(SaveOptions::direct());

        let out = save_conversion_result(request).await.unwrap();
        let doc = read(&out.main_file);
        assert!(doc.contains("title: A\n"));
        assert!(doc.contains("type: pdf\n"));
        assert!(!doc.contains("1999-01-01"));
        assert_eq!(doc.matches("---\n").count(), 2);
        assert!(doc.ends_with("\nBody\n"));
        assert_ne!(out.metadata["converted"], "1999-01-01");
    }

    #[tokio::test]
    async fn one_failed_image_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FlakyFs {
            fail_on: "bad.png",
            fail_dirs: false,
        };
        let request = SaveRequest::new("![a](images/good.png) ![b](images/bad.png)", "d.pdf", "pdf", dir.path())
            .images(vec![
                ImageRef::new("images/good.png", PNG_BYTES.to_vec()),
                ImageRef::new("images/bad.png", PNG_BYTES.to_vec()),
            ]);

        let out = save_with(&fs, request, None).await.unwrap();
        assert!(out.success);
        assert_eq!(out.skipped.len(), 1);
        assert!(matches!(&out.skipped[0], ItemError::ImageWriteFailed { path, .. } if path == "images/bad.png"));

        let doc = read(&out.main_file);
        assert!(doc.contains("![[images/good.png]]"));
        assert!(doc.contains("![b](images/bad.png)"));
    }

    #[tokio::test]
    async fn undecodable_and_unsafe_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let request = SaveRequest::new("x", "d.html", "html", dir.path())
            .options(SaveOptions::direct())
            .images(vec![
                ImageRef::new("images/a.png", ImageData::Encoded("!!!".into())),
                ImageRef::new("../escape.png", PNG_BYTES.to_vec()),
            ]);
        let out = save_conversion_result(request).await.unwrap();
        assert_eq!(out.skipped.len(), 2);
        assert!(out.skipped.iter().any(|e| matches!(e, ItemError::ImageDecodeFailed { .. })));
        assert!(out.skipped.iter().any(|e| matches!(e, ItemError::UnsafePath { .. })));
        assert!(!dir.path().parent().unwrap().join("escape.png").exists());
    }

    #[tokio::test]
    async fn shared_image_layout_flattens() {
        let dir = tempfile::tempdir().unwrap();
        let request = SaveRequest::new("![a](figs/deep/a.png)", "d.pdf", "pdf", dir.path())
            .options(SaveOptions::direct().with_image_layout(ImageLayout::Shared("assets".into())))
            .images(vec![ImageRef::new("figs/deep/a.png", PNG_BYTES.to_vec())]);
        let out = save_conversion_result(request).await.unwrap();
        assert!(dir.path().join("assets/a.png").exists());
        assert!(read(&out.main_file).contains("![[assets/a.png]]"));
    }

    #[tokio::test]
    async fn shared_layout_keeps_colliding_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let other = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        let request = SaveRequest::new("![a](a/fig.png)\n\n![b](b/fig.png)", "d.pdf", "pdf", dir.path())
            .options(SaveOptions::direct().with_image_layout(ImageLayout::Shared("assets".into())))
            .images(vec![
                ImageRef::new("a/fig.png", PNG_BYTES.to_vec()),
                ImageRef::new("b/fig.png", other.to_vec()),
            ]);

        let out = save_conversion_result(request).await.unwrap();
        assert!(out.skipped.is_empty());
        assert_eq!(std::fs::read(dir.path().join("assets/fig.png")).unwrap(), PNG_BYTES);
        assert_eq!(std::fs::read(dir.path().join("assets/fig-2.png")).unwrap(), other);
        let doc = read(&out.main_file);
        assert!(doc.contains("![[assets/fig.png]]"), "{doc}");
        assert!(doc.contains("![[assets/fig-2.png]]"), "{doc}");
    }

    #[test]
    fn shared_targets_are_suffixed_in_order() {
        let mut taken = HashSet::new();
        assert_eq!(shared_target("img", "fig.png", &mut taken), "img/fig.png");
        assert_eq!(shared_target("img", "fig.png", &mut taken), "img/fig-2.png");
        assert_eq!(shared_target("img", "fig.png", &mut taken), "img/fig-3.png");
        assert_eq!(shared_target("img", "plain", &mut taken), "img/plain");
        assert_eq!(shared_target("img", "plain", &mut taken), "img/plain-2");
    }

    #[tokio::test]
    async fn extra_file_image_links_are_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let request = SaveRequest::new("# Index", "x.org/docs", "parenturl", dir.path())
            .options(SaveOptions::direct())
            .images(vec![ImageRef::new("images/chart.png", PNG_BYTES.to_vec())])
            .files(vec![
                OutputFile::new("pages/intro.md", "# Intro\n\n![chart](../images/chart.png)\n"),
                OutputFile::new(
                    "pages/kept.md",
                    "---\ntitle: Kept\n---\n\n![c](images/chart.png)\n\n## Extracted Images\n",
                ),
            ]);

        let out = save_conversion_result(request).await.unwrap();
        assert!(out.skipped.is_empty());
        let intro = read(&dir.path().join("pages/intro.md"));
        assert!(intro.contains("![[images/chart.png]]"), "{intro}");
        assert!(!intro.contains("](../images"));

        let kept = read(&dir.path().join("pages/kept.md"));
        assert!(kept.starts_with("---\ntitle: Kept\n---\n\n![[images/chart.png]]"), "{kept}");
        assert!(!kept.contains("Extracted Images"));
    }

    #[tokio::test]
    async fn extra_files_get_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let mut page = OutputFile::new("pages/intro.md", "# Intro\n");
        page.metadata.insert("source_url".into(), json!("https://x.org/docs/intro"));
        let request = SaveRequest::new("# Index", "x.org/docs", "parenturl", dir.path())
            .options(SaveOptions::direct())
            .files(vec![
                page,
                OutputFile::new("pages/kept.md", "---\ntitle: Kept\n---\n\nBody\n"),
                OutputFile::new("/abs.md", "nope"),
            ]);

        let out = save_conversion_result(request).await.unwrap();
        assert_eq!(out.main_file, dir.path().join("x.org_docs.md"));
        let intro = read(&dir.path().join("pages/intro.md"));
        assert!(intro.contains("title: intro\n"));
        assert!(intro.contains("type: parenturl\n"));
        assert!(intro.contains("source_url: https://x.org/docs/intro\n"));
        assert_eq!(read(&dir.path().join("pages/kept.md")), "---\ntitle: Kept\n---\n\nBody\n");
        assert_eq!(out.skipped.len(), 1);
    }

    #[tokio::test]
    async fn missing_fields_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            (SaveRequest::new("  ", "a.pdf", "pdf", dir.path()), "content"),
            (SaveRequest::new("x", "", "pdf", dir.path()), "name"),
            (SaveRequest::new("x", "a.pdf", "", dir.path()), "type"),
            (SaveRequest::new("x", "a.pdf", "pdf", ""), "output_dir"),
        ];
        for (request, field) in cases {
            match save_conversion_result(request).await {
                Err(Any2MdError::MissingField(f)) => assert_eq!(f, field),
                other => panic!("expected MissingField({field}), got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn uncreatable_base_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FlakyFs {
            fail_on: "locked",
            fail_dirs: true,
        };
        let request = SaveRequest::new("x", "a.pdf", "pdf", dir.path().join("locked"));
        let err = save_with(&fs, request, None).await.unwrap_err();
        assert!(matches!(err, Any2MdError::OutputDirFailed { .. }));
    }

    #[test]
    fn base_names() {
        assert_eq!(sanitize_base_name("Report.PDF", "pdf"), "Report");
        assert_eq!(sanitize_base_name("a:b|c?.csv", "csv"), "a_b_c_");
        assert_eq!(sanitize_base_name("archive.tar.gz", "gz"), "archive.tar");
        assert_eq!(sanitize_base_name("example.com/docs", "url"), "example.com_docs");
        assert_eq!(sanitize_base_name("notes.final version", "txt"), "notes.final version");
        assert_eq!(sanitize_base_name("...", "txt"), "document");
    }

    #[test]
    fn safe_paths() {
        assert_eq!(safe_relative("./images/a.png"), Some(PathBuf::from("images/a.png")));
        assert_eq!(safe_relative("images\\b.png"), Some(PathBuf::from("images/b.png")));
        assert_eq!(safe_relative("../a.png"), None);
        assert_eq!(safe_relative("/etc/passwd"), None);
        assert_eq!(safe_relative(""), None);
    }

    #[test]
    fn from_result_carries_identity() {
        let mut result = CanonicalResult::failure("csv", "data.csv", "data", "x");
        result.success = true;
        result.metadata.insert("rows".into(), json!(3));
        let req = SaveRequest::from_result(&result, "/tmp/out", SaveOptions::default());
        assert_eq!(req.kind, "csv");
        assert_eq!(req.metadata["title"], "data");
        assert_eq!(req.metadata["rows"], 3);
        assert_eq!(req.metadata["source"], "data.csv");
        assert_eq!(req.metadata["category"], "data");
    }
}
