//! Standalone images: the file is embedded as-is and described by its
//! dimensions and format.

use super::file_stem;
use crate::error::Any2MdError;
use crate::output::{ConfigMap, ImageRef, RawResult};
use crate::registry::{Converter, ConverterConfig, ConverterInput};
use async_trait::async_trait;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

const MAX_SIZE: usize = 50 * 1024 * 1024;

pub struct ImageConverter {
    config: ConverterConfig,
}

impl ImageConverter {
    pub fn new() -> Self {
        Self {
            config: ConverterConfig::new("image")
                .extensions(&["png", "jpg", "jpeg", "gif", "webp"])
                .mime_types(&["image/png", "image/jpeg", "image/gif", "image/webp"])
                .max_size(MAX_SIZE),
        }
    }
}

impl Default for ImageConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for ImageConverter {
    fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn validate(&self, input: &ConverterInput) -> bool {
        input
            .as_bytes()
            .is_some_and(|b| ::image::guess_format(b).is_ok())
    }

    async fn convert(
        &self,
        input: ConverterInput,
        name: &str,
        _api_key: Option<&str>,
        _options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        let ConverterInput::Bytes(bytes) = input else {
            return Err(Any2MdError::conversion_failed("image", "expected file contents, got a URL"));
        };

        let reader = ::image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| Any2MdError::conversion_failed("image", e))?;
        let format = reader
            .format()
            .map(|f| format!("{f:?}").to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| Any2MdError::conversion_failed("image", e))?;
        debug!("{}: {}x{} {}", name, width, height, format);

        let stem = file_stem(name);
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{stem}.{format}"));
        let path = format!("images/{file_name}");

        Ok(RawResult::markdown(format!("# {stem}\n\n![{stem}]({path})\n"))
            .with_metadata("width", width)
            .with_metadata("height", height)
            .with_metadata("format", format)
            .with_image(ImageRef::new(path, bytes)))
    }
}
