//! Plain text and Markdown passthrough.
//!
//! Markdown frontmatter is kept in the body; the persistence stage
//! extracts and merges it.

use super::{decode_text, looks_like_text};
use crate::error::Any2MdError;
use crate::output::{ConfigMap, RawResult};
use crate::registry::{Converter, ConverterConfig, ConverterInput};
use async_trait::async_trait;

const MAX_SIZE: usize = 50 * 1024 * 1024;

pub struct TextConverter {
    config: ConverterConfig,
}

impl TextConverter {
    pub fn new() -> Self {
        Self {
            config: ConverterConfig::new("text")
                .extensions(&["txt", "text", "md", "markdown"])
                .mime_types(&["text/plain", "text/markdown"])
                .max_size(MAX_SIZE),
        }
    }
}

impl Default for TextConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for TextConverter {
    fn config(&self) -> &ConverterConfig {
        &self.config
    }

    fn validate(&self, input: &ConverterInput) -> bool {
        looks_like_text(input)
    }

    async fn convert(
        &self,
        input: ConverterInput,
        _name: &str,
        _api_key: Option<&str>,
        _options: &ConfigMap,
    ) -> Result<RawResult, Any2MdError> {
        let text = decode_text(&input, "text")?;
        let lines = text.lines().count();
        let words = text.split_whitespace().count();
        Ok(RawResult::markdown(text)
            .with_metadata("lines", lines)
            .with_metadata("words", words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_text_through() {
        let c = TextConverter::new();
        let input = ConverterInput::Bytes(b"---\ntitle: A\n---\n\nhello world\n".to_vec());
        assert!(c.validate(&input));
        let raw = c.convert(input, "a.md", None, &ConfigMap::new()).await.unwrap();
        assert_eq!(raw.body["content"], "---\ntitle: A\n---\n\nhello world\n");
        assert_eq!(raw.body["metadata"]["words"], 6);
    }

    #[test]
    fn rejects_binary() {
        assert!(!TextConverter::new().validate(&ConverterInput::Bytes(vec![0, 159, 146, 150])));
    }
}
