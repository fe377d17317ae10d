//! Output format conversion.
//!
//! Templates always render to HTML. Other formats go through a registered
//! [`FormatConverter`]; HTML itself is passed through unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::types::RenderOptions;
use crate::error::{CollaboratorError, TemplateError};
use crate::types::ReportFormat;

/// Converts rendered HTML into another format (HTML→PDF, DOCX, PPTX).
#[async_trait]
pub trait FormatConverter: Send + Sync {
    fn format(&self) -> ReportFormat;

    async fn convert(&self, html: &str, options: &RenderOptions)
        -> Result<Vec<u8>, CollaboratorError>;
}

/// Converters by target format.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<ReportFormat, Arc<dyn FormatConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `converter` for its format, replacing any previous one.
    pub fn register(&mut self, converter: Arc<dyn FormatConverter>) {
        self.converters.insert(converter.format(), converter);
    }

    /// Formats this registry can produce, HTML included.
    pub fn supported_formats(&self) -> Vec<ReportFormat> {
        let mut formats: Vec<ReportFormat> = ReportFormat::ALL
            .into_iter()
            .filter(|f| *f == ReportFormat::Html || self.converters.contains_key(f))
            .collect();
        formats.sort();
        formats
    }

    pub fn supports(&self, format: ReportFormat) -> bool {
        format == ReportFormat::Html || self.converters.contains_key(&format)
    }

    /// Produces the bytes of `html` in `format`.
    pub async fn convert(
        &self,
        html: String,
        format: ReportFormat,
        options: &RenderOptions,
    ) -> Result<Vec<u8>, TemplateError> {
        if format == ReportFormat::Html {
            return Ok(html.into_bytes());
        }
        let converter = self
            .converters
            .get(&format)
            .ok_or_else(|| TemplateError::UnsupportedFormat(format.to_string()))?;
        let bytes = converter
            .convert(&html, options)
            .await
            .map_err(|e| TemplateError::ConversionFailed {
                format: format.to_string(),
                message: e.to_string(),
            })?;
        if bytes.is_empty() {
            return Err(TemplateError::ConversionFailed {
                format: format.to_string(),
                message: "converter produced no output".to_string(),
            });
        }
        Ok(bytes)
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("formats", &self.supported_formats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePdf;

    #[async_trait]
    impl FormatConverter for FakePdf {
        fn format(&self) -> ReportFormat {
            ReportFormat::Pdf
        }

        async fn convert(
            &self,
            html: &str,
            _options: &RenderOptions,
        ) -> Result<Vec<u8>, CollaboratorError> {
            let mut bytes = b"%PDF-1.7\n".to_vec();
            bytes.extend_from_slice(html.as_bytes());
            Ok(bytes)
        }
    }

    #[tokio::test]
    async fn test_html_passthrough() {
        let registry = ConverterRegistry::new();
        let bytes = registry
            .convert("<p>x</p>".into(), ReportFormat::Html, &RenderOptions::default())
            .await
            .unwrap();
        assert_eq!(bytes, b"<p>x</p>");
    }

    #[tokio::test]
    async fn test_registered_converter() {
        let mut registry = ConverterRegistry::new();
        registry.register(Arc::new(FakePdf));
        assert_eq!(
            registry.supported_formats(),
            vec![ReportFormat::Html, ReportFormat::Pdf]
        );

        let bytes = registry
            .convert("<p>x</p>".into(), ReportFormat::Pdf, &RenderOptions::default())
            .await
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_missing_converter_is_unsupported() {
        let registry = ConverterRegistry::new();
        let err = registry
            .convert("<p>x</p>".into(), ReportFormat::Docx, &RenderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnsupportedFormat(_)));
        assert!(!registry.supports(ReportFormat::Docx));
    }
}
