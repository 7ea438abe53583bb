//! Text extraction from uploaded documents.

use crate::RagError;

/// Extracted text plus document metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    /// The plain text content.
    pub text: String,
    /// Page count; plain-text formats count form-feed separators.
    pub page_count: usize,
}

/// Extractor for text-based formats. Binary formats (PDF, Office) are the
/// job of a converter in front of the gateway; unknown MIME types are
/// refused rather than mangled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

const SUPPORTED_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "text/csv",
    "application/json",
];

impl TextExtractor {
    /// Whether this extractor understands the MIME type. Parameters like
    /// `; charset=utf-8` are ignored.
    pub fn supports(&self, mime_type: &str) -> bool {
        let essence = mime_type.split(';').next().unwrap_or("").trim();
        SUPPORTED_MIME_TYPES.contains(&essence)
    }

    /// Extract text from raw bytes.
    pub fn extract(&self, data: &[u8], mime_type: &str) -> Result<ExtractionResult, RagError> {
        if !self.supports(mime_type) {
            return Err(RagError::UnsupportedMime(mime_type.to_string()));
        }

        let text = String::from_utf8(data.to_vec())
            .map_err(|e| RagError::Extraction(format!("document is not valid UTF-8: {e}")))?;

        let page_count = text.matches('\u{c}').count() + 1;

        Ok(ExtractionResult { text, page_count })
    }
}
