use super::types::{ExtractedText, PageSource};
use super::ExtractionError;

/// Turns raw document bytes into a single text blob via a page source.
///
/// Pages are joined with a newline so day and phase headings keep their
/// line breaks for the extraction prompt. Empty input, zero pages, and
/// whitespace-only text are all rejected as `ExtractionError::Empty`.
pub struct TextExtractionAdapter {
    source: Box<dyn PageSource + Send + Sync>,
}

impl TextExtractionAdapter {
    pub fn new(source: Box<dyn PageSource + Send + Sync>) -> Self {
        Self { source }
    }

    /// Adapter backed by the real PDF extractor.
    pub fn pdf() -> Self {
        Self::new(Box::new(super::pdf::PdfTextExtractor))
    }

    pub fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::Empty);
        }

        let pages = self.source.extract_pages(bytes)?;
        if pages.is_empty() {
            return Err(ExtractionError::Empty);
        }

        let text = pages.join("\n");
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        Ok(ExtractedText {
            page_count: pages.len(),
            text,
        })
    }
}
