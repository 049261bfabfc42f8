use serde::Serialize;

use super::ExtractionError;

/// Text recovered from one uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedText {
    /// Per-page text joined with newlines.
    pub text: String,
    pub page_count: usize,
}

/// Per-page text source abstraction (allows mocking for tests).
pub trait PageSource {
    /// Extract one string per page from raw document bytes.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}
