pub mod adapter;
pub mod pdf;
pub mod types;

pub use adapter::*;
pub use pdf::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Document contains no extractable text")]
    Empty,

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),
}
