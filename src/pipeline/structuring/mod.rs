pub mod anthropic;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod types;

pub use anthropic::*;
pub use orchestrator::*;
pub use parser::*;
pub use prompt::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Document text is empty")]
    EmptyInput,

    #[error("Completion request failed: {0}")]
    Completion(String),

    #[error("Completion request timed out after {0}s")]
    Timeout(u64),

    #[error("Completion service returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Reply is not valid JSON: {message}")]
    Json { message: String, raw: String },

    #[error("Reply does not match the regimen schema: {message}")]
    Schema { message: String, raw: String },
}

impl StructuringError {
    /// The verbatim model reply, for failures that happened after a reply
    /// was received.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            Self::Json { raw, .. } | Self::Schema { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
