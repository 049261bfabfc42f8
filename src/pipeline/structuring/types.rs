use crate::models::Regimen;

use super::StructuringError;

/// Seam for the completion backend. The production implementation talks to
/// the Anthropic Messages API; tests substitute scripted replies.
pub trait CompletionClient {
    /// Send a prompt and return the model's text reply.
    fn complete(&self, prompt: &str) -> Result<String, StructuringError>;
}

/// A regimen parsed from a model reply, together with the reply itself.
///
/// The raw reply is kept so callers can audit exactly what the model said,
/// whether or not downstream steps change the structured form.
#[derive(Debug, Clone)]
pub struct StructuredRegimen {
    pub regimen: Regimen,
    pub raw_reply: String,
}
