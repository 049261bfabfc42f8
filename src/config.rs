use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Oncoplan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Completion model used for regimen extraction when none is configured.
pub const DEFAULT_COMPLETION_MODEL: &str = "claude-3-opus-20240229";

/// Maximum tokens requested per completion.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "oncoplan=info".to_string()
}

/// Configuration for the template analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Completion model used for regimen extraction.
    pub model: String,
    /// Maximum tokens the completion may produce.
    pub max_tokens: u32,
    /// Seconds before a completion call times out.
    pub completion_timeout_secs: u64,
    /// Seconds before a drug-knowledge call times out.
    pub fdb_timeout_secs: u64,
    /// Completion attempts per document (1 = no retry; hard-capped at 2).
    pub max_completion_attempts: usize,
    /// Worker threads for enrichment (1 = sequential).
    pub enrichment_workers: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            completion_timeout_secs: 120,
            fdb_timeout_secs: 30,
            max_completion_attempts: 1,
            enrichment_workers: 1,
        }
    }
}
