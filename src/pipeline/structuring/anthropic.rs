use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_COMPLETION_MODEL, DEFAULT_MAX_TOKENS};

use super::types::CompletionClient;
use super::StructuringError;

/// Hosted Messages API endpoint.
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// API version header required on every request.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client for regimen extraction.
pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl AnthropicClient {
    /// Create a client against an explicit endpoint and model.
    ///
    /// The API key lives in this struct for the lifetime of the client and
    /// is never written anywhere.
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        max_tokens: u32,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            client,
            timeout_secs,
        }
    }

    /// Hosted endpoint with an explicit model choice.
    pub fn hosted(api_key: &str, model: &str, max_tokens: u32, timeout_secs: u64) -> Self {
        Self::new(ANTHROPIC_BASE_URL, api_key, model, max_tokens, timeout_secs)
    }

    /// Hosted endpoint with the default extraction model.
    pub fn with_defaults(api_key: &str, timeout_secs: u64) -> Self {
        Self::hosted(
            api_key,
            DEFAULT_COMPLETION_MODEL,
            DEFAULT_MAX_TOKENS,
            timeout_secs,
        )
    }
}

/// Request body for /v1/messages
#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from /v1/messages
#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl CompletionClient for AnthropicClient {
    fn complete(&self, prompt: &str) -> Result<String, StructuringError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            // Extraction wants the most deterministic reply available.
            temperature: 0.0,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    StructuringError::Completion(format!(
                        "completion service unreachable at {}",
                        self.base_url
                    ))
                } else if e.is_timeout() {
                    StructuringError::Timeout(self.timeout_secs)
                } else {
                    StructuringError::Completion(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StructuringError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| StructuringError::Completion(e.to_string()))?;

        Ok(parsed.content.iter().map(|b| b.text.as_str()).collect())
    }
}

/// Mock completion client for testing, returns a configurable reply.
pub struct MockCompletionClient {
    reply: String,
}

impl MockCompletionClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

impl CompletionClient for MockCompletionClient {
    fn complete(&self, _prompt: &str) -> Result<String, StructuringError> {
        Ok(self.reply.clone())
    }
}
