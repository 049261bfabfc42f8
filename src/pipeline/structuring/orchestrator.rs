use uuid::Uuid;

use super::parser::parse_regimen_reply;
use super::prompt::build_regimen_prompt;
use super::types::{CompletionClient, StructuredRegimen};
use super::StructuringError;

/// Hard ceiling on completion attempts per document.
pub const MAX_COMPLETION_ATTEMPTS: usize = 2;

/// Drives one document's text through prompt, completion call, and strict
/// parse. A malformed reply may earn one fresh completion call; it is never
/// repaired locally.
pub struct RegimenExtractor {
    client: Box<dyn CompletionClient + Send + Sync>,
    attempts: usize,
}

impl RegimenExtractor {
    /// `attempts` is clamped to 1..=MAX_COMPLETION_ATTEMPTS.
    pub fn new(client: Box<dyn CompletionClient + Send + Sync>, attempts: usize) -> Self {
        Self {
            client,
            attempts: attempts.clamp(1, MAX_COMPLETION_ATTEMPTS),
        }
    }

    pub fn extract_regimen(
        &self,
        document_id: &Uuid,
        text: &str,
    ) -> Result<StructuredRegimen, StructuringError> {
        let _span = tracing::info_span!("extract_regimen", doc_id = %document_id).entered();

        if text.trim().is_empty() {
            return Err(StructuringError::EmptyInput);
        }

        let prompt = build_regimen_prompt(text);
        let mut last_error: Option<StructuringError> = None;

        for attempt in 1..=self.attempts {
            // Call the completion backend (non-retryable errors propagate immediately)
            let reply = match self.client.complete(&prompt) {
                Ok(reply) => reply,
                Err(e) if is_retryable(&e) && attempt < self.attempts => {
                    tracing::warn!(
                        doc_id = %document_id,
                        attempt,
                        error = %e,
                        "Completion call failed, retrying"
                    );
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match parse_regimen_reply(&reply) {
                Ok(regimen) => {
                    tracing::info!(
                        doc_id = %document_id,
                        phases = regimen.phases.len(),
                        medications = regimen.medication_count(),
                        "Regimen extracted"
                    );
                    return Ok(StructuredRegimen {
                        regimen,
                        raw_reply: reply,
                    });
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(
                        doc_id = %document_id,
                        attempt,
                        error = %e,
                        "Reply failed strict parse, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            StructuringError::Completion("all completion attempts exhausted".into())
        }))
    }
}

/// Transient completion failures worth another attempt. Server-side API
/// errors retry; client-side ones (bad key, malformed request) do not.
fn is_retryable(e: &StructuringError) -> bool {
    match e {
        StructuringError::Completion(_) | StructuringError::Timeout(_) => true,
        StructuringError::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::anthropic::MockCompletionClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn valid_reply() -> String {
        r#"{"phase1": {"treatmentTemplate": {"cycle": {"duration": {"numberOfDays": 21}, "medications": {"day1": {"chemotherapy": [{"name": "Docetaxel", "dose": "75mg/m2"}]}}}}}}"#
            .to_string()
    }

    /// Returns a malformed reply N times, then a valid one.
    struct FailThenSucceedClient {
        fail_count: usize,
        call_count: AtomicUsize,
        bad_reply: String,
        good_reply: String,
    }

    impl FailThenSucceedClient {
        fn new(fail_count: usize, bad_reply: &str, good_reply: &str) -> Self {
            Self {
                fail_count,
                call_count: AtomicUsize::new(0),
                bad_reply: bad_reply.to_string(),
                good_reply: good_reply.to_string(),
            }
        }
    }

    impl CompletionClient for FailThenSucceedClient {
        fn complete(&self, _prompt: &str) -> Result<String, StructuringError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            if count < self.fail_count {
                Ok(self.bad_reply.clone())
            } else {
                Ok(self.good_reply.clone())
            }
        }
    }

    /// Fails at the transport level N times, then succeeds.
    struct TransportFailThenSucceedClient {
        fail_count: usize,
        call_count: AtomicUsize,
        reply: String,
    }

    impl CompletionClient for TransportFailThenSucceedClient {
        fn complete(&self, _prompt: &str) -> Result<String, StructuringError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            if count < self.fail_count {
                Err(StructuringError::Completion("connection reset".into()))
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    /// Always returns a malformed reply; records how often it was called.
    struct CountingBadReplyClient {
        calls: Arc<AtomicUsize>,
    }

    impl CompletionClient for CountingBadReplyClient {
        fn complete(&self, _prompt: &str) -> Result<String, StructuringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("this is not a regimen".into())
        }
    }

    /// Always fails with a fixed API status; records call count.
    struct ApiErrorClient {
        status: u16,
        calls: Arc<AtomicUsize>,
    }

    impl CompletionClient for ApiErrorClient {
        fn complete(&self, _prompt: &str) -> Result<String, StructuringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StructuringError::Api {
                status: self.status,
                body: String::new(),
            })
        }
    }

    #[test]
    fn extracts_regimen_and_keeps_raw_reply() {
        let reply = valid_reply();
        let extractor = RegimenExtractor::new(Box::new(MockCompletionClient::new(&reply)), 1);

        let result = extractor
            .extract_regimen(&Uuid::new_v4(), "Docetaxel 75mg/m2 day 1 of 21")
            .unwrap();

        assert_eq!(result.regimen.phases.len(), 1);
        let day1 = &result.regimen.phases[0].template.cycle.medications_by_day[&1];
        assert_eq!(day1.chemotherapy[0].name, "Docetaxel");
        assert_eq!(result.raw_reply, reply);
    }

    #[test]
    fn empty_input_is_rejected_before_any_call() {
        let extractor = RegimenExtractor::new(Box::new(MockCompletionClient::new("{}")), 1);
        let err = extractor
            .extract_regimen(&Uuid::new_v4(), "   \n\t ")
            .unwrap_err();
        assert!(matches!(err, StructuringError::EmptyInput));
    }

    #[test]
    fn single_attempt_does_not_retry_malformed_reply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CountingBadReplyClient {
            calls: Arc::clone(&calls),
        };
        let extractor = RegimenExtractor::new(Box::new(client), 1);

        let err = extractor
            .extract_regimen(&Uuid::new_v4(), "protocol text")
            .unwrap_err();

        assert!(matches!(err, StructuringError::Json { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_reply_retries_once_then_succeeds() {
        let client = FailThenSucceedClient::new(1, "sorry, no JSON here", &valid_reply());
        let extractor = RegimenExtractor::new(Box::new(client), 2);

        let result = extractor
            .extract_regimen(&Uuid::new_v4(), "protocol text")
            .unwrap();
        assert_eq!(result.regimen.phases.len(), 1);
    }

    #[test]
    fn attempts_are_capped_at_the_ceiling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CountingBadReplyClient {
            calls: Arc::clone(&calls),
        };
        let extractor = RegimenExtractor::new(Box::new(client), 5);

        let _ = extractor.extract_regimen(&Uuid::new_v4(), "protocol text");
        assert_eq!(calls.load(Ordering::SeqCst), MAX_COMPLETION_ATTEMPTS);
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CountingBadReplyClient {
            calls: Arc::clone(&calls),
        };
        let extractor = RegimenExtractor::new(Box::new(client), 0);

        let _ = extractor.extract_regimen(&Uuid::new_v4(), "protocol text");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transport_error_retries_then_succeeds() {
        let client = TransportFailThenSucceedClient {
            fail_count: 1,
            call_count: AtomicUsize::new(0),
            reply: valid_reply(),
        };
        let extractor = RegimenExtractor::new(Box::new(client), 2);

        let result = extractor
            .extract_regimen(&Uuid::new_v4(), "protocol text")
            .unwrap();
        assert_eq!(result.regimen.phases.len(), 1);
    }

    #[test]
    fn client_side_api_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = ApiErrorClient {
            status: 400,
            calls: Arc::clone(&calls),
        };
        let extractor = RegimenExtractor::new(Box::new(client), 2);

        let err = extractor
            .extract_regimen(&Uuid::new_v4(), "protocol text")
            .unwrap_err();

        assert!(matches!(err, StructuringError::Api { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
