//! Response validation hook.
//!
//! Every answer an agent or network produces passes through a
//! [`ResponseValidationHook`] before it leaves the core. The hook tells
//! *empty* answers (worth regenerating) apart from *short* ones (worth
//! keeping and augmenting):
//!
//! ```text
//! generate(attempt) ──► check ──► Valid    ──► return unchanged
//!        ▲                 ├────► Short    ──► append elaboration offer
//!        │                 ├────► Rejected ──► return unchanged (warn)
//!        └── attempt+1 ◄───┴────► Empty    ──► retry, or apologise when exhausted
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use conclave_core::agent::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MIN_RESPONSE_LENGTH, ValidationPolicy};
use conclave_core::error::Error;
use conclave_core::response::AgentResponse;
use tracing::{debug, warn};

/// Error recorded when every attempt came back empty.
pub const EMPTY_RESPONSE_ERROR: &str = "Empty response after maximum retries";

/// Appended to answers shorter than the configured minimum.
pub const ELABORATION_OFFER: &str = "\n\nWould you like me to elaborate on any part of this?";

/// Custom validity predicate.
pub type Validator = Arc<dyn Fn(&AgentResponse) -> bool + Send + Sync>;

/// Stamps metadata onto every response the hook returns.
pub type Decorator = Arc<dyn Fn(&mut AgentResponse) + Send + Sync>;

/// Options for a [`ResponseValidationHook`].
#[derive(Clone)]
pub struct HookOptions {
    pub min_response_length: usize,
    pub max_attempts: u32,
    pub validator: Option<Validator>,
    pub decorate: Option<Decorator>,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            min_response_length: DEFAULT_MIN_RESPONSE_LENGTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            validator: None,
            decorate: None,
        }
    }
}

impl From<ValidationPolicy> for HookOptions {
    fn from(policy: ValidationPolicy) -> Self {
        Self {
            min_response_length: policy.min_response_length,
            max_attempts: policy.max_attempts,
            ..Self::default()
        }
    }
}

impl HookOptions {
    /// The hook for agents without an authored policy: any non-empty text
    /// or object is valid, so only empty answers are retried.
    pub fn generic() -> Self {
        Self::default().with_validator(|r: &AgentResponse| r.has_text() || r.has_object())
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&AgentResponse) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_decorator<F>(mut self, decorate: F) -> Self
    where
        F: Fn(&mut AgentResponse) + Send + Sync + 'static,
    {
        self.decorate = Some(Arc::new(decorate));
        self
    }
}

impl fmt::Debug for HookOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookOptions")
            .field("min_response_length", &self.min_response_length)
            .field("max_attempts", &self.max_attempts)
            .field("validator", &self.validator.is_some())
            .field("decorate", &self.decorate.is_some())
            .finish()
    }
}

/// How the hook classifies a single response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// Neither text nor a structured object
    Empty,
    /// Text present but under the minimum length
    Short,
    /// Non-empty content the custom validator refused
    Rejected,
}

/// Bounded-retry response validation.
#[derive(Debug, Clone, Default)]
pub struct ResponseValidationHook {
    options: HookOptions,
}

impl ResponseValidationHook {
    pub fn new(options: HookOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &HookOptions {
        &self.options
    }

    /// A copy of this hook that also decorates its output.
    pub fn decorated<F>(&self, decorate: F) -> Self
    where
        F: Fn(&mut AgentResponse) + Send + Sync + 'static,
    {
        Self::new(self.options.clone().with_decorator(decorate))
    }

    /// Classify a response without side effects.
    pub fn check(&self, response: &AgentResponse) -> Verdict {
        let valid = match &self.options.validator {
            Some(validator) => validator(response),
            None => {
                response.has_object()
                    || response.text.trim().chars().count() >= self.options.min_response_length
            }
        };

        if valid {
            Verdict::Valid
        } else if response.is_empty() {
            Verdict::Empty
        } else if response.has_text()
            && response.text.trim().chars().count() < self.options.min_response_length
        {
            Verdict::Short
        } else {
            Verdict::Rejected
        }
    }

    /// Generate, validate and repair a response.
    ///
    /// `generate` receives the 1-based attempt number. It is called at most
    /// `max_attempts` times. Errors never escape: they become a safe apology.
    pub async fn run<F, Fut>(&self, generate: F) -> AgentResponse
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<AgentResponse, Error>>,
    {
        self.run_counted(generate).await.0
    }

    /// Like [`run`](Self::run), also returning how many attempts were made.
    pub async fn run_counted<F, Fut>(&self, mut generate: F) -> (AgentResponse, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<AgentResponse, Error>>,
    {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;

        let mut response = loop {
            let response = match generate(attempt).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "Generation failed, returning safe response");
                    break AgentResponse::apology(e.to_string());
                }
            };

            match self.check(&response) {
                Verdict::Valid => break response,
                Verdict::Short => {
                    debug!(attempt, "Short response, appending elaboration offer");
                    break Self::repair(response);
                }
                Verdict::Rejected => {
                    warn!(attempt, "Response rejected by validator, returning as-is");
                    break response;
                }
                Verdict::Empty if attempt < max_attempts => {
                    debug!(attempt, max_attempts, "Empty response, retrying");
                    attempt += 1;
                }
                Verdict::Empty => {
                    warn!(attempts = attempt, "Empty response after maximum retries");
                    break AgentResponse::apology(EMPTY_RESPONSE_ERROR);
                }
            }
        };

        if let Some(decorate) = &self.options.decorate {
            decorate(&mut response);
        }
        (response, attempt)
    }

    fn repair(mut response: AgentResponse) -> AgentResponse {
        response.text.push_str(ELABORATION_OFFER);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::error::ProviderError;
    use conclave_core::response::APOLOGY_TEXT;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scripted(
        responses: Vec<AgentResponse>,
    ) -> (Arc<AtomicU32>, impl FnMut(u32) -> std::future::Ready<Result<AgentResponse, Error>>)
    {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let generate = move |attempt: u32| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(attempt, n + 1);
            let response = responses
                .get(n as usize)
                .cloned()
                .unwrap_or_else(AgentResponse::empty);
            std::future::ready(Ok(response))
        };
        (calls, generate)
    }

    #[tokio::test]
    async fn valid_response_returned_unchanged() {
        let hook = ResponseValidationHook::default();
        let (calls, generate) = scripted(vec![AgentResponse::text("hello there, friend")]);
        let response = hook.run(generate).await;
        assert_eq!(response, AgentResponse::text("hello there, friend"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn structured_object_counts_as_valid() {
        let hook = ResponseValidationHook::default();
        let (_, generate) = scripted(vec![AgentResponse::object(json!({"ok": true}))]);
        let response = hook.run(generate).await;
        assert_eq!(response.object, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn empty_retries_then_apologises() {
        let hook = ResponseValidationHook::default();
        let (calls, generate) = scripted(vec![]);
        let (response, attempts) = hook.run_counted(generate).await;

        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(response.text, APOLOGY_TEXT);
        assert_eq!(response.error.as_deref(), Some(EMPTY_RESPONSE_ERROR));
    }

    #[tokio::test]
    async fn empty_then_valid_stops_retrying() {
        let hook = ResponseValidationHook::default();
        let (calls, generate) = scripted(vec![
            AgentResponse::empty(),
            AgentResponse::text("second time lucky"),
        ]);
        let response = hook.run(generate).await;
        assert_eq!(response.text, "second time lucky");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn attempts_never_exceed_budget() {
        for max_attempts in 1..=5 {
            let hook = ResponseValidationHook::new(HookOptions {
                max_attempts,
                ..HookOptions::default()
            });
            let (calls, generate) = scripted(vec![]);
            hook.run(generate).await;
            assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
        }
    }

    #[tokio::test]
    async fn zero_budget_still_generates_once() {
        let hook = ResponseValidationHook::new(HookOptions {
            max_attempts: 0,
            ..HookOptions::default()
        });
        let (calls, generate) = scripted(vec![]);
        hook.run(generate).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_text_is_repaired_not_retried() {
        let hook = ResponseValidationHook::default();
        let (calls, generate) = scripted(vec![AgentResponse::text("Yes.")]);
        let response = hook.run(generate).await;

        assert!(response.text.starts_with("Yes."));
        assert!(response.text.ends_with(ELABORATION_OFFER));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn min_length_counts_characters() {
        let hook = ResponseValidationHook::new(HookOptions {
            min_response_length: 3,
            ..HookOptions::default()
        });
        assert_eq!(hook.check(&AgentResponse::text("日本語")), Verdict::Valid);
        assert_eq!(hook.check(&AgentResponse::text("ok")), Verdict::Short);
    }

    #[tokio::test]
    async fn custom_validator_rejection_passes_through() {
        let hook = ResponseValidationHook::new(
            HookOptions::default().with_validator(|r| r.text.contains("citation")),
        );
        let original = AgentResponse::text("A long answer without any sources.");
        assert_eq!(hook.check(&original), Verdict::Rejected);

        let (calls, generate) = scripted(vec![original.clone()]);
        let response = hook.run(generate).await;
        assert_eq!(response, original);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generation_error_becomes_apology() {
        let hook = ResponseValidationHook::default();
        let response = hook
            .run(|_| async {
                Err(Error::Provider(ProviderError::Network("connection reset".into())))
            })
            .await;
        assert_eq!(response.text, APOLOGY_TEXT);
        assert!(response.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn decorator_applies_to_apologies_too() {
        let hook = ResponseValidationHook::default().decorated(|r| {
            r.metadata.insert("network".into(), json!("support"));
        });

        let (_, generate) = scripted(vec![AgentResponse::text("a perfectly fine answer")]);
        assert_eq!(hook.run(generate).await.metadata["network"], "support");

        let (_, generate) = scripted(vec![]);
        let apology = hook.run(generate).await;
        assert!(apology.is_error());
        assert_eq!(apology.metadata["network"], "support");
    }

    #[tokio::test]
    async fn generic_hook_keeps_short_text_and_retries_blank() {
        let hook = ResponseValidationHook::new(HookOptions::generic());
        assert_eq!(hook.check(&AgentResponse::text("hello")), Verdict::Valid);
        assert_eq!(hook.check(&AgentResponse::text("  \n ")), Verdict::Empty);

        let (calls, generate) = scripted(vec![AgentResponse::text(" "), AgentResponse::text("hi")]);
        let response = hook.run(generate).await;
        assert_eq!(response, AgentResponse::text("hi"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn options_from_policy() {
        let options = HookOptions::from(ValidationPolicy {
            min_response_length: 25,
            max_attempts: 5,
        });
        assert_eq!(options.min_response_length, 25);
        assert_eq!(options.max_attempts, 5);
        assert!(options.validator.is_none());
    }
}
