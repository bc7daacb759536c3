//! Retrying caller - wraps a generation backend with rate-limit backoff.
//!
//! Only rate-limit-class failures (HTTP 429 and its equivalents) are retried.
//! Anything else, or running out of attempts, ends the call immediately and
//! is logged at error level. Retries themselves are routine and only show up
//! at debug level.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use lolang_relay::providers::{GeminiBackend, RetryPolicy, RetryingCaller};
//!
//! let caller = RetryingCaller::new(Arc::new(GeminiBackend::new()), generation_config)
//!     .with_policy(RetryPolicy::new(10, Duration::from_secs(5)))
//!     .with_message_delay(Duration::from_secs(5));
//!
//! let reply = caller.generate(&history).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info_span, Instrument, Span};

use crate::config::{GenerationConfig, RetryConfig};
use crate::error::Result;
use crate::session::ConversationHistory;

use super::GenerationBackend;

/// Bounded retry policy for rate-limited calls.
///
/// Immutable once handed to a [`RetryingCaller`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing up to `max_retries` calls in total.
    ///
    /// `max_retries = 10` permits 10 calls and therefore 9 backoff delays.
    /// `max_retries = 0` still makes one call but never retries.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Total number of calls this policy permits.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self::new(cfg.max_retries, cfg.base_delay())
    }
}

/// Compute the backoff delay before the retry that follows `attempt`.
///
/// Delay formula: `base_delay * 2^attempt + jitter`. The exponent is clamped
/// so the multiplication saturates instead of overflowing.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use lolang_relay::providers::compute_delay;
///
/// let d = compute_delay(2, Duration::from_secs(5), Duration::from_millis(250));
/// assert_eq!(d, Duration::from_millis(20_250));
/// ```
pub fn compute_delay(attempt: u32, base_delay: Duration, jitter: Duration) -> Duration {
    base_delay
        .saturating_mul(1u32 << attempt.min(31))
        .saturating_add(jitter)
}

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Uniform jitter in `[0, 1)` seconds, drawn in whole nanoseconds.
fn random_jitter() -> Duration {
    Duration::from_nanos(rand::rng().random_range(0..NANOS_PER_SEC))
}

/// Trim model output and collapse every internal whitespace run (including
/// newlines) into a single space.
///
/// # Example
/// ```
/// use lolang_relay::providers::normalize_output;
///
/// assert_eq!(normalize_output("  hi\n\nthere  "), "hi there");
/// ```
pub fn normalize_output(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Issues generation calls with bounded, jittered exponential backoff on
/// rate limiting, then throttles with a fixed inter-message delay.
pub struct RetryingCaller {
    backend: Arc<dyn GenerationBackend>,
    config: GenerationConfig,
    policy: RetryPolicy,
    /// Text placed before the rendered history in every prompt.
    preamble: Option<String>,
    /// Applied after every successful call before returning.
    message_delay: Duration,
    span: Span,
}

impl fmt::Debug for RetryingCaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingCaller")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("has_preamble", &self.preamble.is_some())
            .field("message_delay", &self.message_delay)
            .finish()
    }
}

impl RetryingCaller {
    /// Create a caller with the default policy and no inter-message delay.
    pub fn new(backend: Arc<dyn GenerationBackend>, config: GenerationConfig) -> Self {
        Self {
            backend,
            config,
            policy: RetryPolicy::default(),
            preamble: None,
            message_delay: Duration::ZERO,
            span: info_span!("generate"),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn with_message_delay(mut self, delay: Duration) -> Self {
        self.message_delay = delay;
        self
    }

    /// Emit this caller's events inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Build the prompt for `history`: preamble (if any), a blank line, then
    /// the rendered history.
    pub fn build_prompt(&self, history: &ConversationHistory) -> String {
        let context = history.render_as_text();
        match &self.preamble {
            Some(preamble) => format!("{}\n\n{}", preamble, context),
            None => context,
        }
    }

    /// Generate the next utterance given the whole conversation so far.
    pub async fn generate(&self, history: &ConversationHistory) -> Result<String> {
        let prompt = self.build_prompt(history);
        self.complete(&prompt).await
    }

    /// Run `prompt` through the backend with retry, normalization and the
    /// inter-message delay.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let backend = self.backend.name();
        let attempts = self.policy.max_attempts();

        async move {
            let mut attempt: u32 = 0;
            loop {
                match self.backend.call(prompt, &self.config).await {
                    Ok(raw) => {
                        let text = normalize_output(&raw);
                        if !self.message_delay.is_zero() {
                            tokio::time::sleep(self.message_delay).await;
                        }
                        return Ok(text);
                    }
                    Err(err) if err.is_rate_limited() && attempt + 1 < attempts => {
                        let delay = compute_delay(attempt, self.policy.base_delay, random_jitter());
                        debug!(
                            backend,
                            attempt,
                            max_attempts = attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Rate limited, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        error!(
                            backend,
                            attempt,
                            max_attempts = attempts,
                            error = %err,
                            "Generation failed"
                        );
                        return Err(err);
                    }
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }
}
