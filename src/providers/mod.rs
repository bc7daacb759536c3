//! Providers module - the generation backend and its retry wrapper
//!
//! The conversation core treats text generation as an opaque
//! [`GenerationBackend`]. [`GeminiBackend`] is the concrete HTTP implementation;
//! [`RetryingCaller`] wraps any backend with rate-limit backoff.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lolang_relay::config::Config;
//! use lolang_relay::providers::{GeminiBackend, RetryPolicy, RetryingCaller};
//! use lolang_relay::session::{ConversationHistory, Message};
//!
//! async fn example(config: Config) {
//!     let caller = RetryingCaller::new(Arc::new(GeminiBackend::new()), config.generation)
//!         .with_policy(RetryPolicy::from(&config.retry));
//!     let mut history = ConversationHistory::new();
//!     history.append(Message::user("Hello!"));
//!     let reply = caller.generate(&history).await.unwrap();
//!     println!("{}", reply);
//! }
//! ```

pub mod error_classifier;
pub mod gemini;
pub mod retry;
mod types;

use crate::error::ProviderError;

pub use error_classifier::classify_error_message;
pub use gemini::GeminiBackend;
pub use retry::{compute_delay, normalize_output, RetryPolicy, RetryingCaller};
pub use types::GenerationBackend;

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
///
/// This centralizes the mapping from HTTP status codes to error classifications
/// so that every backend produces consistent typed errors.
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
