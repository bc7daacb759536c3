//! Error types for the LOLANG relay
//!
//! This module defines all error types used throughout the relay.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured classification of generation backend failures.
///
/// Lets the retrying caller decide whether a failure is rate-limit-class
/// (retried with backoff) or terminal, without string matching at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 429: Too many requests, quota or resource exhausted
    RateLimit(String),
    /// 401/403: Invalid API key or authentication failure
    Auth(String),
    /// 402: Payment required or billing issue
    Billing(String),
    /// 400: Bad request, malformed parameters
    InvalidRequest(String),
    /// 404: Model not found or endpoint not available
    ModelNotFound(String),
    /// 500/502/503/504: Server-side errors
    ServerError(String),
    /// Connection or read timeout
    Timeout(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error (429): {}", msg),
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if this failure is rate-limit-class.
    ///
    /// Only rate limiting is retried; every other kind is terminal for the turn.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimit(_))
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Auth(_) => Some(401),
            ProviderError::Billing(_) => Some(402),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::Timeout(_) => None,
            ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for RelayError {
    fn from(err: ProviderError) -> Self {
        RelayError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors (invalid values, missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generation backend failure, classified for retry decisions
    #[error("Generation failed: {0}")]
    Provider(ProviderError),

    /// A subscriber connection failed while sending
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// An inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// WebSocket handshake or transport errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayError {
    /// Returns `true` if this is a rate-limit-class generation failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RelayError::Provider(pe) if pe.is_rate_limited())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::WebSocket(err.to_string())
    }
}

/// A specialized `Result` type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let relay_err: RelayError = io_err.into();
        assert!(matches!(relay_err, RelayError::Io(_)));
    }

    #[test]
    fn test_rate_limit_display_carries_status() {
        let err = ProviderError::RateLimit("quota".into());
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Rate limit error"));
    }

    #[test]
    fn test_provider_error_is_rate_limited() {
        assert!(ProviderError::RateLimit("429".into()).is_rate_limited());

        assert!(!ProviderError::ServerError("500".into()).is_rate_limited());
        assert!(!ProviderError::Timeout("timeout".into()).is_rate_limited());
        assert!(!ProviderError::Auth("401".into()).is_rate_limited());
        assert!(!ProviderError::Billing("402".into()).is_rate_limited());
        assert!(!ProviderError::InvalidRequest("400".into()).is_rate_limited());
        assert!(!ProviderError::ModelNotFound("404".into()).is_rate_limited());
        assert!(!ProviderError::Unknown("???".into()).is_rate_limited());
    }

    #[test]
    fn test_provider_error_status_code() {
        assert_eq!(
            ProviderError::RateLimit("x".into()).status_code(),
            Some(429)
        );
        assert_eq!(ProviderError::Auth("x".into()).status_code(), Some(401));
        assert_eq!(ProviderError::Billing("x".into()).status_code(), Some(402));
        assert_eq!(
            ProviderError::InvalidRequest("x".into()).status_code(),
            Some(400)
        );
        assert_eq!(
            ProviderError::ModelNotFound("x".into()).status_code(),
            Some(404)
        );
        assert_eq!(
            ProviderError::ServerError("x".into()).status_code(),
            Some(500)
        );
        assert_eq!(ProviderError::Timeout("x".into()).status_code(), None);
        assert_eq!(ProviderError::Unknown("x".into()).status_code(), None);
    }

    #[test]
    fn test_relay_error_is_rate_limited() {
        let limited: RelayError = ProviderError::RateLimit("slow down".into()).into();
        assert!(limited.is_rate_limited());

        let terminal: RelayError = ProviderError::Auth("bad key".into()).into();
        assert!(!terminal.is_rate_limited());

        assert!(!RelayError::ConnectionLost("gone".into()).is_rate_limited());
    }

    #[test]
    fn test_provider_display_through_relay_error() {
        let err = RelayError::Provider(ProviderError::Auth("invalid key".into()));
        assert_eq!(
            err.to_string(),
            "Generation failed: Authentication error: invalid key"
        );
    }
}
