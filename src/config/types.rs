//! Configuration type definitions for the LOLANG relay
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults. No default ever carries a credential: the API key must come from
//! the config file, a `.env` file or the environment.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lolang::PromptMode;

/// Default backoff base and message delay, in seconds.
const DEFAULT_DELAY_SECS: f64 = 5.0;

/// Convert a seconds setting to a `Duration`.
///
/// `None` for NaN, infinite, negative or out-of-range values.
pub fn delay_from_secs(secs: f64) -> Option<Duration> {
    if secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Like [`delay_from_secs`], but falls back to the default delay so callers
/// never panic on a bad setting. `Config::validate` reports such values.
fn delay_or_default(secs: f64) -> Duration {
    delay_from_secs(secs).unwrap_or(Duration::from_secs_f64(DEFAULT_DELAY_SECS))
}

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Generation backend settings (model, sampling, credentials)
    pub generation: GenerationConfig,
    /// Rate-limit retry policy for conversation turns
    pub retry: RetryConfig,
    /// Turn-taking settings
    pub conversation: ConversationConfig,
    /// Hub listen address
    pub server: ServerConfig,
    /// LOLANG decryption settings for the translator client
    pub translator: TranslatorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Generation Configuration
// ============================================================================

/// Default model used for both agents.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Settings handed opaquely to the generation backend.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model identifier
    pub model_name: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Output-token ceiling per call
    pub max_output_tokens: u32,
    /// API credential; never defaulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Override for the backend base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            temperature: 0.8,
            max_output_tokens: 8000,
            api_key: None,
            api_base: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

// ============================================================================
// Retry / Conversation Configuration
// ============================================================================

/// Rate-limit retry policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of generation attempts per turn
    pub max_retries: u32,
    /// Base backoff delay in seconds, doubled per attempt
    pub base_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_secs: DEFAULT_DELAY_SECS,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        delay_or_default(self.base_delay_secs)
    }
}

/// Default opener sent by the client agent.
pub const DEFAULT_INITIAL_MESSAGE: &str =
    "Hello, are you an AI agent? Let's discuss artificial intelligence using LOLANG.";

/// Turn-taking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of turns after which a loop terminates
    pub max_turns: u32,
    /// Fixed delay applied after every successful generation, in seconds
    pub message_delay_secs: f64,
    /// First message the client agent sends on connect
    pub initial_message: String,
    /// Which LOLANG preamble to prepend to the history
    pub prompt_mode: PromptMode,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            message_delay_secs: DEFAULT_DELAY_SECS,
            initial_message: DEFAULT_INITIAL_MESSAGE.to_string(),
            prompt_mode: PromptMode::default(),
        }
    }
}

impl ConversationConfig {
    pub fn message_delay(&self) -> Duration {
        delay_or_default(self.message_delay_secs)
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Hub listen address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
        }
    }
}

impl ServerConfig {
    /// `host:port` form used for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Websocket URL clients connect to.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Translator Configuration
// ============================================================================

/// LOLANG decryption settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Decrypt frames before display
    pub decrypt: bool,
    /// Low temperature keeps translations stable
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub max_retries: u32,
    pub base_delay_secs: f64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            decrypt: true,
            temperature: 0.1,
            max_output_tokens: 1000,
            max_retries: 10,
            base_delay_secs: DEFAULT_DELAY_SECS,
        }
    }
}

impl TranslatorConfig {
    pub fn base_delay(&self) -> Duration {
        delay_or_default(self.base_delay_secs)
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Output format for log lines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// Compact `[LEVEL] target message {fields}` lines
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Append logs to this file instead of stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}
