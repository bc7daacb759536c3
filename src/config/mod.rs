//! Configuration management for the LOLANG relay
//!
//! Configuration is loaded from `~/.lolang/config.json` with environment
//! variable overrides. Nothing here is process-global: callers load a
//! [`Config`] once at startup and pass the pieces they need to each component.

mod types;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Fallback variable for the API credential, matching the Gemini tooling.
const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

impl Config {
    /// Returns the configuration directory path (~/.lolang)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lolang")
    }

    /// Returns the path to the config file (~/.lolang/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: LOLANG_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Unparseable numeric values are ignored and the existing value kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Generation
        if let Some(val) =
            lookup("LOLANG_GENERATION_API_KEY").or_else(|| lookup(GEMINI_API_KEY_ENV))
        {
            if !val.trim().is_empty() {
                self.generation.api_key = Some(val);
            }
        }
        if let Some(val) = lookup("LOLANG_GENERATION_MODEL") {
            self.generation.model_name = val;
        }
        if let Some(val) = lookup("LOLANG_GENERATION_API_BASE") {
            self.generation.api_base = Some(val);
        }
        if let Some(v) = parse_var(&lookup, "LOLANG_GENERATION_TEMPERATURE") {
            self.generation.temperature = v;
        }
        if let Some(v) = parse_var(&lookup, "LOLANG_GENERATION_MAX_OUTPUT_TOKENS") {
            self.generation.max_output_tokens = v;
        }

        // Retry
        if let Some(v) = parse_var(&lookup, "LOLANG_RETRY_MAX_RETRIES") {
            self.retry.max_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "LOLANG_RETRY_BASE_DELAY_SECS") {
            self.retry.base_delay_secs = v;
        }

        // Conversation
        if let Some(v) = parse_var(&lookup, "LOLANG_CONVERSATION_MAX_TURNS") {
            self.conversation.max_turns = v;
        }
        if let Some(v) = parse_var(&lookup, "LOLANG_CONVERSATION_MESSAGE_DELAY_SECS") {
            self.conversation.message_delay_secs = v;
        }

        // Server
        if let Some(val) = lookup("LOLANG_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(v) = parse_var(&lookup, "LOLANG_SERVER_PORT") {
            self.server.port = v;
        }
    }

    /// Check the configuration for problems that would prevent a run.
    ///
    /// Returns one human-readable line per problem; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        match &self.generation.api_key {
            Some(key) if !key.trim().is_empty() => {}
            _ => problems.push(format!(
                "generation.api_key is not set (use LOLANG_GENERATION_API_KEY or {})",
                GEMINI_API_KEY_ENV
            )),
        }
        if self.generation.model_name.trim().is_empty() {
            problems.push("generation.model_name is empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            problems.push(format!(
                "generation.temperature {} is outside 0.0..=2.0",
                self.generation.temperature
            ));
        }
        if self.generation.max_output_tokens == 0 {
            problems.push("generation.max_output_tokens must be positive".to_string());
        }
        for (name, secs) in [
            ("retry.base_delay_secs", self.retry.base_delay_secs),
            ("translator.base_delay_secs", self.translator.base_delay_secs),
        ] {
            match delay_from_secs(secs) {
                Some(delay) if !delay.is_zero() => {}
                _ => problems.push(format!(
                    "{} must be a positive, finite number of seconds, got {}",
                    name, secs
                )),
            }
        }
        if delay_from_secs(self.conversation.message_delay_secs).is_none() {
            problems.push(format!(
                "conversation.message_delay_secs must be a finite, non-negative number of seconds, got {}",
                self.conversation.message_delay_secs
            ));
        }
        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_string());
        }

        problems
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|val| val.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.generation.model_name, "gemini-2.0-flash");
        assert_eq!(config.generation.temperature, 0.8);
        assert_eq!(config.generation.max_output_tokens, 8000);
        assert!(config.generation.api_key.is_none());
        assert_eq!(config.retry.max_retries, 10);
        assert_eq!(config.retry.base_delay_secs, 5.0);
        assert_eq!(config.conversation.max_turns, 20);
        assert_eq!(config.server.url(), "ws://localhost:8765");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.server.port, 8765);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":9000},"retry":{"max_retries":3}}"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_secs, 5.0);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("LOLANG_GENERATION_API_KEY", "secret"),
            ("LOLANG_GENERATION_MODEL", "gemini-pro"),
            ("LOLANG_GENERATION_TEMPERATURE", "0.3"),
            ("LOLANG_RETRY_MAX_RETRIES", "4"),
            ("LOLANG_CONVERSATION_MAX_TURNS", "2"),
            ("LOLANG_CONVERSATION_MESSAGE_DELAY_SECS", "0.5"),
            ("LOLANG_SERVER_PORT", "9999"),
        ]));

        assert_eq!(config.generation.api_key.as_deref(), Some("secret"));
        assert_eq!(config.generation.model_name, "gemini-pro");
        assert_eq!(config.generation.temperature, 0.3);
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.conversation.max_turns, 2);
        assert_eq!(config.conversation.message_delay_secs, 0.5);
        assert_eq!(config.server.port, 9999);
    }

    #[test]
    fn test_gemini_key_fallback() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[("GEMINI_API_KEY", "from-gemini")]));
        assert_eq!(config.generation.api_key.as_deref(), Some("from-gemini"));
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[("LOLANG_SERVER_PORT", "not-a-port")]));
        assert_eq!(config.server.port, 8765);
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = Config::default();
        let problems = config.validate();
        assert!(problems.iter().any(|p| p.contains("api_key")));

        let mut config = Config::default();
        config.generation.api_key = Some("k".into());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_rejects_non_positive_base_delay() {
        let mut config = Config::default();
        config.generation.api_key = Some("k".into());
        config.retry.base_delay_secs = 0.0;
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_non_finite_delay_override_is_reported_not_fatal() {
        let mut config = Config::default();
        config.generation.api_key = Some("k".into());
        config.apply_overrides(lookup_from(&[
            ("LOLANG_RETRY_BASE_DELAY_SECS", "inf"),
            ("LOLANG_CONVERSATION_MESSAGE_DELAY_SECS", "1e300"),
        ]));

        // Accessors fall back instead of panicking.
        assert_eq!(config.retry.base_delay(), Duration::from_secs(5));
        assert_eq!(config.conversation.message_delay(), Duration::from_secs(5));

        let problems = config.validate();
        assert_eq!(problems.len(), 2, "{:?}", problems);
        assert!(problems.iter().any(|p| p.contains("retry.base_delay_secs")));
        assert!(problems
            .iter()
            .any(|p| p.contains("conversation.message_delay_secs")));
    }

    #[test]
    fn test_delay_from_secs_bounds() {
        assert_eq!(delay_from_secs(0.5), Some(Duration::from_millis(500)));
        assert_eq!(delay_from_secs(0.0), Some(Duration::ZERO));
        assert_eq!(delay_from_secs(-1.0), None);
        assert_eq!(delay_from_secs(f64::NAN), None);
        assert_eq!(delay_from_secs(f64::INFINITY), None);
        assert_eq!(delay_from_secs(1e300), None);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = GenerationConfig::default();
        config.api_key = Some("super-secret".into());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
