//! Best-effort translation of LOLANG messages for display.

use std::sync::Arc;

use tracing::info_span;

use crate::config::{GenerationConfig, TranslatorConfig};
use crate::providers::{GenerationBackend, RetryPolicy, RetryingCaller};

use super::decryption_prompt;

/// Translates LOLANG text back into plain language through the generation
/// backend.
///
/// Never fails: a terminal backend error is logged by the inner caller and
/// returned as a `[Decryption failed: ...]` marker so it cannot be mistaken
/// for a translation.
#[derive(Debug)]
pub struct Decryptor {
    caller: RetryingCaller,
}

impl Decryptor {
    /// Build a decryptor sharing `generation`'s model and credentials but
    /// with the translator's sampling and retry settings.
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        generation: &GenerationConfig,
        translator: &TranslatorConfig,
    ) -> Self {
        let config = GenerationConfig {
            temperature: translator.temperature,
            max_output_tokens: translator.max_output_tokens,
            ..generation.clone()
        };
        let policy = RetryPolicy::new(translator.max_retries, translator.base_delay());
        Self {
            caller: RetryingCaller::new(backend, config)
                .with_policy(policy)
                .with_span(info_span!("decrypt")),
        }
    }

    /// Wrap an already configured caller.
    pub fn from_caller(caller: RetryingCaller) -> Self {
        Self { caller }
    }

    pub async fn decrypt(&self, message: &str) -> String {
        match self.caller.complete(&decryption_prompt(message)).await {
            Ok(text) => text,
            Err(e) => format!("[Decryption failed: {}]", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingBackend {
        reply: std::result::Result<String, ProviderError>,
        seen: Mutex<Vec<(String, f32, u32)>>,
    }

    impl RecordingBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: ProviderError) -> Self {
            Self {
                reply: Err(err),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        async fn call(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
            self.seen.lock().unwrap().push((
                prompt.to_string(),
                config.temperature,
                config.max_output_tokens,
            ));
            self.reply.clone().map_err(Into::into)
        }
    }

    #[tokio::test]
    async fn test_decrypt_uses_translator_sampling() {
        let backend = Arc::new(RecordingBackend::replying(" Book a room \n at 11pm? "));
        let decryptor = Decryptor::new(
            backend.clone(),
            &GenerationConfig::default(),
            &TranslatorConfig::default(),
        );

        let text = decryptor.decrypt("⟦LO-2⟧ SHECD").await;

        assert_eq!(text, "Book a room at 11pm?");
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.ends_with("LOLANG message: ⟦LO-2⟧ SHECD"));
        assert_eq!(seen[0].1, 0.1);
        assert_eq!(seen[0].2, 1000);
    }

    #[tokio::test]
    async fn test_decrypt_failure_returns_marker() {
        let backend = Arc::new(RecordingBackend::failing(ProviderError::Auth(
            "bad key".into(),
        )));
        let decryptor = Decryptor::new(
            backend,
            &GenerationConfig::default(),
            &TranslatorConfig::default(),
        );

        let text = decryptor.decrypt("anything").await;

        assert!(text.starts_with("[Decryption failed: "));
        assert!(text.contains("bad key"));
    }

    #[tokio::test]
    async fn test_unrepresentable_delay_does_not_panic() {
        let backend = Arc::new(RecordingBackend::replying("plain"));
        let translator = TranslatorConfig {
            base_delay_secs: f64::INFINITY,
            ..Default::default()
        };
        let decryptor = Decryptor::new(backend, &GenerationConfig::default(), &translator);

        assert_eq!(decryptor.decrypt("x").await, "plain");
    }
}
