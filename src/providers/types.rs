//! The generation backend seam.

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::Result;

/// An opaque text generation service: prompt in, text out, may fail.
///
/// Implementations must report failures as
/// [`RelayError::Provider`](crate::error::RelayError::Provider) so callers can
/// tell rate limiting apart from terminal errors.
///
/// # Example Implementation
///
/// ```
/// use async_trait::async_trait;
/// use lolang_relay::config::GenerationConfig;
/// use lolang_relay::error::Result;
/// use lolang_relay::providers::GenerationBackend;
///
/// struct Echo;
///
/// #[async_trait]
/// impl GenerationBackend for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn call(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
///         Ok(prompt.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short backend identifier used in logs.
    fn name(&self) -> &str;

    /// Issue exactly one generation request.
    async fn call(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;
}
