//! Gemini backend implementation
//!
//! Sends a single-turn `generateContent` request per call. The prompt already
//! carries the whole rendered conversation, so no server-side chat state is
//! used.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{ProviderError, Result};

use super::{classify_error_message, parse_provider_error, GenerationBackend};

/// The Gemini API base URL.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// Gemini API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: RequestGenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

// ============================================================================
// Gemini API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

// ============================================================================
// Backend
// ============================================================================

/// HTTP client for the Gemini `generateContent` endpoint.
pub struct GeminiBackend {
    client: Client,
}

impl GeminiBackend {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for GeminiBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn build_request<'a>(prompt: &'a str, config: &GenerationConfig) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: RequestGenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

fn endpoint(config: &GenerationConfig) -> String {
    let base = config
        .api_base
        .as_deref()
        .unwrap_or(GEMINI_API_BASE)
        .trim_end_matches('/');
    format!("{}/models/{}:generateContent", base, config.model_name)
}

/// Turn a non-2xx response into a classified error.
fn error_from_response(status: u16, body: &str) -> ProviderError {
    let detail = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => format!("{} {}: {}", status, parsed.error.status, parsed.error.message),
        Err(_) => format!("{}: {}", status, body),
    };
    parse_provider_error(status, &detail)
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> std::result::Result<String, ProviderError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::InvalidRequest(format!(
            "prompt blocked: {}",
            reason
        )));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Unknown("response contained no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ProviderError::Unknown(format!(
            "empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn call(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::Auth("no API key configured".to_string()))?;

        debug!(model = %config.model_name, prompt_len = prompt.len(), "Gemini request");

        let response = self
            .client
            .post(endpoint(config))
            .header("x-goog-api-key", api_key)
            .json(&build_request(prompt, config))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    classify_error_message(&format!("Gemini request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &body).into());
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            ProviderError::Unknown(format!("Failed to parse Gemini response: {}", e))
        })?;

        Ok(extract_text(parsed)?)
    }
}
