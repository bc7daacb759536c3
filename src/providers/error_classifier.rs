//! Pattern-based classification of generation backend error messages.
//!
//! Used when a failure carries no HTTP status (transport errors, SDK-style
//! messages with an embedded status). Checks patterns in priority order:
//! billing > auth > rate_limit > server > timeout. Falls back to `Unknown`.
//! Status codes only match as standalone numbers, so `4290 tokens` is not a
//! rate limit.

use crate::error::ProviderError;

/// Classify an error message string into a `ProviderError`.
pub fn classify_error_message(msg: &str) -> ProviderError {
    let lower = msg.to_lowercase();

    // Billing: check before auth (402 can appear in both)
    if contains_code(&lower, &["402"])
        || contains_any(&lower, &["payment required", "billing", "insufficient credits"])
    {
        return ProviderError::Billing(msg.to_string());
    }

    if contains_code(&lower, &["401", "403"])
        || contains_any(
            &lower,
            &[
                "api_key_invalid",
                "invalid api key",
                "api key not valid",
                "permission_denied",
                "unauthenticated",
                "unauthorized",
                "forbidden",
            ],
        )
    {
        return ProviderError::Auth(msg.to_string());
    }

    // Rate limit: Gemini reports RESOURCE_EXHAUSTED alongside 429
    if contains_code(&lower, &["429"])
        || contains_any(
            &lower,
            &[
                "too many requests",
                "rate limit",
                "rate_limit",
                "resource_exhausted",
                "resource has been exhausted",
                "exceeded your current quota",
                "quota exceeded",
            ],
        )
    {
        return ProviderError::RateLimit(msg.to_string());
    }

    if contains_code(&lower, &["500", "502", "503", "504"])
        || contains_any(
            &lower,
            &[
                "internal server error",
                "bad gateway",
                "service unavailable",
                "overloaded",
            ],
        )
    {
        return ProviderError::ServerError(msg.to_string());
    }

    if contains_any(&lower, &["timeout", "timed out", "deadline exceeded"]) {
        return ProviderError::Timeout(msg.to_string());
    }

    ProviderError::Unknown(msg.to_string())
}

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

/// True if any of `codes` appears with no digit directly before or after it.
fn contains_code(haystack: &str, codes: &[&str]) -> bool {
    let bytes = haystack.as_bytes();
    codes.iter().any(|code| {
        haystack.match_indices(code).any(|(start, _)| {
            let end = start + code.len();
            let digit_before = start > 0 && bytes[start - 1].is_ascii_digit();
            let digit_after = bytes.get(end).is_some_and(u8::is_ascii_digit);
            !digit_before && !digit_after
        })
    })
}
