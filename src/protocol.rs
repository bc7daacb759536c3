//! Wire protocol between the hub and its subscribers.
//!
//! Every frame is a single-line JSON text message of the form
//! `{"role": "...", "content": "..."}`. There is no versioning or
//! negotiation. Decoding is lenient about missing fields: `content` defaults
//! to the empty string and `role` to a side-specific default supplied by the
//! receiver.

use serde::Deserialize;

use crate::error::{RelayError, Result};
use crate::session::Message;

#[derive(Debug, Deserialize)]
struct Frame {
    role: Option<String>,
    #[serde(default)]
    content: String,
}

/// Encode `msg` as a JSON text frame.
///
/// `serde_json` escapes newlines inside strings, so the frame never contains a
/// raw line break.
///
/// # Example
/// ```
/// use lolang_relay::protocol::encode_frame;
/// use lolang_relay::session::Message;
///
/// let frame = encode_frame(&Message::server("a\nb")).unwrap();
/// assert_eq!(frame, r#"{"role":"server-agent","content":"a\nb"}"#);
/// ```
pub fn encode_frame(msg: &Message) -> Result<String> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode a text frame, substituting `default_role` when `role` is absent.
///
/// Returns [`RelayError::MalformedFrame`] for anything that is not a JSON
/// object with string fields.
pub fn decode_frame(text: &str, default_role: &str) -> Result<Message> {
    let frame: Frame =
        serde_json::from_str(text).map_err(|e| RelayError::MalformedFrame(e.to_string()))?;
    let role = frame.role.unwrap_or_else(|| default_role.to_string());
    Ok(Message::new(role, frame.content))
}
