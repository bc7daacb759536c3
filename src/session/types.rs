//! Message type shared by the conversation history and the wire protocol.

use serde::{Deserialize, Serialize};

/// Role used by the server-side agent.
pub const SERVER_AGENT: &str = "server-agent";
/// Role used by the client-side agent.
pub const CLIENT_AGENT: &str = "client-agent";
/// Role used for human-authored messages.
pub const USER: &str = "user";

/// A single role-tagged utterance in a conversation.
///
/// Fields are private so a message cannot be altered once it has been
/// created; read them through [`Message::role`] and [`Message::content`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: String,
    content: String,
}

impl Message {
    /// Create a message spoken by `role`.
    ///
    /// # Example
    /// ```
    /// use lolang_relay::session::Message;
    ///
    /// let msg = Message::new("client-agent", "hello");
    /// assert_eq!(msg.role(), "client-agent");
    /// assert_eq!(msg.content(), "hello");
    /// ```
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a message from the server-side agent.
    pub fn server(content: impl Into<String>) -> Self {
        Self::new(SERVER_AGENT, content)
    }

    /// Create a message from the client-side agent.
    pub fn client(content: impl Into<String>) -> Self {
        Self::new(CLIENT_AGENT, content)
    }

    /// Create a human-authored message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(USER, content)
    }

    /// Who spoke this message.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The UTF-8 text of this message.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Render as a single `"{role}: {content}"` line.
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}
