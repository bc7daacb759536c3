//! Append-only conversation history.

use super::Message;

/// Ordered, append-only log of role-tagged messages.
///
/// Insertion order is conversation order and is used verbatim as generation
/// context. There is no way to remove or edit an entry, so the length never
/// decreases for the life of the owner.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end of the conversation.
    pub fn append(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Read-only view of every message, oldest first.
    pub fn as_ordered_sequence(&self) -> &[Message] {
        &self.messages
    }

    /// Most recently appended message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render as generation context: one `"{role}: {content}"` line per
    /// message, joined with `\n`, no trailing newline.
    ///
    /// # Example
    /// ```
    /// use lolang_relay::session::{ConversationHistory, Message};
    ///
    /// let mut history = ConversationHistory::new();
    /// history.append(Message::new("a", "hi"));
    /// history.append(Message::new("b", "yo"));
    /// assert_eq!(history.render_as_text(), "a: hi\nb: yo");
    /// ```
    pub fn render_as_text(&self) -> String {
        self.messages
            .iter()
            .map(Message::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
