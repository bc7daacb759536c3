//! Session module - role-tagged messages and the conversation history
//!
//! Each party (server or client process) owns exactly one
//! [`ConversationHistory`]; it is only ever appended to by that party's
//! conversation loop, so it needs no locking.

mod history;
mod types;

pub use history::ConversationHistory;
pub use types::{Message, CLIENT_AGENT, SERVER_AGENT, USER};
