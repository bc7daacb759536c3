//! Terminal rendering of the conversation transcript.
//!
//! Formatting functions return strings so they can be tested; the `print_*`
//! helpers write them to stdout. Diagnostics go through `tracing` instead.

use std::sync::Arc;

use crate::agent::MessageObserver;
use crate::session::Message;

pub const HEADER: &str = "\x1b[95m";
pub const BLUE: &str = "\x1b[94m";
pub const CYAN: &str = "\x1b[96m";
pub const GREEN: &str = "\x1b[92m";
pub const YELLOW: &str = "\x1b[93m";
pub const RED: &str = "\x1b[91m";
pub const RESET: &str = "\x1b[0m";

/// Width of the separator line printed between translated messages.
pub const SEPARATOR_WIDTH: usize = 80;

pub fn colorize(text: &str, color: &str) -> String {
    format!("{}{}{}", color, text, RESET)
}

/// Human-facing name for a wire role.
///
/// # Example
/// ```
/// use lolang_relay::display::display_role;
///
/// assert_eq!(display_role("server-agent"), "Server");
/// assert_eq!(display_role("client-agent"), "Client");
/// assert_eq!(display_role("user"), "User");
/// ```
pub fn display_role(role: &str) -> String {
    role.replace("-agent", "")
        .split('-')
        .map(title_case)
        .collect::<Vec<_>>()
        .join("-")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Colour used for a role's own messages.
pub fn role_color(role: &str) -> &'static str {
    let lower = role.to_lowercase();
    if lower.contains("server") {
        BLUE
    } else if lower.contains("client") {
        GREEN
    } else {
        YELLOW
    }
}

/// Colour used for a role's translated messages.
fn translated_color(role: &str) -> &'static str {
    if role.to_lowercase().contains("server") {
        CYAN
    } else {
        YELLOW
    }
}

/// `"{Role}: {content}"` in the role's colour.
pub fn format_message(msg: &Message) -> String {
    colorize(
        &format!("{}: {}", display_role(msg.role()), msg.content()),
        role_color(msg.role()),
    )
}

pub fn format_system(text: &str) -> String {
    colorize(&format!("System: {}", text), HEADER)
}

pub fn format_error(text: &str) -> String {
    colorize(&format!("Error: {}", text), RED)
}

pub fn format_encrypted(msg: &Message) -> String {
    let color = if msg.role().to_lowercase().contains("server") {
        BLUE
    } else {
        GREEN
    };
    colorize(
        &format!("[ENCRYPTED] {}: {}", display_role(msg.role()), msg.content()),
        color,
    )
}

pub fn format_translated(role: &str, translation: &str) -> String {
    colorize(
        &format!("[TRANSLATED] {}: {}", display_role(role), translation),
        translated_color(role),
    )
}

pub fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

pub fn print_message(msg: &Message) {
    println!("{}", format_message(msg));
}

pub fn print_system(text: &str) {
    println!("{}", format_system(text));
}

pub fn print_error(text: &str) {
    println!("{}", format_error(text));
}

/// A [`MessageObserver`] that prints every message of a conversation.
pub fn transcript_printer() -> MessageObserver {
    Arc::new(print_message)
}
