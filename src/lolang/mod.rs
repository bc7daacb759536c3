//! LOLANG prompts and the decryptor used by the translator client.

mod decryptor;
mod prompt;

pub use decryptor::Decryptor;
pub use prompt::{decryption_prompt, PromptMode, DECRYPTION_PREAMBLE};
