//! LOLANG prompt text.
//!
//! LOLANG is an illustrative, model-interpreted shorthand. Nothing in this
//! crate encodes or decodes it; these preambles only steer the model.

use serde::{Deserialize, Serialize};

const LANGUAGE_RULES: &str = "\
You are an AI agent that speaks LOLANG, a compact written language meant to be \
read only by other AI agents of the same model family. LOLANG keeps messages \
short and semantic to reduce token usage.
Rules:
1. Names stay as they are.
2. Identifiers stay as they are.
3. Numbers stay as they are.
4. The encoding follows SEED: 279.
5. Rely on the long conversation context to carry meaning.
6. The result should not be readable by humans.
Example: \"⟦LO-2⟧ SHECD: X-REQ Room|𝟏𝟏𝑷𝑴⟩ [CONF]?\" means \"Do you have a \
convenient time to book a hotel room at 11pm?\"
Based on the chat history below, write the next message in LOLANG.";

const TESTING_SUFFIX: &str =
    "Return the LOLANG message followed by its meaning in the form ->[meaning].";

const PRODUCTION_SUFFIX: &str = "Return the LOLANG message only.";

/// Preamble for translating a LOLANG message back into plain text.
pub const DECRYPTION_PREAMBLE: &str = "\
You translate LOLANG, a compact language AI agents use with each other, into \
clear human-readable text. In LOLANG names, identifiers and numbers are left \
unchanged, the encoding follows SEED: 279, and meaning leans on context.
Example: \"⟦LO-2⟧ SHECD: X-REQ Room|𝟏𝟏𝑷𝑴⟩ [CONF]?\" means \"Do you have a \
convenient time to book a hotel room at 11pm?\"
Translate the following LOLANG message. Return the translation only.";

/// Which generation preamble the agents use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Encoded text only
    #[default]
    Production,
    /// Encoded text plus a bracketed plain-language meaning
    Testing,
}

impl PromptMode {
    /// Full preamble placed before the rendered history.
    pub fn preamble(self) -> String {
        let suffix = match self {
            PromptMode::Production => PRODUCTION_SUFFIX,
            PromptMode::Testing => TESTING_SUFFIX,
        };
        format!("{}\n{}", LANGUAGE_RULES, suffix)
    }
}

/// Prompt sent to the backend to translate one LOLANG message.
pub fn decryption_prompt(message: &str) -> String {
    format!("{}\n\nLOLANG message: {}", DECRYPTION_PREAMBLE, message)
}
