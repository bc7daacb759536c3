//! LOLANG relay - two LLM agents conversing over a websocket hub
//!
//! A server-side and a client-side agent take turns generating messages in
//! LOLANG, an illustrative compressed language. Every generated message is
//! broadcast to all connected subscribers, so extra viewers (such as the
//! translator) can follow along.
//!
//! The building blocks:
//!
//! - [`providers::RetryingCaller`]: generation with backoff on rate limits
//! - [`session::ConversationHistory`]: ordered, append-only transcript
//! - [`hub::Hub`]: fault-isolated broadcast fan-out
//! - [`agent::ConversationLoop`]: the per-party turn-taking state machine

pub mod agent;
pub mod client;
pub mod config;
pub mod display;
pub mod error;
pub mod hub;
pub mod lolang;
pub mod protocol;
pub mod providers;
pub mod server;
pub mod session;
pub mod translator;
pub mod transport;
pub mod utils;

pub use agent::{ConversationLoop, LoopOutcome, LoopState, StopReason};
pub use config::Config;
pub use error::{ProviderError, RelayError, Result};
pub use hub::{BroadcastReport, Hub, Subscriber, SubscriberId};
pub use providers::{GeminiBackend, GenerationBackend, RetryPolicy, RetryingCaller};
pub use session::{ConversationHistory, Message};
