//! Agent module - the per-party conversation state machine
//!
//! A [`ConversationLoop`] is one side of the dialogue. The server and the
//! client each run one, differing only in role, in where inbound messages
//! come from, and in whether they open the conversation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌────────────────┐
//! │  peer frames│────>│ ConversationLoop │────>│ RetryingCaller │
//! │  (mpsc)     │     │                  │<────│  (backend)     │
//! └─────────────┘     └────────┬─────────┘     └────────────────┘
//!                              │
//!                              ▼
//!                       ┌─────────────┐
//!                       │     Hub     │──> subscribers
//!                       └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio::sync::{mpsc, watch};
//! use lolang_relay::agent::ConversationLoop;
//! use lolang_relay::hub::Hub;
//!
//! let (inbound_tx, inbound_rx) = mpsc::channel(32);
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let mut conversation =
//!     ConversationLoop::new("server-agent", caller, Arc::new(Hub::new()), inbound_rx, shutdown_rx)
//!         .with_max_turns(20);
//!
//! let outcome = conversation.run().await?;
//! println!("finished after {} turns", outcome.turns);
//! ```

mod r#loop;

pub use r#loop::{ConversationLoop, LoopOutcome, LoopState, MessageObserver, StopReason};
