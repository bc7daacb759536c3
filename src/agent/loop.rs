//! Conversation loop implementation
//!
//! Drives one side of the two-agent conversation: wait for the peer's
//! message, generate a reply over the whole history, broadcast it, repeat
//! until the turn limit or a stop request.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, Instrument, Span};

use crate::error::{RelayError, Result};
use crate::hub::{BroadcastReport, Hub};
use crate::providers::RetryingCaller;
use crate::session::{ConversationHistory, Message};
use crate::utils::wait_for_shutdown;

/// Callback invoked for every message appended to the history.
pub type MessageObserver = Arc<dyn Fn(&Message) + Send + Sync>;

/// Where a [`ConversationLoop`] currently is.
///
/// ```text
/// IDLE ─> AWAITING_INPUT ─> GENERATING ─> BROADCASTING ─┬─> AWAITING_INPUT
///                                                        └─> TERMINATED
/// ```
///
/// A stop request from any state goes straight to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    AwaitingInput,
    Generating,
    Broadcasting,
    Terminated,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::AwaitingInput => "awaiting_input",
            LoopState::Generating => "generating",
            LoopState::Broadcasting => "broadcasting",
            LoopState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Why a loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured number of turns was completed
    MaxTurns,
    /// A stop request was observed
    Cancelled,
    /// The inbound channel closed (the peer went away)
    InboundClosed,
}

/// Summary returned by [`ConversationLoop::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub turns: u32,
    pub reason: StopReason,
}

/// One party of the conversation.
///
/// Owns its history and caller outright; only the hub is shared.
pub struct ConversationLoop {
    role: String,
    history: ConversationHistory,
    caller: RetryingCaller,
    hub: Arc<Hub>,
    inbound: mpsc::Receiver<Message>,
    shutdown: watch::Receiver<bool>,
    max_turns: u32,
    turns: u32,
    state: LoopState,
    observer: Option<MessageObserver>,
    span: Span,
}

impl ConversationLoop {
    /// Create a loop speaking as `role`.
    ///
    /// Replies are broadcast through `hub`; peer messages arrive on `inbound`.
    /// Setting `shutdown` to `true` stops the loop at its next suspension
    /// point.
    pub fn new(
        role: impl Into<String>,
        caller: RetryingCaller,
        hub: Arc<Hub>,
        inbound: mpsc::Receiver<Message>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let role = role.into();
        let span = info_span!("conversation", role = %role);
        Self {
            role,
            history: ConversationHistory::new(),
            caller,
            hub,
            inbound,
            shutdown,
            max_turns: 20,
            turns: 0,
            state: LoopState::Idle,
            observer: None,
            span,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Call `observer` for every message appended to the history.
    pub fn with_observer(mut self, observer: MessageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Emit this loop's events inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Completed turns so far.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn record(&mut self, msg: Message) {
        if let Some(observer) = &self.observer {
            observer(&msg);
        }
        self.history.append(msg);
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = %self.state, to = %next, turn = self.turns, "State change");
        self.state = next;
    }

    /// Append `opener` to the history and broadcast it before the first turn.
    ///
    /// The opener does not count as a turn. Only valid while idle.
    pub async fn open(&mut self, opener: Message) -> Result<BroadcastReport> {
        if self.state != LoopState::Idle {
            return Err(RelayError::Config(format!(
                "cannot open a conversation in state {}",
                self.state
            )));
        }
        let span = self.span.clone();
        async move {
            info!(content_len = opener.content().len(), "Sending opener");
            let report = self.hub.broadcast_message(&opener).await?;
            self.record(opener);
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Run turns until the turn limit, a stop request, the peer leaving, or a
    /// terminal generation failure.
    ///
    /// A terminal failure leaves the loop in [`LoopState::Terminated`] and is
    /// returned as the error. Nothing is broadcast for a failed turn.
    pub async fn run(&mut self) -> Result<LoopOutcome> {
        let span = self.span.clone();
        async move {
            let result = self.drive().await;
            let stage = self.state;
            self.transition(LoopState::Terminated);
            match &result {
                Ok(outcome) => {
                    info!(turns = outcome.turns, reason = ?outcome.reason, "Conversation ended")
                }
                Err(e) => {
                    error!(turns = self.turns, stage = %stage, error = %e, "Conversation aborted")
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> Result<LoopOutcome> {
        let outcome = |turns, reason| Ok(LoopOutcome { turns, reason });

        if self.state == LoopState::Terminated {
            return outcome(self.turns, StopReason::Cancelled);
        }

        loop {
            // AWAITING_INPUT
            if self.is_cancelled() {
                return outcome(self.turns, StopReason::Cancelled);
            }
            if self.turns >= self.max_turns {
                return outcome(self.turns, StopReason::MaxTurns);
            }
            self.transition(LoopState::AwaitingInput);

            let inbound = tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => None,
                msg = self.inbound.recv() => Some(msg),
            };
            let msg = match inbound {
                None => return outcome(self.turns, StopReason::Cancelled),
                Some(None) => {
                    info!("Inbound channel closed");
                    return outcome(self.turns, StopReason::InboundClosed);
                }
                Some(Some(msg)) => msg,
            };
            debug!(from = msg.role(), "Received message");
            self.record(msg);

            // GENERATING
            if self.is_cancelled() {
                return outcome(self.turns, StopReason::Cancelled);
            }
            self.transition(LoopState::Generating);

            // Dropping the generation future abandons the in-flight call.
            let generated = tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => None,
                reply = self.caller.generate(&self.history) => Some(reply),
            };
            let text = match generated {
                None => {
                    info!(turn = self.turns + 1, "Generation abandoned on shutdown");
                    return outcome(self.turns, StopReason::Cancelled);
                }
                Some(reply) => reply?,
            };
            let reply = Message::new(self.role.clone(), text);

            // BROADCASTING
            if self.is_cancelled() {
                return outcome(self.turns, StopReason::Cancelled);
            }
            self.transition(LoopState::Broadcasting);

            // A broadcast that has started always runs to completion.
            let report = self.hub.broadcast_message(&reply).await?;
            self.record(reply);
            self.turns += 1;
            info!(
                turn = self.turns,
                max_turns = self.max_turns,
                delivered = report.delivered,
                "Turn complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::error::ProviderError;
    use crate::hub::{Subscriber, SubscriberId};
    use crate::providers::{GenerationBackend, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Replies "reply-N" to the Nth call.
    struct CountingBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerationBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn call(&self, _prompt: &str, _config: &GenerationConfig) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("reply-{}", n))
        }
    }

    /// Blocks every call until the test shuts the loop down.
    struct StuckBackend {
        entered: Notify,
    }

    #[async_trait]
    impl GenerationBackend for StuckBackend {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn call(&self, _prompt: &str, _config: &GenerationConfig) -> Result<String> {
            self.entered.notify_one();
            std::future::pending().await
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl GenerationBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn call(&self, _prompt: &str, _config: &GenerationConfig) -> Result<String> {
            Err(ProviderError::Auth("invalid key".into()).into())
        }
    }

    struct RecordingSubscriber {
        id: SubscriberId,
        frames: Mutex<Vec<String>>,
    }

    impl RecordingSubscriber {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::next(),
                frames: Mutex::new(Vec::new()),
            })
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Subscriber for RecordingSubscriber {
        fn id(&self) -> SubscriberId {
            self.id
        }

        async fn send(&self, payload: &str) -> Result<()> {
            self.frames.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    struct Harness {
        conversation: ConversationLoop,
        inbound: mpsc::Sender<Message>,
        shutdown: watch::Sender<bool>,
        subscriber: Arc<RecordingSubscriber>,
    }

    fn harness(backend: Arc<dyn GenerationBackend>, max_turns: u32) -> Harness {
        let hub = Arc::new(Hub::new());
        let subscriber = RecordingSubscriber::new();
        hub.register(subscriber.clone());

        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let caller = RetryingCaller::new(backend, GenerationConfig::default())
            .with_policy(RetryPolicy::no_retry());
        let conversation =
            ConversationLoop::new("server-agent", caller, hub, inbound_rx, shutdown_rx)
                .with_max_turns(max_turns);

        Harness {
            conversation,
            inbound: inbound_tx,
            shutdown: shutdown_tx,
            subscriber,
        }
    }

    fn counting() -> Arc<CountingBackend> {
        Arc::new(CountingBackend {
            calls: AtomicU32::new(0),
        })
    }

    #[test]
    fn test_new_loop_is_idle() {
        let h = harness(counting(), 2);
        assert_eq!(h.conversation.state(), LoopState::Idle);
        assert_eq!(h.conversation.turns(), 0);
        assert_eq!(h.conversation.role(), "server-agent");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LoopState::AwaitingInput.to_string(), "awaiting_input");
        assert_eq!(LoopState::Terminated.to_string(), "terminated");
    }

    #[tokio::test]
    async fn test_two_turns_then_terminated() {
        let mut h = harness(counting(), 2);
        h.inbound.send(Message::user("hello")).await.unwrap();
        h.inbound.send(Message::user("again")).await.unwrap();

        let outcome = h.conversation.run().await.unwrap();

        assert_eq!(
            outcome,
            LoopOutcome {
                turns: 2,
                reason: StopReason::MaxTurns
            }
        );
        assert_eq!(h.conversation.state(), LoopState::Terminated);
        assert_eq!(h.subscriber.frames().len(), 2);

        let rendered = h.conversation.history().render_as_text();
        assert_eq!(
            rendered,
            "user: hello\nserver-agent: reply-1\nuser: again\nserver-agent: reply-2"
        );
    }

    #[tokio::test]
    async fn test_cancel_while_generating_skips_broadcast() {
        let backend = Arc::new(StuckBackend {
            entered: Notify::new(),
        });
        let mut h = harness(backend.clone(), 2);
        h.inbound.send(Message::user("hello")).await.unwrap();

        let shutdown = h.shutdown;
        let stopper = tokio::spawn(async move {
            backend.entered.notified().await;
            shutdown.send(true).unwrap();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), h.conversation.run())
            .await
            .unwrap()
            .unwrap();
        stopper.await.unwrap();

        assert_eq!(outcome.reason, StopReason::Cancelled);
        assert_eq!(outcome.turns, 0);
        assert_eq!(h.conversation.state(), LoopState::Terminated);
        assert!(h.subscriber.frames().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_input() {
        let mut h = harness(counting(), 5);
        let shutdown = h.shutdown;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.send(true).unwrap();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), h.conversation.run())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.reason, StopReason::Cancelled);
        assert_eq!(h.conversation.state(), LoopState::Terminated);
    }

    #[tokio::test]
    async fn test_inbound_closed_ends_loop() {
        let mut h = harness(counting(), 5);
        h.inbound.send(Message::user("only one")).await.unwrap();
        drop(h.inbound);

        let outcome = h.conversation.run().await.unwrap();

        assert_eq!(outcome.reason, StopReason::InboundClosed);
        assert_eq!(outcome.turns, 1);
    }

    #[tokio::test]
    async fn test_generation_failure_terminates_without_broadcast() {
        let mut h = harness(Arc::new(FailingBackend), 5);
        h.inbound.send(Message::user("hello")).await.unwrap();

        let err = h.conversation.run().await.unwrap_err();

        assert!(matches!(
            err,
            RelayError::Provider(ProviderError::Auth(_))
        ));
        assert_eq!(h.conversation.state(), LoopState::Terminated);
        assert!(h.subscriber.frames().is_empty());
        // the inbound message is kept, no reply is fabricated
        assert_eq!(h.conversation.history().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_max_turns_terminates_immediately() {
        let mut h = harness(counting(), 0);
        let outcome = h.conversation.run().await.unwrap();
        assert_eq!(outcome.reason, StopReason::MaxTurns);
        assert_eq!(outcome.turns, 0);
    }

    #[tokio::test]
    async fn test_opener_is_broadcast_but_not_a_turn() {
        let mut h = harness(counting(), 1);
        h.conversation.open(Message::client("hi there")).await.unwrap();

        assert_eq!(h.conversation.turns(), 0);
        assert_eq!(h.conversation.history().len(), 1);
        assert_eq!(
            h.subscriber.frames(),
            vec![r#"{"role":"client-agent","content":"hi there"}"#.to_string()]
        );

        h.inbound.send(Message::server("reply")).await.unwrap();
        let outcome = h.conversation.run().await.unwrap();
        assert_eq!(outcome.turns, 1);
        assert_eq!(h.subscriber.frames().len(), 2);
    }

    #[tokio::test]
    async fn test_open_after_termination_is_rejected() {
        let mut h = harness(counting(), 0);
        h.conversation.run().await.unwrap();
        assert!(h.conversation.open(Message::client("late")).await.is_err());
    }

    #[tokio::test]
    async fn test_observer_sees_every_appended_message() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut h = harness(counting(), 1);
        h.conversation = h
            .conversation
            .with_observer(Arc::new(move |m: &Message| sink.lock().unwrap().push(m.render())));

        h.inbound.send(Message::user("hello")).await.unwrap();
        h.conversation.run().await.unwrap();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["user: hello", "server-agent: reply-1"]
        );
    }
}
