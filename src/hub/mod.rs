//! Hub Module
//!
//! The `Hub` owns the set of connected subscribers and fans one payload out to
//! all of them.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!  register ─────────> │     Hub      │ <───────── unregister
//!                      │ {subscribers}│
//!                      └──────┬───────┘
//!                             │ broadcast(payload)
//!              ┌──────────────┼──────────────┐
//!              ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  sub-1   │   │  sub-2   │   │  sub-3   │   (concurrent sends)
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! The set lock is only ever held to mutate the set or to take a snapshot;
//! it is never held across a send. A broadcast works on the snapshot taken
//! when it starts, so connections arriving or leaving mid-broadcast are safe.
//! Every send and close is bounded by the hub's send timeout, so a peer that
//! stops reading is dropped instead of stalling the fan-out.

mod subscriber;

pub use subscriber::{Subscriber, SubscriberId, WsSubscriber};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::error::{RelayError, Result};
use crate::protocol::encode_frame;
use crate::session::Message;

type SubscriberMap = HashMap<SubscriberId, Arc<dyn Subscriber>>;

/// Default bound on a single send or close.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Number of subscribers that accepted the payload
    pub delivered: usize,
    /// Subscribers whose send failed; they have been unregistered
    pub failed: Vec<SubscriberId>,
}

impl BroadcastReport {
    /// Number of subscribers the broadcast was attempted on.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Registry of live subscribers with fault-isolated fan-out.
pub struct Hub {
    subscribers: Mutex<SubscriberMap>,
    send_timeout: Duration,
    span: Span,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            span: info_span!("hub"),
        }
    }

    /// Treat a subscriber as lost when one send takes longer than `timeout`.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Emit this hub's events inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SubscriberMap> {
        // The map stays consistent even if a holder panicked: every critical
        // section is a single insert, remove or clone.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a subscriber to the active set.
    ///
    /// Registering the same id twice replaces the earlier handle.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id();
        let peer = subscriber.peer();
        let total = {
            let mut subs = self.lock();
            subs.insert(id, subscriber);
            subs.len()
        };
        self.span.in_scope(|| info!(%id, peer = %peer, total, "Subscriber connected"));
    }

    /// Remove a subscriber if present. Returns whether it was registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, total) = {
            let mut subs = self.lock();
            let removed = subs.remove(&id).is_some();
            (removed, subs.len())
        };
        if removed {
            self.span
                .in_scope(|| info!(%id, total, "Subscriber disconnected"));
        }
        removed
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Consistent copy of the current subscriber set.
    pub fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.lock().values().cloned().collect()
    }

    /// Send `payload` to every subscriber registered when the call starts.
    ///
    /// Sends run concurrently and are all awaited; one subscriber failing
    /// does not affect delivery to the others. Failed subscribers are
    /// unregistered once every send has finished.
    pub async fn broadcast(&self, payload: &str) -> BroadcastReport {
        let targets = self.snapshot();
        let span = self.span.clone();
        let limit = self.send_timeout;

        async move {
            if targets.is_empty() {
                debug!("Broadcast with no subscribers");
                return BroadcastReport::default();
            }

            let results = join_all(targets.iter().map(|sub| async move {
                let sent = match tokio::time::timeout(limit, sub.send(payload)).await {
                    Ok(sent) => sent,
                    Err(_) => Err(RelayError::ConnectionLost(format!(
                        "{}: send timed out after {:?}",
                        sub.peer(),
                        limit
                    ))),
                };
                (sub.id(), sub.peer(), sent)
            }))
            .await;

            let mut report = BroadcastReport::default();
            for (id, peer, result) in results {
                match result {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!(%id, peer = %peer, error = %e, "Send failed, dropping subscriber");
                        report.failed.push(id);
                    }
                }
            }

            for id in &report.failed {
                self.unregister(*id);
            }

            debug!(
                delivered = report.delivered,
                failed = report.failed.len(),
                "Broadcast complete"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Encode `msg` as a wire frame and broadcast it.
    pub async fn broadcast_message(&self, msg: &Message) -> Result<BroadcastReport> {
        let frame = encode_frame(msg)?;
        Ok(self.broadcast(&frame).await)
    }

    /// Close and unregister every subscriber. Used during shutdown.
    pub async fn close_all(&self) {
        let targets: Vec<Arc<dyn Subscriber>> = self.lock().drain().map(|(_, s)| s).collect();
        let span = self.span.clone();
        let limit = self.send_timeout;

        async move {
            let results = join_all(targets.iter().map(|sub| async move {
                (sub.peer(), tokio::time::timeout(limit, sub.close()).await)
            }))
            .await;
            for (peer, result) in results {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(peer = %peer, error = %e, "Close failed"),
                    Err(_) => debug!(peer = %peer, "Close timed out"),
                }
            }
            if !targets.is_empty() {
                info!(closed = targets.len(), "Closed all subscribers");
            }
        }
        .instrument(span)
        .await
    }
}
