//! Subscriber handles held by the hub.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use crate::error::{RelayError, Result};

/// Connection identity of a subscriber.
///
/// Two handles are the same subscriber only if they carry the same id;
/// payload contents play no part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An open bidirectional connection that can receive broadcast payloads.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    /// Human-readable peer description for logs.
    fn peer(&self) -> String {
        self.id().to_string()
    }

    /// Deliver one text payload.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConnectionLost`] if the connection can no longer
    /// carry data.
    async fn send(&self, payload: &str) -> Result<()>;

    /// Close the connection. Closing an already closed connection is not an
    /// error worth surfacing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Subscriber backed by the write half of a websocket.
///
/// Generic over the sink so both accepted (server) and dialed (client)
/// streams can be used.
pub struct WsSubscriber<K> {
    id: SubscriberId,
    peer: String,
    sink: Mutex<K>,
}

impl<K> WsSubscriber<K> {
    pub fn new(peer: impl Into<String>, sink: K) -> Self {
        Self {
            id: SubscriberId::next(),
            peer: peer.into(),
            sink: Mutex::new(sink),
        }
    }
}

impl<K> fmt::Debug for WsSubscriber<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSubscriber")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

#[async_trait]
impl<K> Subscriber for WsSubscriber<K>
where
    K: Sink<WsMessage, Error = WsError> + Unpin + Send + 'static,
{
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }

    async fn send(&self, payload: &str) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::text(payload.to_string()))
            .await
            .map_err(|e| RelayError::ConnectionLost(format!("{}: {}", self.peer, e)))
    }

    async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(RelayError::ConnectionLost(format!("{}: {}", self.peer, e))),
        }
    }
}
