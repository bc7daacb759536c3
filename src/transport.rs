//! Websocket read side shared by the server, client and translator.
//!
//! Each connection's read half is pumped by [`forward_frames`], which decodes
//! text frames into [`Message`]s and hands them to an mpsc channel. Malformed
//! frames are reported and dropped; the connection stays up.

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use crate::protocol::decode_frame;
use crate::session::Message;
use crate::utils::wait_for_shutdown;

/// Why a reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    /// The peer sent a close frame or the stream ended
    PeerClosed,
    /// The transport failed
    TransportError,
    /// Nobody is listening for messages any more
    ReceiverDropped,
    /// Shutdown was requested
    Shutdown,
}

/// Decode frames from `source` and forward them to `tx` until the stream
/// ends, the receiver goes away, or `shutdown` becomes `true`.
///
/// Frames without a `role` are attributed to `default_role`.
pub async fn forward_frames<S>(
    mut source: S,
    peer: &str,
    default_role: &str,
    tx: mpsc::Sender<Message>,
    mut shutdown: watch::Receiver<bool>,
) -> ReadEnd
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => return ReadEnd::Shutdown,
            frame = source.next() => frame,
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => match decode_frame(text.as_str(), default_role) {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        debug!(peer, "Receiver dropped, stopping reader");
                        return ReadEnd::ReceiverDropped;
                    }
                }
                Err(e) => warn!(peer, error = %e, "Dropping malformed frame"),
            },
            Some(Ok(WsMessage::Binary(bytes))) => {
                warn!(peer, len = bytes.len(), "Dropping binary frame");
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                info!(peer, "Peer closed connection");
                return ReadEnd::PeerClosed;
            }
            // ping/pong are answered by tungstenite itself
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(peer, error = %e, "Websocket read failed");
                return ReadEnd::TransportError;
            }
        }
    }
}
