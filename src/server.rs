//! Server side of the relay.
//!
//! Listens for websocket connections, registers each one with the [`Hub`],
//! and feeds every inbound frame to the server's [`ConversationLoop`]. Each
//! generated reply is broadcast to all connected subscribers.
//!
//! ```text
//!  client ──ws──┐                          ┌──> client
//!  viewer ──ws──┼─> reader ─> mpsc ─> loop ─> hub ──> viewer
//!  ...    ──ws──┘                          └──> ...
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::agent::{ConversationLoop, LoopOutcome, MessageObserver};
use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::hub::{Hub, Subscriber, WsSubscriber};
use crate::providers::{GenerationBackend, RetryPolicy, RetryingCaller};
use crate::session::{Message, SERVER_AGENT, USER};
use crate::transport::forward_frames;
use crate::utils::wait_for_shutdown;

/// Capacity of the channel carrying inbound messages to the loop.
const INBOUND_BUFFER: usize = 64;

/// How long a fresh TCP connection may take to complete the upgrade.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts websocket connections and wires them into a hub.
pub struct RelayServer {
    listener: TcpListener,
    hub: Arc<Hub>,
    inbound: mpsc::Sender<Message>,
    span: Span,
}

impl RelayServer {
    /// Bind to `addr` (`host:port`; port 0 picks a free one).
    pub async fn bind(addr: &str, hub: Arc<Hub>, inbound: mpsc::Sender<Message>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let span = info_span!("server", addr = %local);
        span.in_scope(|| info!("Listening on ws://{}", local));
        Ok(Self {
            listener,
            hub,
            inbound,
            span,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` becomes `true`, then stop
    /// accepting, wait for the connection readers, and close every
    /// subscriber.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let Self {
            listener,
            hub,
            inbound,
            span,
        } = self;

        async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => {
                        info!("Shutdown requested, no longer accepting connections");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            connections.spawn(
                                handle_connection(
                                    stream,
                                    peer,
                                    hub.clone(),
                                    inbound.clone(),
                                    shutdown.clone(),
                                )
                                .instrument(info_span!("connection", peer = %peer)),
                            );
                        }
                        Err(e) => warn!(error = %e, "Accept failed"),
                    },
                    // reap finished connection tasks as they complete
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                }
            }

            drop(listener);
            while connections.join_next().await.is_some() {}
            hub.close_all().await;
            info!("Server closed");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// Upgrade one TCP connection, register it, and pump its frames into the
/// conversation until it closes.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<Hub>,
    inbound: mpsc::Sender<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream));
    let ws = tokio::select! {
        _ = wait_for_shutdown(&mut shutdown) => {
            debug!("Shutdown during handshake, dropping connection");
            return;
        }
        upgraded = handshake => match upgraded {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                warn!(error = %RelayError::from(e), "Websocket handshake failed");
                return;
            }
            Err(_) => {
                warn!(timeout = ?HANDSHAKE_TIMEOUT, "Websocket handshake timed out");
                return;
            }
        },
    };
    let (sink, source) = ws.split();
    let peer = peer.to_string();
    let subscriber = Arc::new(WsSubscriber::new(peer.clone(), sink));
    let id = subscriber.id();
    hub.register(subscriber);

    let end = forward_frames(source, &peer, USER, inbound, shutdown).await;
    debug!(reason = ?end, "Reader finished");

    // Already gone if a broadcast to it failed first.
    hub.unregister(id);
}

/// Options for [`run_server`] beyond the config file.
#[derive(Default)]
pub struct ServerOptions {
    /// Print every inbound and generated message
    pub observer: Option<MessageObserver>,
}

/// Run the server-side agent: bind, serve connections, and converse until
/// the turn limit or `shutdown`. Stops serving once the conversation ends.
pub async fn run_server(
    config: &Config,
    backend: Arc<dyn GenerationBackend>,
    options: ServerOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<LoopOutcome> {
    let hub = Arc::new(Hub::new());
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let server = RelayServer::bind(&config.server.bind_addr(), hub.clone(), inbound_tx).await?;

    // The accept loop gets its own stop signal so it can be ended when the
    // conversation finishes on its own.
    let (serve_stop_tx, serve_stop_rx) = watch::channel(false);
    let serving = tokio::spawn(server.serve(serve_stop_rx));

    let outcome = converse_as_server(config, backend, options, hub, inbound_rx, shutdown).await;

    let _ = serve_stop_tx.send(true);
    match serving.await {
        Ok(Err(e)) => warn!(error = %e, "Server stopped with error"),
        Err(e) => warn!(error = %e, "Server task failed"),
        Ok(Ok(())) => {}
    }
    outcome
}

async fn converse_as_server(
    config: &Config,
    backend: Arc<dyn GenerationBackend>,
    options: ServerOptions,
    hub: Arc<Hub>,
    inbound: mpsc::Receiver<Message>,
    shutdown: watch::Receiver<bool>,
) -> Result<LoopOutcome> {
    let caller = RetryingCaller::new(backend, config.generation.clone())
        .with_policy(RetryPolicy::from(&config.retry))
        .with_preamble(config.conversation.prompt_mode.preamble())
        .with_message_delay(config.conversation.message_delay())
        .with_span(info_span!("generate", role = SERVER_AGENT));

    let mut conversation = ConversationLoop::new(SERVER_AGENT, caller, hub, inbound, shutdown)
        .with_max_turns(config.conversation.max_turns);
    if let Some(observer) = options.observer {
        conversation = conversation.with_observer(observer);
    }
    conversation.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    async fn start() -> (
        SocketAddr,
        Arc<Hub>,
        mpsc::Receiver<Message>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let hub = Arc::new(Hub::new());
        let (tx, rx) = mpsc::channel(8);
        let server = RelayServer::bind("127.0.0.1:0", hub.clone(), tx)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(server.serve(stop_rx));
        (addr, hub, rx, stop_tx, handle)
    }

    async fn wait_for_subscribers(hub: &Hub, n: usize) {
        for _ in 0..200 {
            if hub.len() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("hub never reached {} subscribers (has {})", n, hub.len());
    }

    #[tokio::test]
    async fn test_inbound_frames_reach_conversation() {
        let (addr, hub, mut rx, stop_tx, handle) = start().await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();
        wait_for_subscribers(&hub, 1).await;

        ws.send(WsMessage::text(r#"{"content":"hello"}"#)).await.unwrap();
        ws.send(WsMessage::text("not json")).await.unwrap();
        ws.send(WsMessage::text(r#"{"role":"client-agent","content":"again"}"#))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), Message::user("hello"));
        assert_eq!(rx.recv().await.unwrap(), Message::client("again"));

        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let (addr, hub, _rx, stop_tx, handle) = start().await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();
        wait_for_subscribers(&hub, 1).await;

        ws.close(None).await.unwrap();
        wait_for_subscribers(&hub, 0).await;

        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_broadcast_reaches_connected_clients() {
        let (addr, hub, _rx, stop_tx, handle) = start().await;

        let url = format!("ws://{}", addr);
        let (mut a, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (mut b, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        wait_for_subscribers(&hub, 2).await;

        let report = hub.broadcast_message(&Message::server("hi")).await.unwrap();
        assert_eq!(report.delivered, 2);

        for ws in [&mut a, &mut b] {
            let frame = ws.next().await.unwrap().unwrap();
            assert_eq!(
                frame.into_text().unwrap().as_str(),
                r#"{"role":"server-agent","content":"hi"}"#
            );
        }

        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stalled_handshake_does_not_block_shutdown() {
        let (addr, hub, _rx, stop_tx, handle) = start().await;

        // Plain TCP, never sends the upgrade request.
        let _silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("serve returned after stop")
            .unwrap()
            .unwrap();
        assert!(hub.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_handshake_times_out() {
        let hub = Arc::new(Hub::new());
        let (tx, _rx) = mpsc::channel(8);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _silent = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);

        // Returns once the handshake deadline passes on the paused clock.
        handle_connection(stream, peer, hub.clone(), tx, stop_rx).await;
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_broken_subscriber_does_not_starve_others() {
        let (addr, hub, _rx, stop_tx, handle) = start().await;

        let url = format!("ws://{}", addr);
        let (mut healthy, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (gone, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        wait_for_subscribers(&hub, 2).await;

        drop(gone);
        // The first send to a reset socket may still be buffered, so keep
        // broadcasting until the hub notices.
        for i in 0..20 {
            hub.broadcast_message(&Message::server(format!("m{}", i)))
                .await
                .unwrap();
            if hub.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hub.len(), 1);

        let frame = healthy.next().await.unwrap().unwrap();
        assert_eq!(
            frame.into_text().unwrap().as_str(),
            r#"{"role":"server-agent","content":"m0"}"#
        );

        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
