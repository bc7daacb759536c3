//! Client side of the relay.
//!
//! Dials the server, opens the conversation, then answers every server
//! message. The single server connection is held in a client-local [`Hub`],
//! so the client runs the same [`ConversationLoop`] as the server.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, Instrument};

use crate::agent::{ConversationLoop, LoopOutcome, MessageObserver};
use crate::config::Config;
use crate::error::Result;
use crate::hub::{Hub, WsSubscriber};
use crate::providers::{GenerationBackend, RetryPolicy, RetryingCaller};
use crate::session::{Message, CLIENT_AGENT, SERVER_AGENT};
use crate::transport::forward_frames;

const INBOUND_BUFFER: usize = 64;

/// Options for [`run_client`].
#[derive(Default)]
pub struct ClientOptions {
    /// Server URL; defaults to the configured server address
    pub url: Option<String>,
    /// Opening message; defaults to `conversation.initial_message`
    pub opener: Option<String>,
    /// Print every sent and received message
    pub observer: Option<MessageObserver>,
}

/// Connect to the server and run the client-side agent until the turn
/// limit, `shutdown`, or the server going away.
pub async fn run_client(
    config: &Config,
    backend: Arc<dyn GenerationBackend>,
    options: ClientOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<LoopOutcome> {
    let url = options.url.unwrap_or_else(|| config.server.url());
    let span = info_span!("client", url = %url);

    async move {
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!("Connected");
        let (sink, source) = ws.split();

        let hub = Arc::new(Hub::new().with_span(info_span!("hub", side = "client")));
        hub.register(Arc::new(WsSubscriber::new(url.clone(), sink)));

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let reader_shutdown = shutdown.clone();
        let reader_peer = url.clone();
        let reader = tokio::spawn(
            async move {
                let end =
                    forward_frames(source, &reader_peer, SERVER_AGENT, inbound_tx, reader_shutdown)
                        .await;
                debug!(reason = ?end, "Reader finished");
            }
            .in_current_span(),
        );

        let caller = RetryingCaller::new(backend, config.generation.clone())
            .with_policy(RetryPolicy::from(&config.retry))
            .with_preamble(config.conversation.prompt_mode.preamble())
            .with_message_delay(config.conversation.message_delay())
            .with_span(info_span!("generate", role = CLIENT_AGENT));

        let mut conversation =
            ConversationLoop::new(CLIENT_AGENT, caller, hub.clone(), inbound_rx, shutdown)
                .with_max_turns(config.conversation.max_turns);
        if let Some(observer) = options.observer {
            conversation = conversation.with_observer(observer);
        }

        let opener = options
            .opener
            .unwrap_or_else(|| config.conversation.initial_message.clone());
        let outcome = match conversation.open(Message::client(opener)).await {
            Ok(_) => conversation.run().await,
            Err(e) => Err(e),
        };

        hub.close_all().await;
        reader.abort();
        info!("Connection closed");
        outcome
    }
    .instrument(span)
    .await
}
