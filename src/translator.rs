//! Read-only viewer that prints each relayed message next to its translation.
//!
//! The translator connects like any other subscriber but never sends. Every
//! frame it receives is shown in its encoded form and, unless decryption is
//! turned off, followed by the decryptor's plain-language rendering.

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, Instrument};

use crate::display;
use crate::error::Result;
use crate::lolang::Decryptor;
use crate::session::{Message, SERVER_AGENT};
use crate::transport::forward_frames;
use crate::utils::wait_for_shutdown;

/// Produces the lines shown for one relayed message.
pub struct Translator {
    decryptor: Option<Decryptor>,
}

impl Translator {
    /// `None` shows the encoded form only.
    pub fn new(decryptor: Option<Decryptor>) -> Self {
        Self { decryptor }
    }

    /// Banner printed once after connecting.
    pub fn banner(&self) -> Vec<String> {
        let mode = if self.decryptor.is_some() {
            "Translator client connected. Translating all LOLANG messages in real-time."
        } else {
            "Translator client connected. Showing LOLANG messages without translation."
        };
        vec![
            display::format_system(mode),
            display::format_system("Press Ctrl+C to stop the translator."),
            display::format_system("Waiting for messages..."),
            display::separator(),
        ]
    }

    /// Lines for one message: the encoded form, the translation if enabled,
    /// then a separator.
    pub async fn render(&self, msg: &Message) -> Vec<String> {
        let mut lines = vec![display::format_encrypted(msg)];
        if let Some(decryptor) = &self.decryptor {
            let translation = decryptor.decrypt(msg.content()).await;
            lines.push(display::format_translated(msg.role(), &translation));
        }
        lines.push(display::separator());
        lines
    }
}

/// Connect to `url` and print every relayed message until the server closes
/// the connection or `shutdown` is set. Returns the number of messages shown.
pub async fn run_translator(
    url: &str,
    translator: Translator,
    shutdown: watch::Receiver<bool>,
) -> Result<usize> {
    let span = info_span!("translator", url = %url);

    async move {
        let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
        info!("Connected");
        println!("{}", display::colorize("Translator connected to server", display::HEADER));
        let (mut sink, source) = ws.split();

        let (tx, mut rx) = mpsc::channel(64);
        let reader_shutdown = shutdown.clone();
        let peer = url.to_string();
        let reader = tokio::spawn(
            async move { forward_frames(source, &peer, SERVER_AGENT, tx, reader_shutdown).await }
                .in_current_span(),
        );

        for line in translator.banner() {
            println!("{}", line);
        }

        let mut shutdown = shutdown;
        let mut count = 0usize;
        loop {
            let msg = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            // A decrypt may sit in rate-limit backoff; a stop abandons it.
            let lines = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                lines = translator.render(&msg) => lines,
            };
            for line in lines {
                println!("{}", line);
            }
            count += 1;
        }

        reader.abort();
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Close failed");
        }
        println!("{}", display::colorize("Connection closed", display::YELLOW));
        info!(messages = count, "Translator finished");
        Ok(count)
    }
    .instrument(span)
    .await
}
