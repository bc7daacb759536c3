//! Utils module - logging setup and shutdown signalling helpers

pub mod logging;

use tokio::sync::watch;

/// Create the shutdown pair shared by every long-running task.
///
/// Sending `true` asks all holders of a receiver to stop.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolve once `shutdown` holds `true`.
///
/// If the sender is dropped without signalling, nobody can ask for a stop any
/// more and this never resolves.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
