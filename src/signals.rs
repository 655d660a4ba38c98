use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
///
/// Handlers are installed before this returns, so a signal arriving
/// right after startup is not lost.
pub fn listen(shutdown: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => debug!("Received SIGINT"),
            _ = terminate.recv() => debug!("Received SIGTERM"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    }))
}
