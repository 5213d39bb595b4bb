//! Interrupt handling shared by the command line tools
//!
//! The first SIGINT, SIGTERM or SIGHUP requests a clean stop by cancelling a token. A second one
//! exits the process at once with [`FORCED_EXIT_STATUS`].
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::mpsc::{unbounded_channel, UnboundedReceiver},
};
use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces an immediate exit
pub const FORCED_EXIT_STATUS: i32 = 130;

/// Cancel `shutdown` on SIGINT, SIGTERM or SIGHUP
///
/// A second signal exits the process without waiting for the run to stop.
pub fn spawn_signal_handler(shutdown: CancellationToken) -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let (tx, rx) = unbounded_channel();

    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
                _ = sighup.recv() => "SIGHUP",
            };
            if tx.send(name).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        if let Some(name) = watch_interrupts(rx, shutdown).await {
            log::warn!("Received {name} again, exiting");
            std::process::exit(FORCED_EXIT_STATUS);
        }
    });
    Ok(())
}

/// Cancel `shutdown` when the first signal arrives on `signals`, then wait for another
///
/// Returns the name of the second signal, or None if the channel closes before one arrives.
pub async fn watch_interrupts(
    mut signals: UnboundedReceiver<&'static str>,
    shutdown: CancellationToken,
) -> Option<&'static str> {
    let name = signals.recv().await?;
    log::info!("Received {name}, stopping");
    shutdown.cancel();
    signals.recv().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_signal_cancels() {
        let (tx, rx) = unbounded_channel();
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(watch_interrupts(rx, shutdown.clone()));

        tx.send("SIGTERM").unwrap();
        shutdown.cancelled().await;
        assert!(!watcher.is_finished());

        tx.send("SIGINT").unwrap();
        assert_eq!(Some("SIGINT"), watcher.await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (tx, rx) = unbounded_channel::<&'static str>();
        let shutdown = CancellationToken::new();
        drop(tx);
        assert_eq!(None, watch_interrupts(rx, shutdown.clone()).await);
        assert!(!shutdown.is_cancelled());

        // One signal and no more
        let (tx, rx) = unbounded_channel();
        tx.send("SIGHUP").unwrap();
        drop(tx);
        assert_eq!(None, watch_interrupts(rx, shutdown.clone()).await);
        assert!(shutdown.is_cancelled());
    }
}
