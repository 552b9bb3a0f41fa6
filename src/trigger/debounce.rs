//! Coalescing timer for rapid focus changes.

use crate::aggregator::ContextChange;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coalesces bursts of context-change notifications into one settled event.
///
/// Every notification restarts the quiet-period timer and replaces the pending
/// context, so a fast alt-tab chain settles exactly once, on the final context.
/// Dropping notifications on cancellation is intentional: a change observed
/// moments before shutdown must not fire into a torn-down pipeline.
pub struct SwitchDebouncer {
    input: mpsc::Sender<ContextChange>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl SwitchDebouncer {
    /// Spawn the debounce worker. Settled contexts arrive on `settled`.
    pub fn spawn(quiet_ms: u64, settled: mpsc::Sender<ContextChange>) -> Self {
        let (input, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run(quiet_ms, rx, settled, cancel.clone()));
        Self {
            input,
            cancel,
            worker,
        }
    }

    /// Feed one raw context change. Restarts the quiet period.
    pub async fn notify(&self, change: ContextChange) {
        if self.input.send(change).await.is_err() {
            tracing::warn!("debounce worker gone, dropping context change");
        }
    }

    /// Cancel the pending timer (if any) and stop the worker.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.worker.await;
    }
}

async fn run(
    quiet_ms: u64,
    mut rx: mpsc::Receiver<ContextChange>,
    settled: mpsc::Sender<ContextChange>,
    cancel: CancellationToken,
) {
    let quiet = Duration::from_millis(quiet_ms);
    let mut pending: Option<ContextChange> = None;

    loop {
        match pending.take() {
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = rx.recv() => match change {
                        Some(change) => pending = Some(change),
                        None => break,
                    },
                }
            }
            Some(current) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    // A newer change supersedes the pending one and the
                    // freshly built sleep below restarts the quiet period.
                    change = rx.recv() => match change {
                        Some(change) => pending = Some(change),
                        None => break,
                    },
                    _ = tokio::time::sleep(quiet) => {
                        if settled.send(current).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AppContext;

    fn change(app: &str) -> ContextChange {
        ContextChange::App(AppContext::new(app, "window", ""))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_settles_once_on_last_context() {
        let (tx, mut rx) = mpsc::channel(8);
        let debouncer = SwitchDebouncer::spawn(500, tx);

        debouncer.notify(change("Editor")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.notify(change("Browser")).await;

        let settled = rx.recv().await.unwrap();
        assert_eq!(settled.context().app_name, "Browser");

        // Nothing else arrives after the burst settles.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());

        debouncer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_changes_settle_individually() {
        let (tx, mut rx) = mpsc::channel(8);
        let debouncer = SwitchDebouncer::spawn(500, tx);

        debouncer.notify(change("Editor")).await;
        tokio::time::sleep(Duration::from_millis(700)).await;
        debouncer.notify(change("Browser")).await;
        tokio::time::sleep(Duration::from_millis(700)).await;

        assert_eq!(rx.recv().await.unwrap().context().app_name, "Editor");
        assert_eq!(rx.recv().await.unwrap().context().app_name, "Browser");

        debouncer.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_change() {
        let (tx, mut rx) = mpsc::channel(8);
        let debouncer = SwitchDebouncer::spawn(500, tx);

        debouncer.notify(change("Editor")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.shutdown().await;

        assert!(rx.recv().await.is_none());
    }
}
