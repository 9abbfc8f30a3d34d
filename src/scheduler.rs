//! Background thread that runs registry cleanup on a fixed interval.

use crate::error::Result;
use crate::manager::SubscriptionManager;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Handle to a running cleanup thread. Dropping it stops the thread.
pub struct CleanupScheduler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    /// Spawn the cleanup thread. The first pass runs after one `interval`.
    pub fn start(manager: SubscriptionManager, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("subscription-cleanup".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs(), "cleanup scheduler started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match manager.cleanup() {
                            Ok(report) => debug!(
                                sets_scanned = report.sets_scanned,
                                pointers_removed = report.pointers_removed,
                                failed_checks = report.failed_checks,
                                "scheduled cleanup finished"
                            ),
                            // Retried on the next tick.
                            Err(e) => error!(error = %e, "scheduled cleanup failed"),
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("cleanup scheduler stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for a running pass to finish.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("cleanup thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
