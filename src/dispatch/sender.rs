use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::SendProtocol;
use crate::Error;
use crate::Notification;

/// The single consumer of the hand-off queue. Notifications are sent one at
/// a time in arrival order; a failure resolves that notification and the loop
/// moves on.
pub(crate) struct SenderLoop {
    rx: mpsc::Receiver<Notification>,
    errors: mpsc::Sender<Error>,
    protocol: SendProtocol,
}

impl SenderLoop {
    pub(crate) fn new(
        rx: mpsc::Receiver<Notification>,
        errors: mpsc::Sender<Error>,
        protocol: SendProtocol,
    ) -> Self {
        Self {
            rx,
            errors,
            protocol,
        }
    }

    /// Starts the loop. The handle completes once the queue is closed and
    /// drained.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub(crate) async fn run(mut self) {
        info!("sender loop started");
        let mut sent: u64 = 0;
        let mut failed: u64 = 0;

        while let Some(mut n) = self.rx.recv().await {
            let outcome = self.protocol.send(&mut n).await;
            match &outcome {
                Ok(()) => sent += 1,
                Err(e) => {
                    failed += 1;
                    warn!("notification delivery failed: {}", e);
                }
            }
            debug!(sent, failed, has_promise = n.has_promise(), "notification processed");
            n.resolve(outcome, &self.errors);
        }

        info!(sent, failed, "sender loop stopped");
    }
}
