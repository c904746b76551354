use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::trace;

use crate::Error;
use crate::Notification;
use crate::Result;

/// Producer side of the hand-off queue.
///
/// `send` never fails synchronously: rejections resolve the notification's
/// promise, or land on the error channel when it has none.
pub(crate) struct Dispatcher {
    tx: RwLock<Option<mpsc::Sender<Notification>>>,
    errors: mpsc::Sender<Error>,
    max_batch_items: usize,
}

impl Dispatcher {
    pub(crate) fn new(
        tx: mpsc::Sender<Notification>,
        errors: mpsc::Sender<Error>,
        max_batch_items: usize,
    ) -> Self {
        Self {
            tx: RwLock::new(Some(tx)),
            errors,
            max_batch_items,
        }
    }

    /// Admits `n` and hands it to the sender loop, waiting at most until the
    /// queue has room or the notification's context ends.
    pub(crate) async fn send(
        &self,
        mut n: Notification,
    ) {
        let count = n.item_count();
        if count > self.max_batch_items {
            debug!(count, max = self.max_batch_items, "rejecting oversized batch");
            n.resolve(
                Err(Error::BatchTooLarge {
                    count,
                    max: self.max_batch_items,
                }),
                &self.errors,
            );
            return;
        }
        if let Some(e) = n.ctx().err() {
            n.resolve(Err(e), &self.errors);
            return;
        }

        let Some(tx) = self.tx.read().clone() else {
            n.resolve(Err(Error::Closed), &self.errors);
            return;
        };

        let ctx = n.ctx().clone();
        tokio::select! {
            biased;
            permit = tx.reserve() => match permit {
                Ok(permit) => {
                    trace!(count, "notification queued");
                    permit.send(n);
                }
                Err(_) => n.resolve(Err(Error::Closed), &self.errors),
            },
            e = ctx.done() => {
                debug!("context ended while waiting for the queue: {}", e);
                n.resolve(Err(e), &self.errors);
            }
        }
    }

    /// Resolves a notification that never needs the queue.
    pub(crate) fn settle(
        &self,
        mut n: Notification,
        outcome: Result<()>,
    ) {
        n.resolve(outcome, &self.errors);
    }

    /// Stops accepting work. The sender loop drains what was already queued.
    pub(crate) fn close(&self) {
        self.tx.write().take();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.read().is_none()
    }
}
