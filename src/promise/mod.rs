//! Reusable completion signals.
//!
//! A [`Promise`] is the awaiting half of a single-slot channel; the matching
//! [`Resolver`] travels with the notification to whichever side writes the
//! outcome. Slots are recycled through a [`PromisePool`] so steady-state
//! delivery does not allocate a channel per request.
//!
//! Lifecycle: `Unused -> Awaiting -> Resolved -> (released) -> Unused`.

mod pool;

pub use pool::*;


use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::error;

use crate::metrics::Metrics;
use crate::Context;
use crate::Error;
use crate::Result;

/// What a completion signal carries.
pub(crate) type Outcome = Result<()>;

/// One buffered single-slot channel. `holders` counts the promise plus every
/// live resolver so a slot still reachable by a writer never re-enters the pool.
pub(crate) struct Slot {
    tx: mpsc::Sender<Outcome>,
    rx: mpsc::Receiver<Outcome>,
    holders: Arc<()>,
}

impl Slot {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx,
            holders: Arc::new(()),
        }
    }

    /// Removes at most one pending value, reporting whether one was there.
    fn drain(&mut self) -> bool {
        matches!(self.rx.try_recv(), Ok(_))
    }

    fn is_shared(&self) -> bool {
        Arc::strong_count(&self.holders) > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// Handed out, no resolver issued yet
    Unused,
    /// A resolver has been issued and the outcome is not yet observed
    Awaiting,
    /// The outcome was observed by [`Promise::wait`] or [`Promise::try_take`]
    Resolved,
}

/// The awaiting half of a completion signal.
pub struct Promise {
    slot: Slot,
    state: PromiseState,
    pool: Arc<PromisePool>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Promise {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Promise").field("state", &self.state).finish()
    }
}

impl Promise {
    pub fn state(&self) -> PromiseState {
        self.state
    }

    /// Issues the writing half. Only called on a freshly acquired promise.
    fn issue_resolver(&mut self) -> Resolver {
        self.state = PromiseState::Awaiting;
        Resolver {
            tx: self.slot.tx.clone(),
            _holder: self.slot.holders.clone(),
        }
    }

    /// Blocks until the outcome is resolved or `ctx` ends. An ended context
    /// yields [`Error::PromiseTimeout`] so callers can tell an expired wait
    /// from a failed send. An outcome that is already available wins over an
    /// ended context.
    pub async fn wait(
        &mut self,
        ctx: &Context,
    ) -> Result<()> {
        if let Some(outcome) = self.try_take() {
            return outcome;
        }
        if self.state == PromiseState::Resolved {
            return Err(Error::InvariantViolation("promise outcome already consumed".into()));
        }

        let outcome = tokio::select! {
            biased;
            received = self.slot.rx.recv() => match received {
                Some(outcome) => {
                    self.state = PromiseState::Resolved;
                    outcome
                }
                // We hold a sender ourselves, the channel cannot close.
                None => Err(Error::InvariantViolation("promise channel closed".into())),
            },
            _ = ctx.done() => Err(Error::PromiseTimeout),
        };
        self.metrics.promise_completed(&outcome);
        outcome
    }

    /// Non-blocking poll for the outcome.
    pub fn try_take(&mut self) -> Option<Outcome> {
        match self.slot.rx.try_recv() {
            Ok(outcome) => {
                self.state = PromiseState::Resolved;
                self.metrics.promise_completed(&outcome);
                Some(outcome)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Returns the slot to the pool it came from. Tolerates an unread value.
    pub fn release(self) {
        let pool = self.pool.clone();
        pool.release(self);
    }
}

/// The writing half of a completion signal. Consumed by the single write.
pub struct Resolver {
    tx: mpsc::Sender<Outcome>,
    _holder: Arc<()>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str("Resolver")
    }
}

impl Resolver {
    /// Writes the outcome without blocking. A full slot means the signal was
    /// written twice, which is logged loudly and reported as
    /// [`Error::InvariantViolation`].
    pub(crate) fn resolve(
        self,
        outcome: Outcome,
    ) -> Result<()> {
        match self.tx.try_send(outcome) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                error!("BUG: had a notification promise, but it blocked");
                Err(Error::InvariantViolation(
                    "completion signal resolved more than once".into(),
                ))
            }
            Err(TrySendError::Closed(_)) => {
                debug!("promise dropped before its outcome was delivered");
                Ok(())
            }
        }
    }
}
