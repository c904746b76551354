use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;

use super::Promise;
use super::PromiseState;
use super::Resolver;
use super::Slot;
use crate::metrics::Metrics;

/// Idle slots kept by [`PromisePool::global`].
pub const DEFAULT_MAX_IDLE: usize = 1024;

lazy_static! {
    static ref GLOBAL_POOL: Arc<PromisePool> = PromisePool::new(DEFAULT_MAX_IDLE, Metrics::global());
}

/// Free-list of completion slots. Slots are fungible; the pool never hands
/// out a slot holding a value and never takes back one a writer can still reach.
pub struct PromisePool {
    free: Mutex<Vec<Slot>>,
    max_idle: usize,
    metrics: Arc<Metrics>,
}

impl PromisePool {
    pub fn new(
        max_idle: usize,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(max_idle.min(64))),
            max_idle,
            metrics,
        })
    }

    /// Process-wide pool backed by [`Metrics::global`].
    pub fn global() -> Arc<PromisePool> {
        GLOBAL_POOL.clone()
    }

    /// Hands out an empty promise, reusing an idle slot when one exists. The
    /// promise must come back through [`release`](Self::release).
    pub(crate) fn acquire(self: &Arc<Self>) -> Promise {
        let slot = loop {
            let Some(mut slot) = self.free.lock().pop() else {
                break Slot::new();
            };
            if slot.drain() {
                error!("BUG: pooled promise still held a value, discarding it");
                continue;
            }
            break slot;
        };

        self.metrics.promise_acquired();
        Promise {
            slot,
            state: PromiseState::Unused,
            pool: self.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Hands out an empty promise together with the resolver that will
    /// complete it.
    pub(crate) fn acquire_armed(self: &Arc<Self>) -> (Promise, Resolver) {
        let mut promise = self.acquire();
        let resolver = promise.issue_resolver();
        (promise, resolver)
    }

    /// Takes a promise back. An unread value is drained first; a slot whose
    /// resolver is still alive is dropped instead of pooled.
    pub fn release(
        &self,
        promise: Promise,
    ) {
        self.metrics.promise_released();

        let Promise { mut slot, state, .. } = promise;
        if slot.drain() {
            debug!(?state, "discarded unread promise outcome on release");
        }
        if slot.is_shared() {
            debug!("promise released while its resolver is outstanding, not pooling");
            return;
        }

        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(slot);
        }
    }

    /// Number of idle slots.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
