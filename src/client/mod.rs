//! Client facade over the delivery pipeline.
//!
//! Provides the two ways of submitting a [`Notification`]:
//! - [`Client::notify`] - hand off and wait for the outcome
//! - [`Client::async_notify`] - hand off and return a [`Pending`] handle,
//!   optionally backed by a promise
//!
//! Failures of fire-and-forget submissions are only observable through the
//! receiver returned by [`Client::take_errors`].
//!
//! # Basic Usage
//! ```no_run
//! use std::sync::Arc;
//!
//! use arn_client::test_utils::notification;
//! use arn_client::test_utils::RecordingTransport;
//! use arn_client::ClientBuilder;
//! use arn_client::Context;
//! use arn_client::Settings;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = ClientBuilder::new(Settings::default())
//!         .transport(Arc::new(RecordingTransport::new()))
//!         .build()
//!         .unwrap();
//!
//!     client.notify(&Context::background(), notification(3)).await.unwrap();
//!
//!     let pending = client.async_notify(&Context::background(), notification(1), true).await;
//!     pending.wait(&Context::background()).await.unwrap();
//!
//!     client.close().await;
//! }
//! ```

mod builder;

pub use builder::*;


use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::promise::Promise;
use crate::promise::PromisePool;
use crate::Context;
use crate::Error;
use crate::Notification;
use crate::Result;

/// Entry point for publishing notifications.
///
/// Created through [`ClientBuilder`]. Owns the sender loop; call
/// [`close`](Client::close) to drain it before dropping the client.
pub struct Client {
    dispatcher: Dispatcher,
    pool: Arc<PromisePool>,
    errors: Mutex<Option<mpsc::Receiver<Error>>>,
    sender: Mutex<Option<JoinHandle<()>>>,
    max_batch_items: usize,
}

impl Client {
    pub(super) fn new(
        dispatcher: Dispatcher,
        pool: Arc<PromisePool>,
        errors: mpsc::Receiver<Error>,
        sender: JoinHandle<()>,
        max_batch_items: usize,
    ) -> Self {
        Self {
            dispatcher,
            pool,
            errors: Mutex::new(Some(errors)),
            sender: Mutex::new(Some(sender)),
            max_batch_items,
        }
    }

    /// Sends `n` and waits for its outcome.
    ///
    /// The wait itself is not bounded by `ctx`: the hand-off and the transport
    /// calls are, so the outcome always arrives once either finishes or `ctx`
    /// ends. A notification without resources succeeds without being sent.
    ///
    /// # Errors
    /// - [`Error::BatchTooLarge`] before anything is queued
    /// - [`Error::Canceled`] / [`Error::DeadlineExceeded`] when `ctx` ends first
    /// - [`Error::Validation`], [`Error::Upload`], [`Error::Delivery`] from the send
    /// - [`Error::Closed`] after [`close`](Client::close)
    pub async fn notify(
        &self,
        ctx: &Context,
        mut n: Notification,
    ) -> Result<()> {
        let count = n.item_count();
        if count == 0 {
            return Ok(());
        }
        if count > self.max_batch_items {
            return Err(Error::BatchTooLarge {
                count,
                max: self.max_batch_items,
            });
        }
        if let Some(e) = ctx.err() {
            return Err(e);
        }

        n.set_ctx(ctx.clone());
        let (mut promise, resolver) = self.pool.acquire_armed();
        n.attach(resolver);

        self.dispatcher.send(n).await;
        let outcome = promise.wait(&Context::background()).await;
        promise.release();
        outcome
    }

    /// Hands `n` off and returns once it is queued or rejected.
    ///
    /// With `want_promise` the returned [`Pending`] observes the outcome;
    /// without it, failures are only reported on the error channel.
    pub async fn async_notify(
        &self,
        ctx: &Context,
        mut n: Notification,
        want_promise: bool,
    ) -> Pending {
        n.set_ctx(ctx.clone());
        let promise = if want_promise {
            let (promise, resolver) = self.pool.acquire_armed();
            n.attach(resolver);
            Some(promise)
        } else {
            None
        };

        let count = n.item_count();
        if count == 0 {
            self.dispatcher.settle(n, Ok(()));
        } else if count > self.max_batch_items {
            self.dispatcher.settle(
                n,
                Err(Error::BatchTooLarge {
                    count,
                    max: self.max_batch_items,
                }),
            );
        } else {
            self.dispatcher.send(n).await;
        }

        Pending { promise }
    }

    /// Takes the receiving end of the fire-and-forget error channel. Only the
    /// first caller gets it.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<Error>> {
        self.errors.lock().take()
    }

    /// Stops accepting notifications, lets the sender loop finish what was
    /// already queued and waits for it to exit. Later submissions fail with
    /// [`Error::Closed`].
    pub async fn close(&self) {
        self.dispatcher.close();
        let handle = self.sender.lock().take();
        let Some(handle) = handle else {
            debug!("client already closed");
            return;
        };
        if let Err(e) = handle.await {
            error!("sender loop ended abnormally: {}", e);
            return;
        }
        info!("client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.sender.lock().is_some() {
            debug!("client dropped without close, sender loop drains in the background");
        }
    }
}

/// Handle returned by [`Client::async_notify`].
///
/// Dropping it returns the promise to its pool; the send still completes.
#[derive(Debug)]
pub struct Pending {
    promise: Option<Promise>,
}

impl Pending {
    pub fn has_promise(&self) -> bool {
        self.promise.is_some()
    }

    /// Waits for the outcome. An ended `ctx` yields [`Error::PromiseTimeout`].
    /// Without a promise there is nothing to observe and this returns `Ok`.
    pub async fn wait(
        mut self,
        ctx: &Context,
    ) -> Result<()> {
        let Some(mut promise) = self.promise.take() else {
            return Ok(());
        };
        let outcome = promise.wait(ctx).await;
        promise.release();
        outcome
    }

    /// Non-blocking check; `None` while the send is still in flight.
    pub fn try_wait(&mut self) -> Option<Result<()>> {
        self.promise.as_mut().and_then(Promise::try_take)
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if let Some(promise) = self.promise.take() {
            promise.release();
        }
    }
}
