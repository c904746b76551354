//! Client library for publishing resource change notifications.
//!
//! Producers hand a [`Notification`] to a [`Client`]. A single sender loop
//! takes notifications off a bounded hand-off queue in acceptance order and
//! delivers each one: inline when its serialized resources are small, or by
//! uploading them to blob storage and sending a pointer envelope otherwise.
//! Outcomes come back through a pooled completion signal or, for
//! fire-and-forget submissions, through a shared error channel.

mod client;
mod config;
mod constants;
mod context;
mod dispatch;
mod errors;
mod models;
mod notification;
mod promise;

pub mod metrics;
pub mod transport;
pub(crate) mod utils;

pub use client::*;
pub use config::*;
pub use constants::*;
pub use context::*;
pub use errors::*;
pub use models::*;
pub use notification::*;
pub use promise::*;

//-----------------------------------------------------------
// Test utils

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod notification_test;
