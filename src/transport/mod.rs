//! Transport facade used by the sender loop.
//!
//! The pipeline depends only on [`Transport`]: one call that delivers a
//! complete envelope and one that parks a large payload out of band. The
//! production implementation is [`HttpTransport`]; tests inject their own.

mod credential;
mod delegation;
mod http;
mod service;
mod storage;

pub use credential::*;
pub use delegation::UserDelegationKey;
pub use delegation::UserDelegationSigner;
pub use http::*;
pub use service::*;
pub use storage::*;


use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use url::Url;

use crate::Context;
use crate::TransportError;

/// Where a large payload was stored: a dereferenceable, time-limited URI and
/// the payload size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub uri: Url,
    pub size: i64,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Delivers a complete envelope. Any non-success outcome is an error.
    /// Must give up once `ctx` ends.
    async fn send_inline(
        &self,
        ctx: &Context,
        envelope: Bytes,
    ) -> Result<(), TransportError>;

    /// Stores `payload` out of band and returns a signed locator for it.
    /// A missing container is created and the upload retried once.
    async fn send_large(
        &self,
        ctx: &Context,
        payload: Bytes,
    ) -> Result<Locator, TransportError>;
}
