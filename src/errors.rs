//! Notification Delivery Error Hierarchy
//!
//! Every caller-visible failure travels through a completion signal or the
//! shared error channel, never as a direct return from the hand-off. The types
//! here are what those channels carry.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Admission rejection: more items than the configured maximum
    #[error("batch size too large: {count} items exceeds maximum of {max}")]
    BatchTooLarge { count: usize, max: usize },

    /// The notification's context was cancelled
    #[error("context canceled")]
    Canceled,

    /// The notification's context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The awaiting side's own wait expired before the send resolved
    #[error("promise timeout")]
    PromiseTimeout,

    /// Envelope or item inconsistency found before any network call
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Large-path upload to blob storage failed
    #[error("upload failed: {0}")]
    Upload(#[source] TransportError),

    /// Inline or pointer envelope delivery failed
    #[error("delivery failed: {0}")]
    Delivery(#[source] TransportError),

    /// Core-correctness bug, never caller misuse
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The client was closed before the notification could be handed off
    #[error("client closed")]
    Closed,

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Settings could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings loaded but failed validation
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for the two context outcomes propagated verbatim from the caller.
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Canceled | Error::DeadlineExceeded)
    }
}

/// Field-level validation failure. `field` is the dotted path to the offending
/// field, e.g. `data.resources[2].home_tenant_id`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Prefixes the field path, used when a nested validator reports upward.
    pub(crate) fn within(
        mut self,
        parent: &str,
    ) -> Self {
        self.field = if self.field.starts_with('[') {
            format!("{}{}", parent, self.field)
        } else {
            format!("{}.{}", parent, self.field)
        };
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Remote answered with a non-success status
    #[error("unexpected status code: {status}")]
    Status { status: u16, body: String },

    /// Request never produced a response
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Retry policy exhaustion
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: Box<TransportError> },

    /// Single attempt timeout
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Payload needs the large path but no blob store is configured
    #[error("event exceeds max inline size and no storage client provided to store the data in a blob")]
    NoStorage,

    /// Payload was empty
    #[error("event is empty")]
    EmptyBody,

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("credential error: {0}")]
    Credential(String),

    /// Context cancelled or expired while a transport call was outstanding
    #[error("{0}")]
    Context(&'static str),

    /// Test doubles and other implementations report free-form failures here
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether another attempt could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Request(e) => e.is_timeout() || e.is_connect(),
            TransportError::Timeout(_) => true,
            _ => false,
        }
    }
}
