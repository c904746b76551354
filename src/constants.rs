// -
// Admission limits

/// Maximum number of resources accepted in one notification.
pub const MAX_NOTIFICATION_ITEMS: usize = 1000;

/// Serialized payloads strictly below this size travel inline; anything at or
/// above it goes through blob storage.
pub const INLINE_SIZE: usize = 42000;

// -
// Envelope schema

pub const DATA_VERSION: &str = "3.0";
pub const METADATA_VERSION: &str = "1.0";

/// As a producer, every resource carries this status code.
pub const STATUS_CODE_OK: &str = "OK";

// -
// Wire endpoints

pub(crate) const RECEIVER_PATH: &str = "arnnotify";
pub(crate) const DEFAULT_SCOPE: &str = "https://arg.management.core.windows.net//.default";
pub(crate) const CONTAINER_PREFIX: &str = "arm-ext-nt";
pub(crate) const BLOB_API_VERSION: &str = "2023-11-03";

pub(crate) const USER_AGENT: &str = concat!("arn-client/", env!("CARGO_PKG_VERSION"));

// -
// Blob read signatures

/// Validity requested for each user delegation key.
pub(crate) const DELEGATION_KEY_LIFETIME_HOURS: i64 = 7 * 24;

/// How often the background refresher replaces the key.
pub(crate) const DELEGATION_KEY_REFRESH_HOURS: u64 = 23;
