use serde::Deserialize;
use serde::Serialize;

use crate::constants::INLINE_SIZE;
use crate::constants::MAX_NOTIFICATION_ITEMS;
use crate::promise::DEFAULT_MAX_IDLE;
use crate::Error;
use crate::Result;

/// Admission limits and pipeline sizing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Largest accepted batch; bigger ones fail with `BatchTooLarge`
    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,

    /// Serialized resources strictly smaller than this travel inline (bytes)
    #[serde(default = "default_inline_size")]
    pub inline_size: usize,

    /// Buffer of the fire-and-forget error channel. Errors beyond it are dropped.
    #[serde(default = "default_errors_capacity")]
    pub errors_capacity: usize,

    /// Hand-off queue capacity between producers and the sender loop
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Idle completion slots kept for reuse
    #[serde(default = "default_promise_pool_idle")]
    pub promise_pool_idle: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_batch_items: default_max_batch_items(),
            inline_size: default_inline_size(),
            errors_capacity: default_errors_capacity(),
            queue_capacity: default_queue_capacity(),
            promise_pool_idle: default_promise_pool_idle(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_items == 0 || self.max_batch_items > MAX_NOTIFICATION_ITEMS {
            return Err(Error::InvalidConfig(format!(
                "max_batch_items must be between 1 and {}, got {}",
                MAX_NOTIFICATION_ITEMS, self.max_batch_items
            )));
        }
        if self.inline_size == 0 {
            return Err(Error::InvalidConfig("inline_size cannot be 0".into()));
        }
        if self.errors_capacity == 0 {
            return Err(Error::InvalidConfig("errors_capacity cannot be 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig("queue_capacity cannot be 0".into()));
        }
        Ok(())
    }
}

fn default_max_batch_items() -> usize {
    MAX_NOTIFICATION_ITEMS
}
fn default_inline_size() -> usize {
    INLINE_SIZE
}
fn default_errors_capacity() -> usize {
    1
}
fn default_queue_capacity() -> usize {
    1
}
fn default_promise_pool_idle() -> usize {
    DEFAULT_MAX_IDLE
}
