//! Configuration management for the notification client.
//!
//! Settings are layered from several sources, lowest priority first:
//! 1. Default values (hardcoded)
//! 2. Config file passed to [`Settings::load`]
//! 3. Config file named by the `ARN_CONFIG_PATH` environment variable
//! 4. Environment variables prefixed `ARN__` (highest priority), e.g.
//!    `ARN__DISPATCH__MAX_BATCH_ITEMS=500`

mod blob;
mod dispatch;
mod http;
mod monitoring;
mod retry;
pub use blob::*;
pub use dispatch::*;
pub use http::*;
pub use monitoring::*;
pub use retry::*;

#[cfg(test)]
mod config_test;

//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable naming an extra config file.
pub const CONFIG_PATH_ENV: &str = "ARN_CONFIG_PATH";

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Admission limits and pipeline sizing
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Receiver endpoint and request behaviour
    #[serde(default)]
    pub http: HttpConfig,
    /// Blob storage for the large path
    #[serde(default)]
    pub blob: BlobConfig,
    /// Retry policy for receiver calls
    #[serde(default = "retry::default_retry")]
    pub retry: BackoffPolicy,
    /// Metrics settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Loads and validates settings.
    ///
    /// # Arguments
    /// * `path` - Optional config file, required to exist when given
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        if let Some(path) = path {
            config = config.add_source(File::with_name(path).required(true));
        }
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            config = config.add_source(File::with_name(&path).required(true));
        }

        config = config.add_source(
            Environment::with_prefix("ARN")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate()?;
        self.http.validate()?;
        self.blob.validate()?;
        self.retry.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
