use serde::Deserialize;
use serde::Serialize;

use crate::metrics::DEFAULT_NAMESPACE;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Record delivery and promise metrics
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Prefix of every metric name
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
            namespace: default_namespace(),
        }
    }
}

impl MonitoringConfig {
    /// Validates monitoring configuration
    /// # Errors
    /// Returns `Error::InvalidConfig` when metrics are enabled and the
    /// namespace is not a valid Prometheus name prefix.
    pub fn validate(&self) -> Result<()> {
        if !self.metrics_enabled {
            return Ok(());
        }
        let mut chars = self.namespace.chars();
        let valid_head = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_head || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::InvalidConfig(format!(
                "monitoring.namespace {:?} is not a valid metric prefix",
                self.namespace
            )));
        }
        Ok(())
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}
