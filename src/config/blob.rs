use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::Error;
use crate::Result;

/// Blob storage used by the large path.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BlobConfig {
    /// Storage account URL. Without it large payloads cannot be sent.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Storage account name used when signing read locators. Taken from the
    /// endpoint host when unset.
    #[serde(default)]
    pub account: Option<String>,

    /// Inserted into container names after the fixed prefix
    #[serde(default)]
    pub container_ext: String,

    /// Lifetime of the read signature handed to the receiver (hours)
    #[serde(default = "default_sas_expiry_hours")]
    pub sas_expiry_hours: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            account: None,
            container_ext: String::new(),
            sas_expiry_hours: default_sas_expiry_hours(),
        }
    }
}

impl BlobConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            Url::parse(endpoint).map_err(|e| Error::InvalidConfig(format!("blob.endpoint {:?}: {}", endpoint, e)))?;
        }
        if !self.container_ext.is_empty() && !is_valid_container_ext(&self.container_ext) {
            return Err(Error::InvalidConfig(
                "container extension must be 1-41 lowercase letters, numbers, or hyphens".into(),
            ));
        }
        if self.sas_expiry_hours == 0 {
            return Err(Error::InvalidConfig("sas_expiry_hours cannot be 0".into()));
        }
        Ok(())
    }
}

/// `^[a-z0-9-]{1,41}$`
pub fn is_valid_container_ext(ext: &str) -> bool {
    (1..=41).contains(&ext.len())
        && ext
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn default_sas_expiry_hours() -> u64 {
    7 * 24
}
