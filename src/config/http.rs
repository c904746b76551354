use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::constants::DEFAULT_SCOPE;
use crate::Error;
use crate::Result;

/// Receiver endpoint settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    /// Base URL of the receiver. `/arnnotify` is appended when missing.
    /// Empty when the client is built with its own transport.
    #[serde(default)]
    pub endpoint: String,

    /// Deflate request bodies
    #[serde(default = "default_compression")]
    pub compression: bool,

    /// Whole-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Token audience requested from the credential
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            compression: default_compression(),
            request_timeout_ms: default_request_timeout_ms(),
            scope: default_scope(),
        }
    }
}

impl HttpConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.endpoint.is_empty() {
            let url = Url::parse(&self.endpoint)
                .map_err(|e| Error::InvalidConfig(format!("http.endpoint {:?}: {}", self.endpoint, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::InvalidConfig(format!(
                    "http.endpoint must be http or https, got {}",
                    url.scheme()
                )));
            }
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("request_timeout_ms cannot be 0".into()));
        }
        if self.scope.is_empty() {
            return Err(Error::InvalidConfig("http.scope cannot be empty".into()));
        }
        Ok(())
    }
}

fn default_compression() -> bool {
    true
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}
