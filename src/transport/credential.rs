use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

use crate::TransportError;

/// Scope requested when authenticating to blob storage.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Source of bearer tokens for a given audience scope.
#[async_trait]
pub trait TokenCredential: Send + Sync + 'static {
    async fn token(
        &self,
        scope: &str,
    ) -> Result<String, TransportError>;
}

/// A pre-issued token used for every scope.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenCredential for StaticToken {
    async fn token(
        &self,
        _scope: &str,
    ) -> Result<String, TransportError> {
        if self.0.is_empty() {
            return Err(TransportError::Credential("empty token".into()));
        }
        Ok(self.0.clone())
    }
}

/// Produces the read-only SAS query string appended to an uploaded blob's URL.
pub trait SasSigner: Send + Sync + 'static {
    fn sign(
        &self,
        container: &str,
        blob: &str,
        expiry: DateTime<Utc>,
    ) -> Result<String, TransportError>;
}

/// A shared SAS issued out of band, valid for the whole account or container.
#[derive(Clone)]
pub struct SharedSas(String);

impl SharedSas {
    pub fn new(query: impl Into<String>) -> Self {
        let query: String = query.into();
        Self(query.trim_start_matches('?').to_string())
    }
}

impl std::fmt::Debug for SharedSas {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str("SharedSas(***)")
    }
}

impl SasSigner for SharedSas {
    fn sign(
        &self,
        _container: &str,
        _blob: &str,
        _expiry: DateTime<Utc>,
    ) -> Result<String, TransportError> {
        if self.0.is_empty() {
            return Err(TransportError::Credential("empty SAS token".into()));
        }
        Ok(self.0.clone())
    }
}
