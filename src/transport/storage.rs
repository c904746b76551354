//! Blob storage client for the large path.
//!
//! Payloads land in hourly containers named
//! `arm-ext-nt[-{ext}]-YYYY-MM-DD-H` (UTC). Containers are created lazily the
//! first time an upload finds its container missing; their lifecycle is
//! managed outside this crate.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::DateTime;
use chrono::Utc;
use reqwest::StatusCode;
use tracing::debug;
use tracing::info;
use url::Url;

use super::Locator;
use super::SasSigner;
use super::TokenCredential;
use super::STORAGE_SCOPE;
use crate::config::is_valid_container_ext;
use crate::constants::BLOB_API_VERSION;
use crate::constants::CONTAINER_PREFIX;
use crate::constants::USER_AGENT;
use crate::utils::async_task::context_error;
use crate::BlobConfig;
use crate::Context;
use crate::TransportError;

const ERROR_CODE_HEADER: &str = "x-ms-error-code";
const CONTAINER_NOT_FOUND: &str = "ContainerNotFound";
const CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";

enum PutOutcome {
    Stored,
    ContainerMissing,
}

pub struct BlobStore {
    http: reqwest::Client,
    endpoint: Url,
    container_ext: String,
    sas_expiry: chrono::Duration,
    credential: Arc<dyn TokenCredential>,
    signer: Arc<dyn SasSigner>,
    now: fn() -> DateTime<Utc>,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("container_ext", &self.container_ext)
            .finish()
    }
}

impl BlobStore {
    /// Fails with [`TransportError::NoStorage`] when `config` names no endpoint.
    pub fn new(
        config: &BlobConfig,
        request_timeout: Duration,
        credential: Arc<dyn TokenCredential>,
        signer: Arc<dyn SasSigner>,
    ) -> Result<Self, TransportError> {
        let endpoint = config.endpoint.as_deref().ok_or(TransportError::NoStorage)?;
        if !config.container_ext.is_empty() && !is_valid_container_ext(&config.container_ext) {
            return Err(TransportError::Other(
                "container extension must be lowercase letters, numbers, or hyphens".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            endpoint: Url::parse(endpoint)?,
            container_ext: config.container_ext.clone(),
            sas_expiry: chrono::Duration::hours(config.sas_expiry_hours as i64),
            credential,
            signer,
            now: Utc::now,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_clock(
        mut self,
        now: fn() -> DateTime<Utc>,
    ) -> Self {
        self.now = now;
        self
    }

    /// Container for uploads made at `at`.
    pub fn container_name(
        &self,
        at: DateTime<Utc>,
    ) -> String {
        let stamp = at.format("%Y-%m-%d-%-H");
        if self.container_ext.is_empty() {
            format!("{CONTAINER_PREFIX}-{stamp}")
        } else {
            format!("{}-{}-{}", CONTAINER_PREFIX, self.container_ext, stamp)
        }
    }

    /// Stores `data` as `{id}.txt` and returns a read-signed locator for it.
    pub async fn upload(
        &self,
        ctx: &Context,
        id: &str,
        data: Bytes,
    ) -> Result<Locator, TransportError> {
        let now = (self.now)();
        let container = self.container_name(now);
        let blob = format!("{id}.txt");
        let size = data.len() as i64;

        let mut url = self.container_url(&container);
        url.path_segments_mut()
            .map_err(|_| TransportError::Other("storage endpoint cannot be a base URL".into()))?
            .push(&blob);

        tokio::select! {
            biased;
            e = ctx.done() => return Err(context_error(e)),
            r = self.store(&container, &url, data) => r?,
        }

        debug!("Uploaded to blob. Container: {}, Blob: {}", container, blob);
        let query = self.signer.sign(&container, &blob, now + self.sas_expiry)?;
        url.set_query(Some(&query));
        Ok(Locator { uri: url, size })
    }

    async fn store(
        &self,
        container: &str,
        url: &Url,
        data: Bytes,
    ) -> Result<(), TransportError> {
        match self.put_blob(url, data.clone()).await? {
            PutOutcome::Stored => Ok(()),
            PutOutcome::ContainerMissing => {
                info!("creating container {}", container);
                self.create_container(container).await?;
                match self.put_blob(url, data).await? {
                    PutOutcome::Stored => Ok(()),
                    PutOutcome::ContainerMissing => Err(TransportError::Status {
                        status: StatusCode::NOT_FOUND.as_u16(),
                        body: CONTAINER_NOT_FOUND.into(),
                    }),
                }
            }
        }
    }

    async fn put_blob(
        &self,
        url: &Url,
        data: Bytes,
    ) -> Result<PutOutcome, TransportError> {
        let token = self.credential.token(STORAGE_SCOPE).await?;
        let response = self
            .http
            .put(url.clone())
            .bearer_auth(token)
            .header("x-ms-version", BLOB_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .body(data)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(PutOutcome::Stored);
        }
        if error_code(&response).as_deref() == Some(CONTAINER_NOT_FOUND) {
            return Ok(PutOutcome::ContainerMissing);
        }
        Err(status_error(response).await)
    }

    async fn create_container(
        &self,
        container: &str,
    ) -> Result<(), TransportError> {
        let token = self.credential.token(STORAGE_SCOPE).await?;
        let mut url = self.container_url(container);
        url.set_query(Some("restype=container"));

        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .header("x-ms-version", BLOB_API_VERSION)
            .send()
            .await?;

        if response.status().is_success() || error_code(&response).as_deref() == Some(CONTAINER_ALREADY_EXISTS) {
            return Ok(());
        }
        Err(status_error(response).await)
    }

    fn container_url(
        &self,
        container: &str,
    ) -> Url {
        let mut url = self.endpoint.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}/{container}"));
        url.set_query(None);
        url
    }
}

fn error_code(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub(super) async fn status_error(response: reqwest::Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    TransportError::Status { status, body }
}
