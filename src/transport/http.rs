//! Receiver client: posts envelopes to the ingestion endpoint.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_ENCODING;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::debug;
use tracing::warn;
use url::Url;

use super::TokenCredential;
use crate::constants::RECEIVER_PATH;
use crate::constants::USER_AGENT;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::Context;
use crate::HttpConfig;
use crate::TransportError;

/// zlib level applied to request bodies.
const DEFLATE_LEVEL: u32 = 5;

pub struct ReceiverClient {
    http: reqwest::Client,
    endpoint: Url,
    credential: Arc<dyn TokenCredential>,
    scope: String,
    compression: bool,
    retry: BackoffPolicy,
}

impl std::fmt::Debug for ReceiverClient {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ReceiverClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("compression", &self.compression)
            .finish()
    }
}

impl ReceiverClient {
    pub fn new(
        config: &HttpConfig,
        retry: BackoffPolicy,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            endpoint: receiver_url(&config.endpoint)?,
            credential,
            scope: config.scope.clone(),
            compression: config.compression,
            retry,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Posts one envelope. Only `200 OK` counts as delivered; transient
    /// failures are retried per the configured policy.
    pub async fn send(
        &self,
        ctx: &Context,
        event: Bytes,
    ) -> Result<(), TransportError> {
        if event.is_empty() {
            return Err(TransportError::EmptyBody);
        }
        let body = if self.compression { deflate(&event)? } else { event };

        task_with_timeout_and_exponential_backoff(ctx, || self.post(body.clone()), self.retry).await
    }

    async fn post(
        &self,
        body: Bytes,
    ) -> Result<(), TransportError> {
        let token = self.credential.token(&self.scope).await?;

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if self.compression {
            request = request.header(CONTENT_ENCODING, "deflate");
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if status == StatusCode::OK {
            debug!("event delivered to {}", self.endpoint);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "receiver rejected event");
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Appends the receiver path unless the endpoint already ends with it.
pub(crate) fn receiver_url(endpoint: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(endpoint)?;
    let path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with(&format!("/{RECEIVER_PATH}")) {
        url.set_path(&format!("{path}/{RECEIVER_PATH}"));
    }
    Ok(url)
}

pub(crate) fn deflate(data: &[u8]) -> Result<Bytes, TransportError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(DEFLATE_LEVEL));
    encoder.write_all(data)?;
    Ok(Bytes::from(encoder.finish()?))
}
