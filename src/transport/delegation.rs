//! Per-blob read signatures backed by a user delegation key.
//!
//! The key is fetched from the storage account once at start-up and then
//! refreshed in the background. Signing never waits on the network: it reads
//! the cached key and fails only when that key has expired because every
//! refresh since has failed.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use chrono::DateTime;
use chrono::DurationRound;
use chrono::Utc;
use hmac::Hmac;
use hmac::Mac;
use parking_lot::RwLock;
use serde::Deserialize;
use sha2::Sha256;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use url::form_urlencoded;
use url::Url;

use super::storage::status_error;
use super::SasSigner;
use super::TokenCredential;
use super::STORAGE_SCOPE;
use crate::constants::BLOB_API_VERSION;
use crate::constants::DELEGATION_KEY_LIFETIME_HOURS;
use crate::constants::DELEGATION_KEY_REFRESH_HOURS;
use crate::constants::USER_AGENT;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::BlobConfig;
use crate::Context;
use crate::TransportError;

type HmacSha256 = Hmac<Sha256>;

const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Signatures start this many seconds in the past to tolerate clock skew.
const START_SKEW_SECS: i64 = 10;

/// Pause before a new round of attempts once a refresh has exhausted its
/// retries.
const REFRESH_RETRY_PAUSE: Duration = Duration::from_secs(60);

/// Key material returned by the storage service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct UserDelegationKey {
    pub signed_oid: String,
    pub signed_tid: String,
    pub signed_start: String,
    pub signed_expiry: String,
    pub signed_service: String,
    pub signed_version: String,
    pub value: String,
}

#[derive(Default)]
struct CachedKey {
    key: Option<Arc<UserDelegationKey>>,
    expires: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct KeyCache {
    http: reqwest::Client,
    endpoint: Url,
    credential: Arc<dyn TokenCredential>,
    current: RwLock<CachedKey>,
    now: fn() -> DateTime<Utc>,
}

impl KeyCache {
    /// Returns the cached key while it is valid at `now`.
    fn get(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Arc<UserDelegationKey>, TransportError> {
        let current = self.current.read();
        match (&current.key, current.expires) {
            (Some(key), Some(expires)) if expires > now => Ok(key.clone()),
            (None, _) => Err(TransportError::Credential("no user delegation key".into())),
            _ => Err(TransportError::Credential(
                current
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "user delegation key expired".into()),
            )),
        }
    }

    async fn refresh(&self) -> Result<(), TransportError> {
        let start = (self.now)()
            .duration_trunc(chrono::Duration::seconds(1))
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let expires = start + chrono::Duration::hours(DELEGATION_KEY_LIFETIME_HOURS);

        match self.fetch(start, expires).await {
            Ok(key) => {
                let mut current = self.current.write();
                current.key = Some(Arc::new(key));
                current.expires = Some(expires);
                current.last_error = None;
                Ok(())
            }
            Err(e) => {
                let mut current = self.current.write();
                let expired = current.expires.map_or(true, |at| at <= (self.now)());
                if expired {
                    current.last_error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        start: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Result<UserDelegationKey, TransportError> {
        let token = self.credential.token(STORAGE_SCOPE).await?;
        let mut url = self.endpoint.clone();
        url.set_query(Some("restype=service&comp=userdelegationkey"));

        let body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><KeyInfo><Start>{}</Start><Expiry>{}</Expiry></KeyInfo>"#,
            start.format(SAS_TIME_FORMAT),
            expires.format(SAS_TIME_FORMAT),
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header("x-ms-version", BLOB_API_VERSION)
            .header("content-type", "application/xml")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let text = response.text().await?;
        quick_xml::de::from_str(&text).map_err(|e| TransportError::Other(format!("user delegation key: {e}")))
    }
}

/// [`SasSigner`] issuing a read-only SAS for each uploaded blob, valid until
/// the expiry the store asks for.
pub struct UserDelegationSigner {
    cache: Arc<KeyCache>,
    account: String,
    refresh_every: Duration,
    retry: BackoffPolicy,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for UserDelegationSigner {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("UserDelegationSigner")
            .field("endpoint", &self.cache.endpoint.as_str())
            .field("account", &self.account)
            .finish()
    }
}

impl UserDelegationSigner {
    /// Fails with [`TransportError::NoStorage`] when `config` names no endpoint.
    /// No request is made until [`start`](Self::start).
    pub fn new(
        config: &BlobConfig,
        request_timeout: Duration,
        retry: BackoffPolicy,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, TransportError> {
        let endpoint = Url::parse(config.endpoint.as_deref().ok_or(TransportError::NoStorage)?)?;
        let account = match &config.account {
            Some(account) => account.clone(),
            None => account_from_endpoint(&endpoint)?,
        };
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            cache: Arc::new(KeyCache {
                http,
                endpoint,
                credential,
                current: RwLock::new(CachedKey::default()),
                now: Utc::now,
            }),
            account,
            refresh_every: Duration::from_secs(DELEGATION_KEY_REFRESH_HOURS * 3600),
            retry,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_refresh_interval(
        mut self,
        every: Duration,
    ) -> Self {
        self.refresh_every = every;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_clock(
        mut self,
        now: fn() -> DateTime<Utc>,
    ) -> Self {
        if let Some(cache) = Arc::get_mut(&mut self.cache) {
            cache.now = now;
        }
        self
    }

    /// Fetches the first key and starts the background refresher. The
    /// refresher stops when the signer is dropped.
    pub async fn start(self) -> Result<Arc<Self>, TransportError> {
        self.cache.refresh().await?;
        info!("user delegation key acquired for account {}", self.account);

        tokio::spawn(run_refresher(
            self.cache.clone(),
            self.refresh_every,
            self.retry,
            self.shutdown.clone(),
        ));
        Ok(Arc::new(self))
    }

    /// Replaces the cached key now.
    pub async fn refresh(&self) -> Result<(), TransportError> {
        self.cache.refresh().await
    }
}

impl Drop for UserDelegationSigner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl SasSigner for UserDelegationSigner {
    fn sign(
        &self,
        container: &str,
        blob: &str,
        expiry: DateTime<Utc>,
    ) -> Result<String, TransportError> {
        let now = (self.cache.now)();
        let key = self.cache.get(now)?;
        let grant = BlobReadGrant {
            account: &self.account,
            container,
            blob,
            start: now - chrono::Duration::seconds(START_SKEW_SECS),
            expiry,
        };
        grant.sign(&key)
    }
}

async fn run_refresher(
    cache: Arc<KeyCache>,
    every: Duration,
    retry: BackoffPolicy,
    shutdown: CancellationToken,
) {
    let ctx = Context::from_token(shutdown.clone());
    let mut wait = every;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("delegation key refresher stopped");
                return;
            }
            _ = sleep(wait) => {}
        }

        match task_with_timeout_and_exponential_backoff(&ctx, || cache.refresh(), retry).await {
            Ok(()) => {
                debug!("user delegation key refreshed");
                wait = every;
            }
            Err(e) => {
                error!("problem refreshing user delegation key: {}", e);
                wait = REFRESH_RETRY_PAUSE.min(every);
            }
        }
    }
}

/// Read permission on one blob over HTTPS.
pub(crate) struct BlobReadGrant<'a> {
    pub(crate) account: &'a str,
    pub(crate) container: &'a str,
    pub(crate) blob: &'a str,
    pub(crate) start: DateTime<Utc>,
    pub(crate) expiry: DateTime<Utc>,
}

impl BlobReadGrant<'_> {
    pub(crate) fn string_to_sign(
        &self,
        key: &UserDelegationKey,
    ) -> String {
        let start = self.start.format(SAS_TIME_FORMAT).to_string();
        let expiry = self.expiry.format(SAS_TIME_FORMAT).to_string();
        let resource = format!("/blob/{}/{}/{}", self.account, self.container, self.blob);
        let fields: [&str; 24] = [
            "r",
            &start,
            &expiry,
            &resource,
            &key.signed_oid,
            &key.signed_tid,
            &key.signed_start,
            &key.signed_expiry,
            &key.signed_service,
            &key.signed_version,
            "", // authorized user object id
            "", // unauthorized user object id
            "", // correlation id
            "", // ip range
            "https",
            BLOB_API_VERSION,
            "b",
            "", // snapshot time
            "", // encryption scope
            "", // cache-control
            "", // content-disposition
            "", // content-encoding
            "", // content-language
            "", // content-type
        ];
        fields.join("\n")
    }

    /// Query string carrying the grant and its signature.
    pub(crate) fn sign(
        &self,
        key: &UserDelegationKey,
    ) -> Result<String, TransportError> {
        let secret = BASE64_STANDARD
            .decode(&key.value)
            .map_err(|e| TransportError::Credential(format!("malformed delegation key: {e}")))?;
        let mut mac = HmacSha256::new_from_slice(&secret).map_err(|e| TransportError::Credential(e.to_string()))?;
        mac.update(self.string_to_sign(key).as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(form_urlencoded::Serializer::new(String::new())
            .append_pair("sv", BLOB_API_VERSION)
            .append_pair("sr", "b")
            .append_pair("st", &self.start.format(SAS_TIME_FORMAT).to_string())
            .append_pair("se", &self.expiry.format(SAS_TIME_FORMAT).to_string())
            .append_pair("sp", "r")
            .append_pair("spr", "https")
            .append_pair("skoid", &key.signed_oid)
            .append_pair("sktid", &key.signed_tid)
            .append_pair("skt", &key.signed_start)
            .append_pair("ske", &key.signed_expiry)
            .append_pair("sks", &key.signed_service)
            .append_pair("skv", &key.signed_version)
            .append_pair("sig", &signature)
            .finish())
    }
}

/// `acct` from `https://acct.blob.core.windows.net`, or the first path
/// segment for emulator-style endpoints such as `http://127.0.0.1:10000/acct`.
pub(crate) fn account_from_endpoint(endpoint: &Url) -> Result<String, TransportError> {
    let host = endpoint.host_str().unwrap_or_default();
    let by_path = host == "localhost" || host.trim_matches(['[', ']']).parse::<IpAddr>().is_ok();
    let account = if by_path {
        endpoint
            .path_segments()
            .and_then(|mut s| s.next())
            .unwrap_or_default()
    } else {
        host.split('.').next().unwrap_or_default()
    };
    if account.is_empty() {
        return Err(TransportError::Credential(format!(
            "cannot derive storage account from {endpoint}; set blob.account"
        )));
    }
    Ok(account.to_string())
}
