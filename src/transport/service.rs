use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use super::BlobStore;
use super::Locator;
use super::ReceiverClient;
use super::SasSigner;
use super::TokenCredential;
use super::Transport;
use super::UserDelegationSigner;
use crate::Context;
use crate::Settings;
use crate::TransportError;

/// Receiver plus optional blob store. Without a store, payloads that need the
/// large path fail with [`TransportError::NoStorage`].
#[derive(Debug)]
pub struct HttpTransport {
    receiver: ReceiverClient,
    store: Option<BlobStore>,
}

impl HttpTransport {
    pub fn new(
        receiver: ReceiverClient,
        store: Option<BlobStore>,
    ) -> Self {
        Self { receiver, store }
    }

    /// Builds both clients from settings. A configured blob endpoint needs a
    /// signer for the read locators it hands out.
    pub fn from_settings(
        settings: &Settings,
        credential: Arc<dyn TokenCredential>,
        signer: Option<Arc<dyn SasSigner>>,
    ) -> Result<Self, TransportError> {
        let receiver = ReceiverClient::new(&settings.http, settings.retry, credential.clone())?;

        let store = match (&settings.blob.endpoint, signer) {
            (Some(_), Some(signer)) => Some(BlobStore::new(
                &settings.blob,
                Duration::from_millis(settings.http.request_timeout_ms),
                credential,
                signer,
            )?),
            (Some(_), None) => {
                return Err(TransportError::Credential(
                    "blob endpoint configured without a SAS signer".into(),
                ));
            }
            (None, _) => None,
        };

        Ok(Self::new(receiver, store))
    }

    /// Like [`from_settings`](Self::from_settings), but signs read locators
    /// with a user delegation key fetched through `credential`. The first key
    /// is fetched before this returns.
    pub async fn with_delegated_signing(
        settings: &Settings,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, TransportError> {
        let signer = match settings.blob.endpoint {
            Some(_) => {
                let signer = UserDelegationSigner::new(
                    &settings.blob,
                    Duration::from_millis(settings.http.request_timeout_ms),
                    settings.retry,
                    credential.clone(),
                )?
                .start()
                .await?;
                Some(signer as Arc<dyn SasSigner>)
            }
            None => None,
        };
        Self::from_settings(settings, credential, signer)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_inline(
        &self,
        ctx: &Context,
        envelope: Bytes,
    ) -> Result<(), TransportError> {
        self.receiver.send(ctx, envelope).await
    }

    async fn send_large(
        &self,
        ctx: &Context,
        payload: Bytes,
    ) -> Result<Locator, TransportError> {
        let store = self.store.as_ref().ok_or(TransportError::NoStorage)?;
        store.upload(ctx, &Uuid::new_v4().to_string(), payload).await
    }
}
