//! Two-phase send: size routing between the inline and large paths.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::metrics::Metrics;
use crate::models::Data;
use crate::models::Event;
use crate::models::EventMeta;
use crate::models::ResourcesBlobInfo;
use crate::models::ResourcesContainer;
use crate::transport::Transport;
use crate::utils::scoped_timer::ScopedTimer;
use crate::Context;
use crate::Error;
use crate::Notification;
use crate::Result;

pub(crate) struct SendProtocol {
    transport: Arc<dyn Transport>,
    metrics: Arc<Metrics>,
    inline_size: usize,
}

impl SendProtocol {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        metrics: Arc<Metrics>,
        inline_size: usize,
    ) -> Self {
        Self {
            transport,
            metrics,
            inline_size,
        }
    }

    /// Delivers one notification. Resources are serialized once; payloads
    /// strictly below the inline size ride in the envelope, larger ones are
    /// uploaded first and the envelope carries their locator. An upload
    /// failure stops before any delivery call. A delivery failure after a
    /// successful upload is terminal; the blob is left to storage lifecycle.
    pub(crate) async fn send(
        &self,
        n: &mut Notification,
    ) -> Result<()> {
        if let Some(e) = n.ctx().err() {
            return Err(e);
        }

        let timer = ScopedTimer::new("send_event");
        n.prepare_resources();
        let payload = Bytes::from(serde_json::to_vec(&n.resources)?);
        let inline = payload.len() < self.inline_size;
        let data_size = payload.len() as u64;

        let result = self.deliver(n, payload, inline).await;

        let elapsed = timer.elapsed();
        match &result {
            Ok(()) => self.metrics.send_event_success(elapsed, inline, data_size),
            Err(e) => {
                debug!(inline, data_size, "send failed: {}", e);
                self.metrics.send_event_failure(elapsed, inline, data_size);
            }
        }
        result
    }

    async fn deliver(
        &self,
        n: &mut Notification,
        payload: Bytes,
        inline: bool,
    ) -> Result<()> {
        let mut event = build_event(n, &payload, inline)?;
        event.validate()?;

        if !inline {
            let locator = self
                .transport
                .send_large(n.ctx(), payload)
                .await
                .map_err(|e| ended_or(n.ctx(), Error::Upload(e)))?;
            debug!(uri = %locator.uri.path(), size = locator.size, "payload stored out of band");
            let blob_info = ResourcesBlobInfo {
                blob_uri: locator.uri.to_string(),
                blob_size: locator.size,
            };
            blob_info
                .validate()
                .map_err(|e| Error::Validation(e.within("data.resources_blob_info")))?;
            event.data.resources_blob_info = Some(blob_info);
        }

        let envelope = Bytes::from(serde_json::to_vec(&event)?);
        self.transport
            .send_inline(n.ctx(), envelope)
            .await
            .map_err(|e| ended_or(n.ctx(), Error::Delivery(e)))
    }
}

/// A transport failure caused by the caller's context ending surfaces as the
/// context's own error.
fn ended_or(
    ctx: &Context,
    err: Error,
) -> Error {
    ctx.err().unwrap_or(err)
}

/// The records move into the event; the notification keeps only what it
/// needs to be resolved.
fn build_event(
    n: &mut Notification,
    payload: &Bytes,
    inline: bool,
) -> Result<Event> {
    let meta = EventMeta::for_resources(&n.resources)?;
    let (resources, container) = if inline {
        (Some(payload.clone()), ResourcesContainer::Inline)
    } else {
        (None, ResourcesContainer::Blob)
    };

    Ok(Event {
        meta,
        data: Data {
            resources,
            additional_batch_properties: n.additional_batch_properties.take(),
            resources_blob_info: None,
            home_tenant_id: n.home_tenant_id.clone(),
            resource_home_tenant_id: n.resource_home_tenant_id.clone(),
            resource_location: n.resource_location.clone(),
            frontdoor_location: n.frontdoor_location.clone(),
            publisher_info: n.publisher_info.clone(),
            api_version: n.api_version.clone(),
            resources_container: container,
            items: std::mem::take(&mut n.resources),
        },
    })
}
