//! The unit of work handed to the client.

use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::constants::STATUS_CODE_OK;
use crate::models::NotificationResource;
use crate::promise::Resolver;
use crate::Context;
use crate::Error;
use crate::Result;

/// A batch of resource changes plus the batch-level metadata propagated onto
/// each record.
///
/// Once handed to the client it is owned by the pipeline until its outcome is
/// resolved; it cannot be submitted twice.
#[derive(Debug)]
pub struct Notification {
    ctx: Context,
    resolver: Option<Resolver>,

    pub resource_location: String,
    pub publisher_info: String,
    pub frontdoor_location: String,
    pub home_tenant_id: String,
    pub resource_home_tenant_id: String,
    pub api_version: String,
    pub additional_batch_properties: Option<Map<String, Value>>,

    pub resources: Vec<NotificationResource>,
}

impl Notification {
    pub fn new(resources: Vec<NotificationResource>) -> Self {
        Self {
            ctx: Context::background(),
            resolver: None,
            resource_location: String::new(),
            publisher_info: String::new(),
            frontdoor_location: String::new(),
            home_tenant_id: String::new(),
            resource_home_tenant_id: String::new(),
            api_version: String::new(),
            additional_batch_properties: None,
            resources,
        }
    }

    pub fn with_resource_location(
        mut self,
        location: impl Into<String>,
    ) -> Self {
        self.resource_location = location.into();
        self
    }

    pub fn with_publisher_info(
        mut self,
        publisher: impl Into<String>,
    ) -> Self {
        self.publisher_info = publisher.into();
        self
    }

    pub fn with_home_tenant_id(
        mut self,
        tenant: impl Into<String>,
    ) -> Self {
        self.home_tenant_id = tenant.into();
        self
    }

    pub fn with_resource_home_tenant_id(
        mut self,
        tenant: impl Into<String>,
    ) -> Self {
        self.resource_home_tenant_id = tenant.into();
        self
    }

    /// Reads a batch document: the batch-level fields in camelCase plus a
    /// `resources` array.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let batch: Batch = serde_json::from_slice(bytes)?;
        let mut n = Notification::new(batch.resources);
        n.resource_location = batch.resource_location;
        n.publisher_info = batch.publisher_info;
        n.frontdoor_location = batch.frontdoor_location;
        n.home_tenant_id = batch.home_tenant_id;
        n.resource_home_tenant_id = batch.resource_home_tenant_id;
        n.api_version = batch.api_version;
        n.additional_batch_properties = batch.additional_batch_properties;
        Ok(n)
    }

    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub fn item_count(&self) -> usize {
        self.resources.len()
    }

    pub fn has_promise(&self) -> bool {
        self.resolver.is_some()
    }

    pub(crate) fn set_ctx(
        &mut self,
        ctx: Context,
    ) {
        self.ctx = ctx;
    }

    pub(crate) fn attach(
        &mut self,
        resolver: Resolver,
    ) {
        self.resolver = Some(resolver);
    }

    /// Stamps the producer status and fills item-level fields the caller set
    /// only once on the batch. Item values that are already set are kept so
    /// validation can catch contradictions.
    pub(crate) fn prepare_resources(&mut self) {
        for r in &mut self.resources {
            r.status_code = STATUS_CODE_OK.to_string();
            if r.home_tenant_id.is_empty() {
                r.home_tenant_id.clone_from(&self.home_tenant_id);
            }
            if r.resource_home_tenant_id.is_empty() {
                r.resource_home_tenant_id.clone_from(&self.resource_home_tenant_id);
            }
            if r.arm_resource.location.is_empty() && !r.arm_resource.is_empty() {
                r.arm_resource.location.clone_from(&self.resource_location);
            }
        }
    }

    /// Delivers the outcome exactly once: to the promise when there is one,
    /// otherwise failures go to `errors`. A full error channel drops the error.
    pub(crate) fn resolve(
        &mut self,
        outcome: Result<()>,
        errors: &mpsc::Sender<Error>,
    ) {
        match self.resolver.take() {
            Some(resolver) => {
                if let Err(bug) = resolver.resolve(outcome) {
                    report(errors, bug);
                }
            }
            None => {
                if let Err(e) = outcome {
                    report(errors, e);
                }
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Batch {
    #[serde(default)]
    resource_location: String,
    #[serde(default)]
    publisher_info: String,
    #[serde(default)]
    frontdoor_location: String,
    #[serde(default)]
    home_tenant_id: String,
    #[serde(default)]
    resource_home_tenant_id: String,
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    additional_batch_properties: Option<Map<String, Value>>,
    resources: Vec<NotificationResource>,
}

fn report(
    errors: &mpsc::Sender<Error>,
    e: Error,
) {
    match errors.try_send(e) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(e)) => {
            warn!("error channel full, dropping: {}", e);
        }
        Err(mpsc::error::TrySendError::Closed(e)) => {
            debug!("error channel closed, dropping: {}", e);
        }
    }
}

impl Drop for Notification {
    fn drop(&mut self) {
        if let Some(resolver) = self.resolver.take() {
            error!("BUG: notification dropped before its outcome was resolved");
            let _ = resolver.resolve(Err(Error::InvariantViolation(
                "notification dropped before its outcome was resolved".into(),
            )));
        }
    }
}
