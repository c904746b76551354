use std::sync::Arc;

use prometheus::Registry;
use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

use super::Client;
use crate::dispatch::Dispatcher;
use crate::dispatch::SendProtocol;
use crate::dispatch::SenderLoop;
use crate::metrics::Metrics;
use crate::metrics::DEFAULT_NAMESPACE;
use crate::promise::PromisePool;
use crate::transport::Transport;
use crate::Error;
use crate::Result;
use crate::Settings;

pub struct ClientBuilder {
    settings: Settings,
    transport: Option<Arc<dyn Transport>>,
    metrics: Option<Arc<Metrics>>,
    pool: Option<Arc<PromisePool>>,
    registry: Option<Registry>,
}

impl ClientBuilder {
    /// Create a new builder from already loaded settings
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            transport: None,
            metrics: None,
            pool: None,
            registry: None,
        }
    }

    /// Set the transport used by the sender loop (required)
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use these collectors instead of building them from
    /// `settings.monitoring`
    pub fn metrics(
        mut self,
        metrics: Arc<Metrics>,
    ) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Share a promise pool between clients (default: a private pool sized by
    /// `dispatch.promise_pool_idle`)
    pub fn promise_pool(
        mut self,
        pool: Arc<PromisePool>,
    ) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Register metrics with `registry` instead of the process-wide one
    pub fn registry(
        mut self,
        registry: Registry,
    ) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validates the settings and starts the sender loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Client> {
        self.settings.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| Error::InvalidConfig("a transport is required".into()))?;

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => build_metrics(&self.settings, self.registry.as_ref())?,
        };
        let pool = self
            .pool
            .unwrap_or_else(|| PromisePool::new(self.settings.dispatch.promise_pool_idle, metrics.clone()));

        let dispatch = &self.settings.dispatch;
        let (tx, rx) = mpsc::channel(dispatch.queue_capacity);
        let (errors_tx, errors_rx) = mpsc::channel(dispatch.errors_capacity);

        let protocol = SendProtocol::new(transport, metrics, dispatch.inline_size);
        let sender = SenderLoop::new(rx, errors_tx.clone(), protocol).spawn();
        let dispatcher = Dispatcher::new(tx, errors_tx, dispatch.max_batch_items);

        info!(
            max_batch_items = dispatch.max_batch_items,
            inline_size = dispatch.inline_size,
            queue_capacity = dispatch.queue_capacity,
            "notification client started"
        );
        Ok(Client::new(
            dispatcher,
            pool,
            errors_rx,
            sender,
            dispatch.max_batch_items,
        ))
    }
}

/// Collectors per `settings.monitoring`. Disabled metrics still get private,
/// unregistered collectors so recording stays unconditional.
fn build_metrics(
    settings: &Settings,
    registry: Option<&Registry>,
) -> Result<Arc<Metrics>> {
    let monitoring = &settings.monitoring;
    if !monitoring.metrics_enabled {
        return new_metrics(DEFAULT_NAMESPACE);
    }
    if registry.is_none() && monitoring.namespace == DEFAULT_NAMESPACE {
        return Ok(Metrics::global());
    }

    let metrics = new_metrics(&monitoring.namespace)?;
    let registry = registry.unwrap_or(&*crate::metrics::REGISTRY);
    if let Err(e) = metrics.register(registry) {
        warn!("could not register client metrics: {}", e);
    }
    Ok(metrics)
}

fn new_metrics(namespace: &str) -> Result<Arc<Metrics>> {
    Metrics::new(namespace)
        .map(Arc::new)
        .map_err(|e| Error::InvalidConfig(format!("metrics: {e}")))
}
