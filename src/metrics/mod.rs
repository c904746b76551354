//! Prometheus collectors for event delivery and promise completion.
//!
//! Collectors live in a [`Metrics`] value that is created and registered
//! explicitly, then injected into the client. [`Metrics::global`] offers a
//! process-wide instance registered with [`REGISTRY`] for callers that do not
//! manage their own registry. Recording never blocks and never fails.

use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;

use crate::Error;

pub const DEFAULT_NAMESPACE: &str = "arn_sdk";

const SUCCESS_LABEL: &str = "success";
const INLINE_LABEL: &str = "inline";
const ERROR_LABEL: &str = "error";
const TIMEOUT_LABEL: &str = "timeout";

/// Millisecond buckets for send latency.
const LATENCY_BUCKETS_MS: &[f64] = &[
    50.0, 100.0, 200.0, 400.0, 600.0, 800.0, 1000.0, 1250.0, 1500.0, 2000.0, 3000.0, 4000.0, 5000.0, 10000.0,
    60000.0, 300000.0, 600000.0,
];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    static ref GLOBAL_METRICS: Arc<Metrics> = {
        let metrics = Metrics::new(DEFAULT_NAMESPACE).expect("metric can not be created");
        if let Err(e) = metrics.register(&REGISTRY) {
            warn!("could not register global metrics: {}", e);
        }
        Arc::new(metrics)
    };
}

#[derive(Debug, Clone)]
pub struct Metrics {
    event_sent: IntCounterVec,
    event_bytes: IntCounterVec,
    event_latency: HistogramVec,
    promise_completed: IntCounterVec,
    promise_current: IntGauge,
}

impl Metrics {
    pub fn new(namespace: &str) -> prometheus::Result<Self> {
        let event_sent = IntCounterVec::new(
            Opts::new("event_sent_total", "total number of events sent by the client").namespace(namespace),
            &[SUCCESS_LABEL, INLINE_LABEL],
        )?;
        let event_bytes = IntCounterVec::new(
            Opts::new(
                "event_sent_bytes_total",
                "total number of bytes in event data sent by the client",
            )
            .namespace(namespace),
            &[SUCCESS_LABEL, INLINE_LABEL],
        )?;
        let event_latency = HistogramVec::new(
            HistogramOpts::new("event_sent_ms", "time spent to send an event")
                .namespace(namespace)
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &[SUCCESS_LABEL, INLINE_LABEL],
        )?;
        let promise_completed = IntCounterVec::new(
            Opts::new("promise_total", "total number of promises completed by the client").namespace(namespace),
            &[ERROR_LABEL, TIMEOUT_LABEL],
        )?;
        let promise_current = IntGauge::with_opts(
            Opts::new("current_promise_count", "current number of outstanding promises").namespace(namespace),
        )?;

        Ok(Self {
            event_sent,
            event_bytes,
            event_latency,
            promise_completed,
            promise_current,
        })
    }

    /// Registers every collector with `registry`.
    pub fn register(
        &self,
        registry: &Registry,
    ) -> prometheus::Result<()> {
        registry.register(Box::new(self.event_sent.clone()))?;
        registry.register(Box::new(self.event_bytes.clone()))?;
        registry.register(Box::new(self.event_latency.clone()))?;
        registry.register(Box::new(self.promise_completed.clone()))?;
        registry.register(Box::new(self.promise_current.clone()))?;
        Ok(())
    }

    /// Process-wide instance registered with [`REGISTRY`].
    pub fn global() -> Arc<Metrics> {
        GLOBAL_METRICS.clone()
    }

    pub fn send_event_success(
        &self,
        elapsed: Duration,
        inline: bool,
        data_size: u64,
    ) {
        self.send_event(true, elapsed, inline, data_size);
    }

    pub fn send_event_failure(
        &self,
        elapsed: Duration,
        inline: bool,
        data_size: u64,
    ) {
        self.send_event(false, elapsed, inline, data_size);
    }

    fn send_event(
        &self,
        success: bool,
        elapsed: Duration,
        inline: bool,
        data_size: u64,
    ) {
        let labels = [bool_label(success), bool_label(inline)];
        self.event_sent.with_label_values(&labels).inc();
        self.event_bytes.with_label_values(&labels).inc_by(data_size);
        self.event_latency
            .with_label_values(&labels)
            .observe(elapsed.as_millis() as f64);
    }

    /// Called when a promise is handed out.
    pub fn promise_acquired(&self) {
        self.promise_current.inc();
    }

    /// Called when a promise goes back to the pool.
    pub fn promise_released(&self) {
        self.promise_current.dec();
    }

    /// Called when a wait on a promise ends, successfully or not.
    pub fn promise_completed(
        &self,
        outcome: &std::result::Result<(), Error>,
    ) {
        let (is_err, is_timeout) = match outcome {
            Ok(()) => (false, false),
            Err(Error::PromiseTimeout) => (true, true),
            Err(_) => (true, false),
        };
        self.promise_completed
            .with_label_values(&[bool_label(is_err), bool_label(is_timeout)])
            .inc();
    }

    pub fn events_sent(
        &self,
        success: bool,
        inline: bool,
    ) -> u64 {
        self.event_sent
            .with_label_values(&[bool_label(success), bool_label(inline)])
            .get()
    }

    pub fn event_bytes_sent(
        &self,
        success: bool,
        inline: bool,
    ) -> u64 {
        self.event_bytes
            .with_label_values(&[bool_label(success), bool_label(inline)])
            .get()
    }

    pub fn promises_completed(
        &self,
        error: bool,
        timeout: bool,
    ) -> u64 {
        self.promise_completed
            .with_label_values(&[bool_label(error), bool_label(timeout)])
            .get()
    }

    pub fn current_promises(&self) -> i64 {
        self.promise_current.get()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new(DEFAULT_NAMESPACE).expect("metric can not be created")
    }
}

fn bool_label(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

/// Renders everything in `registry` in the Prometheus text format.
pub fn gather_text(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!("could not encode metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
