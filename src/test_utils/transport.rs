use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use crate::transport::Locator;
use crate::transport::Transport;
use crate::utils::async_task::context_error;
use crate::Context;
use crate::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Inline(Bytes),
    Large(Bytes),
}

/// Transport double that records every call in order and can be told to fail
/// either path or to take a while per call.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    fail_inline: Option<String>,
    fail_large: Option<String>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_inline(
        mut self,
        reason: &str,
    ) -> Self {
        self.fail_inline = Some(reason.to_string());
        self
    }

    pub fn failing_large(
        mut self,
        reason: &str,
    ) -> Self {
        self.fail_large = Some(reason.to_string());
        self
    }

    pub fn with_delay(
        mut self,
        delay: Duration,
    ) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn inline_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Inline(_))).count()
    }

    pub fn large_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Large(_))).count()
    }

    /// Decoded envelopes in delivery order.
    pub fn envelopes(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Inline(b) => serde_json::from_slice(&b).ok(),
                Call::Large(_) => None,
            })
            .collect()
    }

    async fn pause(
        &self,
        ctx: &Context,
    ) -> Result<(), TransportError> {
        if let Some(delay) = self.delay {
            tokio::select! {
                e = ctx.done() => return Err(context_error(e)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_inline(
        &self,
        ctx: &Context,
        envelope: Bytes,
    ) -> Result<(), TransportError> {
        self.calls.lock().push(Call::Inline(envelope));
        self.pause(ctx).await?;
        match &self.fail_inline {
            Some(reason) => Err(TransportError::Other(reason.clone())),
            None => Ok(()),
        }
    }

    async fn send_large(
        &self,
        ctx: &Context,
        payload: Bytes,
    ) -> Result<Locator, TransportError> {
        let size = payload.len() as i64;
        let n = {
            let mut calls = self.calls.lock();
            calls.push(Call::Large(payload));
            calls.len()
        };
        self.pause(ctx).await?;
        if let Some(reason) = &self.fail_large {
            return Err(TransportError::Other(reason.clone()));
        }
        let uri = Url::parse(&format!("https://blob.example.com/container/{n}.txt?sig=test"))?;
        Ok(Locator { uri, size })
    }
}
