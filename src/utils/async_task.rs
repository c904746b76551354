use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Context;
use crate::Error;
use crate::TransportError;

/// Runs `task` until it succeeds, fails permanently, or the policy's attempts
/// run out. Each attempt is bounded by `policy.timeout_ms`; the delay between
/// attempts doubles up to `policy.max_delay_ms`, plus up to half of it again
/// as jitter. Only
/// [`TransportError::is_transient`] failures are retried. The whole loop
/// stops as soon as `ctx` ends.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    ctx: &Context,
    mut task: F,
    policy: BackoffPolicy,
) -> std::result::Result<P, TransportError>
where
    F: FnMut() -> T,
    T: std::future::Future<Output = std::result::Result<P, TransportError>>,
{
    let max_retries = policy.max_retries.max(1);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut current_delay = Duration::from_millis(policy.base_delay_ms);

    let mut retries = 0;
    loop {
        debug!("Attempt {} of {}", retries + 1, max_retries);
        let attempt = tokio::select! {
            biased;
            e = ctx.done() => return Err(context_error(e)),
            r = timeout(timeout_duration, task()) => r,
        };

        let last_error = match attempt {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) if !e.is_transient() => return Err(e),
            Ok(Err(e)) => {
                warn!("transient failure: {}", e);
                e
            }
            Err(_) => {
                warn!("Task timed out after {:?}", timeout_duration);
                TransportError::Timeout(timeout_duration)
            }
        };

        retries += 1;
        if retries >= max_retries {
            warn!("Task failed after {} retries", retries);
            return Err(TransportError::RetriesExhausted {
                attempts: retries,
                last: Box::new(last_error),
            });
        }

        let delay = with_jitter(current_delay);
        debug!("Retrying in {:?}...", delay);
        tokio::select! {
            biased;
            e = ctx.done() => return Err(context_error(e)),
            _ = sleep(delay) => {}
        }
        current_delay = (current_delay * 2).min(max_delay);
    }
}

pub(super) fn with_jitter(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 2) as u64;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

pub(crate) fn context_error(e: Error) -> TransportError {
    match e {
        Error::DeadlineExceeded => TransportError::Context("context deadline exceeded"),
        _ => TransportError::Context("context canceled"),
    }
}
