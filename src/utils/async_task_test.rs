use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::async_task::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::Context;
use crate::TransportError;

fn policy(max_retries: usize) -> BackoffPolicy {
    BackoffPolicy {
        base_delay_ms: 10,
        max_delay_ms: 100,
        timeout_ms: 1000,
        max_retries,
    }
}

fn unavailable() -> TransportError {
    TransportError::Status {
        status: 503,
        body: String::new(),
    }
}

#[tokio::test]
async fn test_task_with_timeout_and_exponential_backoff_success() {
    tokio::time::pause();
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            let current = counter.fetch_add(1, Ordering::SeqCst);
            if current == 0 {
                Err(unavailable())
            } else {
                Ok::<_, TransportError>(current)
            }
        }
    };

    let result = task_with_timeout_and_exponential_backoff(&Context::background(), task, policy(3)).await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2); // 1 failure + 1 success
}

#[tokio::test]
async fn test_task_with_timeout_and_exponential_backoff_max_retries() {
    tokio::time::pause();
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(unavailable())
        }
    };

    let result = task_with_timeout_and_exponential_backoff(&Context::background(), task, policy(3)).await;

    match result {
        Err(TransportError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, TransportError::Status { status: 503, .. }));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(TransportError::Status {
                status: 400,
                body: "bad".into(),
            })
        }
    };

    let result = task_with_timeout_and_exponential_backoff(&Context::background(), task, policy(5)).await;

    assert!(matches!(result, Err(TransportError::Status { status: 400, .. })));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_task_with_timeout_and_exponential_backoff_timeout() {
    tokio::time::pause();
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let task = move || {
        let counter = counter_clone.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<u32, TransportError>(42)
        }
    };

    let policy = BackoffPolicy {
        base_delay_ms: 10,
        max_delay_ms: 100,
        timeout_ms: 100, // Short timeout
        max_retries: 2,
    };

    let result = task_with_timeout_and_exponential_backoff(&Context::background(), task, policy).await;

    match result {
        Err(TransportError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, TransportError::Timeout(_)));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancelled_context_stops_retrying() {
    let ctx = Context::background();
    ctx.cancel();

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let task = move || {
        let counter = counter_clone.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<u32, TransportError>(1)
        }
    };

    let result = task_with_timeout_and_exponential_backoff(&ctx, task, policy(3)).await;

    assert!(matches!(result, Err(TransportError::Context("context canceled"))));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_jitter_stays_within_half_the_delay() {
    use super::async_task::with_jitter;

    assert_eq!(with_jitter(Duration::from_millis(1)), Duration::from_millis(1));
    for _ in 0..100 {
        let d = with_jitter(Duration::from_millis(200));
        assert!(d >= Duration::from_millis(200));
        assert!(d <= Duration::from_millis(300));
    }
}
