//! End-to-end delivery through the HTTP receiver and blob store clients.

mod common;

use std::sync::Arc;
use std::time::Duration;

use arn_client::test_utils::notification;
use arn_client::test_utils::sized_notification;
use arn_client::test_utils::vm_resource;
use arn_client::Context;
use arn_client::Error;
use arn_client::Notification;
use arn_client::TransportError;
use arn_client::INLINE_SIZE;
use common::*;
use futures::future::join_all;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::ResponseTemplate;

#[tokio::test]
async fn test_small_batch_is_posted_inline() {
    let h = start(true).await;
    accept_events(&h.server, 200).await;

    h.client
        .notify(&Context::background(), notification(3).with_home_tenant_id("tenant-a"))
        .await
        .unwrap();
    h.client.close().await;

    let posted = requests(&h.server, "POST").await;
    assert_eq!(posted.len(), 1);
    assert_eq!(
        posted[0].headers.get("authorization").unwrap().to_str().unwrap(),
        format!("Bearer {TOKEN}")
    );

    let envelope = &envelopes(&h.server).await[0];
    assert_eq!(envelope["data"]["resourcesContainer"], "inline");
    assert_eq!(envelope["data"]["resources"].as_array().unwrap().len(), 3);
    assert_eq!(envelope["data"]["resources"][2]["homeTenantId"], "tenant-a");
    assert!(requests(&h.server, "PUT").await.is_empty());
    assert_eq!(h.metrics.events_sent(true, true), 1);
}

#[tokio::test]
async fn test_large_batch_is_uploaded_then_referenced() {
    let h = start(false).await;
    accept_blobs(&h.server).await;
    accept_events(&h.server, 200).await;

    h.client
        .notify(&Context::background(), sized_notification(INLINE_SIZE))
        .await
        .unwrap();
    h.client.close().await;

    let uploads = requests(&h.server, "PUT").await;
    assert_eq!(uploads.len(), 1);
    let uploaded: serde_json::Value = serde_json::from_slice(&uploads[0].body).unwrap();
    assert_eq!(uploaded.as_array().unwrap().len(), 1);

    let envelope = &envelopes(&h.server).await[0];
    assert_eq!(envelope["data"]["resourcesContainer"], "blob");
    assert!(envelope["data"]["resources"].is_null());

    let info = &envelope["data"]["resourcesBlobInfo"];
    let uri = info["blobUri"].as_str().unwrap();
    assert!(uri.starts_with(&h.server.uri()));
    assert!(uri.contains(uploads[0].url.path()));
    assert!(uri.ends_with(SAS));
    assert_eq!(info["blobSize"], uploads[0].body.len() as i64);
    assert_eq!(h.metrics.events_sent(true, false), 1);
}

#[tokio::test]
async fn test_missing_container_is_created_once() {
    let h = start(false).await;
    Mock::given(method("PUT"))
        .and(wiremock::matchers::path_regex(BLOB_PATH))
        .respond_with(ResponseTemplate::new(404).insert_header("x-ms-error-code", "ContainerNotFound"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(wiremock::matchers::query_param("restype", "container"))
        .respond_with(ResponseTemplate::new(201))
        .with_priority(1)
        .expect(1)
        .mount(&h.server)
        .await;
    accept_blobs(&h.server).await;
    accept_events(&h.server, 200).await;

    h.client
        .notify(&Context::background(), sized_notification(INLINE_SIZE))
        .await
        .unwrap();
    h.client.close().await;

    // failed upload, container create, upload retry
    assert_eq!(requests(&h.server, "PUT").await.len(), 3);
    assert_eq!(envelopes(&h.server).await.len(), 1);
}

#[tokio::test]
async fn test_upload_failure_never_reaches_receiver() {
    let h = start(false).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&h.server)
        .await;
    accept_events(&h.server, 200).await;

    let err = h
        .client
        .notify(&Context::background(), sized_notification(INLINE_SIZE))
        .await
        .unwrap_err();
    h.client.close().await;

    assert!(matches!(err, Error::Upload(_)), "{err:?}");
    assert!(requests(&h.server, "POST").await.is_empty());
    assert_eq!(h.metrics.events_sent(false, false), 1);
}

#[tokio::test]
async fn test_receiver_rejection_is_not_retried() {
    let h = start(false).await;
    Mock::given(method("POST"))
        .and(path("/arnnotify"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad event"))
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h
        .client
        .notify(&Context::background(), notification(1))
        .await
        .unwrap_err();
    h.client.close().await;

    match err {
        Error::Delivery(TransportError::Status { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad event");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_transient_receiver_failure_is_retried() {
    let h = start(true).await;
    Mock::given(method("POST"))
        .and(path("/arnnotify"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    accept_events(&h.server, 200).await;

    h.client.notify(&Context::background(), notification(1)).await.unwrap();
    h.client.close().await;

    assert_eq!(requests(&h.server, "POST").await.len(), 2);
}

#[tokio::test]
async fn test_deadline_bounds_a_slow_receiver() {
    let h = start(false).await;
    Mock::given(method("POST"))
        .and(path("/arnnotify"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&h.server)
        .await;

    let ctx = Context::background().with_timeout(Duration::from_millis(200));
    let err = h.client.notify(&ctx, notification(1)).await.unwrap_err();
    h.client.close().await;

    assert!(matches!(err, Error::DeadlineExceeded), "{err:?}");
    assert!(err.is_context());
}

#[tokio::test]
async fn test_tenant_conflict_is_rejected_before_sending() {
    let h = start(false).await;
    accept_events(&h.server, 200).await;

    let mut conflicting = vm_resource("vm1", 0);
    conflicting.resource_home_tenant_id = "other".into();
    let n = Notification::new(vec![vm_resource("vm0", 0), conflicting])
        .with_resource_location("eastus")
        .with_resource_home_tenant_id("tenant-r");

    let err = h.client.notify(&Context::background(), n).await.unwrap_err();
    h.client.close().await;

    match err {
        Error::Validation(e) => assert_eq!(e.field, "data.resources[1].resource_home_tenant_id"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_all_complete() {
    let h = start(true).await;
    accept_events(&h.server, 200).await;
    let client = Arc::new(h.client);

    let outcomes = join_all((0..16).map(|i| {
        let client = client.clone();
        async move {
            let n = Notification::new(vec![vm_resource(&format!("vm{i}"), 0)]).with_resource_location("eastus");
            client.notify(&Context::background(), n).await
        }
    }))
    .await;
    client.close().await;

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(envelopes(&h.server).await.len(), 16);
    assert_eq!(h.metrics.current_promises(), 0);
}

#[tokio::test]
async fn test_fire_and_forget_failures_reach_error_channel() {
    let h = start(false).await;
    accept_events(&h.server, 400).await;
    let mut errors = h.client.take_errors().unwrap();

    h.client.async_notify(&Context::background(), notification(1), false).await;

    let err = tokio::time::timeout(Duration::from_secs(5), errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, Error::Delivery(TransportError::Status { status: 400, .. })));
    h.client.close().await;
}
