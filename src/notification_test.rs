use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_test::traced_test;

use super::*;
use crate::metrics::Metrics;
use crate::promise::PromisePool;
use crate::test_utils::notification;
use crate::test_utils::vm_resource;
use crate::test_utils::TEST_RG;

fn pool() -> Arc<PromisePool> {
    PromisePool::new(4, Arc::new(Metrics::default()))
}

#[test]
fn test_prepare_resources_stamps_and_propagates() {
    let mut own = vm_resource("own", 0);
    own.home_tenant_id = "tenant-own".into();
    own.arm_resource.location = "westus".into();

    let mut n = Notification::new(vec![vm_resource("plain", 0), own])
        .with_resource_location("eastus")
        .with_home_tenant_id("tenant-a")
        .with_resource_home_tenant_id("tenant-r");
    n.prepare_resources();

    let plain = &n.resources[0];
    assert_eq!(plain.status_code, "OK");
    assert_eq!(plain.home_tenant_id, "tenant-a");
    assert_eq!(plain.resource_home_tenant_id, "tenant-r");
    assert_eq!(plain.arm_resource.location, "eastus");

    // Values already present are left for validation to judge.
    let own = &n.resources[1];
    assert_eq!(own.status_code, "OK");
    assert_eq!(own.home_tenant_id, "tenant-own");
    assert_eq!(own.arm_resource.location, "westus");
}

#[test]
fn test_prepare_resources_leaves_missing_body_alone() {
    let mut bare = vm_resource("bare", 0);
    bare.arm_resource = Default::default();
    let mut n = Notification::new(vec![bare]).with_resource_location("eastus");

    n.prepare_resources();

    assert!(n.resources[0].arm_resource.location.is_empty());
    assert_eq!(
        n.resources[0].resource_id,
        format!("{TEST_RG}/providers/Microsoft.Compute/virtualMachines/bare")
    );
}

#[tokio::test]
async fn test_resolve_prefers_promise_over_error_channel() {
    let pool = pool();
    let (errors_tx, mut errors_rx) = mpsc::channel(1);
    let (mut promise, resolver) = pool.acquire_armed();

    let mut n = notification(1);
    n.attach(resolver);
    assert!(n.has_promise());
    n.resolve(Err(Error::Closed), &errors_tx);
    assert!(!n.has_promise());

    assert!(matches!(promise.wait(&Context::background()).await, Err(Error::Closed)));
    assert!(errors_rx.try_recv().is_err());
    promise.release();
}

#[test]
fn test_resolve_without_promise_reports_only_failures() {
    let (errors_tx, mut errors_rx) = mpsc::channel(4);

    notification(1).resolve(Ok(()), &errors_tx);
    assert!(errors_rx.try_recv().is_err());

    notification(1).resolve(Err(Error::Canceled), &errors_tx);
    assert!(matches!(errors_rx.try_recv(), Ok(Error::Canceled)));
}

#[test]
#[traced_test]
fn test_resolve_with_full_error_channel_drops_error() {
    let (errors_tx, mut errors_rx) = mpsc::channel(1);

    notification(1).resolve(Err(Error::Canceled), &errors_tx);
    notification(1).resolve(Err(Error::DeadlineExceeded), &errors_tx);

    assert!(matches!(errors_rx.try_recv(), Ok(Error::Canceled)));
    assert!(errors_rx.try_recv().is_err());
    assert!(logs_contain("error channel full"));
}

#[tokio::test]
#[traced_test]
async fn test_dropping_unresolved_notification_fails_its_promise() {
    let pool = pool();
    let (mut promise, resolver) = pool.acquire_armed();

    let mut n = notification(1);
    n.attach(resolver);
    drop(n);

    let res = promise.wait(&Context::background()).await;
    assert!(matches!(res, Err(Error::InvariantViolation(_))));
    assert!(logs_contain("BUG:"));
    promise.release();
}

#[test]
fn test_builders_set_batch_fields() {
    let n = Notification::new(vec![vm_resource("vm", 0)])
        .with_resource_location("eastus")
        .with_publisher_info("Microsoft.Compute")
        .with_home_tenant_id("t1")
        .with_resource_home_tenant_id("t2");

    assert_eq!(n.resource_location, "eastus");
    assert_eq!(n.publisher_info, "Microsoft.Compute");
    assert_eq!(n.home_tenant_id, "t1");
    assert_eq!(n.resource_home_tenant_id, "t2");
    assert_eq!(n.item_count(), 1);
    assert!(!n.has_promise());
    assert!(n.ctx().err().is_none());
}

#[test]
fn test_from_json_reads_batch_document() {
    let doc = serde_json::json!({
        "resourceLocation": "eastus",
        "homeTenantId": "t1",
        "resources": [{
            "resourceId": format!("{TEST_RG}/providers/Microsoft.Compute/virtualMachines/vm0"),
            "armResource": {
                "id": format!("{TEST_RG}/providers/Microsoft.Compute/virtualMachines/vm0"),
                "type": "Microsoft.Compute/virtualMachines",
                "properties": {}
            },
            "resourceSystemProperties": { "changeAction": "Create" }
        }]
    });

    let n = Notification::from_json(&serde_json::to_vec(&doc).unwrap()).unwrap();
    assert_eq!(n.resource_location, "eastus");
    assert_eq!(n.home_tenant_id, "t1");
    assert_eq!(n.item_count(), 1);
    assert_eq!(n.resources[0].arm_resource.resource_type, "Microsoft.Compute/virtualMachines");
}

#[test]
fn test_from_json_requires_resources() {
    let res = Notification::from_json(br#"{"resourceLocation":"eastus"}"#);
    assert!(matches!(res, Err(Error::Serialization(_))));
}
