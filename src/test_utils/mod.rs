//! the test_utils folder here will share utils or test components between unit
//! tests and integration tests
mod transport;

pub use transport::*;

use serde_json::json;

use crate::models::Activity;
use crate::models::ArmResource;
use crate::models::ChangeAction;
use crate::models::NotificationResource;
use crate::Notification;

pub const TEST_RG: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg";

/// A write record for virtual machine `name` with a body of roughly `pad` bytes.
pub fn vm_resource(
    name: &str,
    pad: usize,
) -> NotificationResource {
    let id = format!("{TEST_RG}/providers/Microsoft.Compute/virtualMachines/{name}");
    let properties = json!({ "padding": "x".repeat(pad) });
    match ArmResource::new(Activity::Write, &id, Some(properties)) {
        Ok(arm) => NotificationResource::new(arm, ChangeAction::Update),
        Err(e) => panic!("test resource {id} is invalid: {e}"),
    }
}

/// A notification carrying `count` small records.
pub fn notification(count: usize) -> Notification {
    let resources = (0..count).map(|i| vm_resource(&format!("vm{i}"), 0)).collect();
    Notification::new(resources)
        .with_resource_location("eastus")
        .with_publisher_info("Microsoft.Compute")
}

/// A single-record notification whose serialized resources reach `size` bytes.
pub fn sized_notification(size: usize) -> Notification {
    Notification::new(vec![vm_resource("big", size)])
        .with_resource_location("eastus")
        .with_publisher_info("Microsoft.Compute")
}
