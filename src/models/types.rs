//! Resource-level wire types.
//!
//! A notification carries one or more [`NotificationResource`] records. Each
//! record describes a single changed resource; its [`ArmResource`] holds the
//! resource body the publishing service exposes.

use std::fmt;

use bytes::Bytes;
use chrono::DateTime;
use chrono::Utc;
use serde::ser::Error as _;
use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use serde_json::value::RawValue;
use serde_json::Map;
use serde_json::Value;

use super::ResourceId;
use crate::constants::STATUS_CODE_OK;
use crate::ValidationError;

/// API version stamped on resources built through [`ArmResource::new`].
pub const ARM_API_VERSION: &str = "2020-06-01";

/// Where the resource records of an event live.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourcesContainer {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Inline,
    Blob,
}

/// What happened to the resource. Drives the event type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Write,
    Delete,
    Snapshot,
}

impl fmt::Display for Activity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Activity::Unknown => "",
            Activity::Write => "write",
            Activity::Delete => "delete",
            Activity::Snapshot => "snapshot",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeAction {
    #[default]
    #[serde(rename = "")]
    Unknown,
    Create,
    Delete,
    Move,
    Update,
}

/// The resource body. Must carry the resource ID; on delete every other field
/// may be missing.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub resource_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    /// Not on the wire; selects the event type.
    #[serde(default, skip_serializing)]
    pub activity: Activity,
}

impl ArmResource {
    /// Builds a resource from its ID, deriving name and type from the path.
    pub fn new(
        activity: Activity,
        id: &str,
        properties: Option<Value>,
    ) -> Result<Self, ValidationError> {
        let rid = ResourceId::parse(id).ok_or_else(|| ValidationError::new("id", "is not a valid resource ID"))?;
        let resource = Self {
            properties,
            name: rid.name().to_string(),
            resource_type: rid.resource_type(),
            id: id.to_string(),
            location: String::new(),
            api_version: ARM_API_VERSION.to_string(),
            activity,
        };
        resource.validate()?;
        Ok(resource)
    }

    pub fn with_location(
        mut self,
        location: impl Into<String>,
    ) -> Self {
        self.location = location.into();
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        *self == ArmResource::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::new("id", "is required"));
        }
        match self.activity {
            Activity::Write | Activity::Snapshot if self.properties.is_none() => Err(ValidationError::new(
                "properties",
                format!("is required for {} activity", self.activity),
            )),
            Activity::Write | Activity::Snapshot | Activity::Delete => Ok(()),
            Activity::Unknown => Err(ValidationError::new("activity", "is unknown")),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSystemProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub modified_by: String,
    #[serde(default)]
    pub change_action: ChangeAction,
}

impl ResourceSystemProperties {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.change_action == ChangeAction::Unknown {
            return Err(ValidationError::new("change_action", "is invalid"));
        }
        Ok(())
    }
}

/// One changed resource inside a notification.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "ArmResource::is_empty")]
    pub arm_resource: ArmResource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_resource_properties: Option<Map<String, Value>>,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_resource_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    /// Always [`STATUS_CODE_OK`] for a producer; stamped before sending.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_code: String,
    #[serde(default)]
    pub resource_system_properties: ResourceSystemProperties,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub home_tenant_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_home_tenant_id: String,
}

impl NotificationResource {
    /// Record for `arm_resource`, keyed by its ID.
    pub fn new(
        arm_resource: ArmResource,
        change_action: ChangeAction,
    ) -> Self {
        Self {
            resource_event_time: Some(Utc::now()),
            resource_id: arm_resource.id.clone(),
            arm_resource,
            resource_system_properties: ResourceSystemProperties {
                change_action,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// The ID that scopes this record, preferring the body's own ID.
    pub(crate) fn scope_id(&self) -> &str {
        if self.arm_resource.id.is_empty() {
            &self.resource_id
        } else {
            &self.arm_resource.id
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.resource_id.is_empty() {
            return Err(ValidationError::new("resource_id", "is required"));
        }
        if self.status_code != STATUS_CODE_OK {
            return Err(ValidationError::new(
                "status_code",
                format!("must be {STATUS_CODE_OK}"),
            ));
        }
        if !self.arm_resource.is_empty() {
            self.arm_resource.validate().map_err(|e| e.within("arm_resource"))?;
        }
        self.resource_system_properties
            .validate()
            .map_err(|e| e.within("resource_system_properties"))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesBlobInfo {
    pub blob_uri: String,
    pub blob_size: i64,
}

impl ResourcesBlobInfo {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.blob_uri.is_empty() {
            return Err(ValidationError::new("blob_uri", "is required"));
        }
        if self.blob_size == 0 {
            return Err(ValidationError::new("blob_size", "is required"));
        }
        Ok(())
    }
}

/// Event payload. `resources` holds the already-serialized resource list for
/// inline events and is `null` for blob events.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Data {
    #[serde(serialize_with = "serialize_raw")]
    pub resources: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_batch_properties: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources_blob_info: Option<ResourcesBlobInfo>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub home_tenant_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub resource_home_tenant_id: String,
    pub resource_location: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub frontdoor_location: String,
    pub publisher_info: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    pub resources_container: ResourcesContainer,

    /// The records behind `resources`, kept for validation.
    #[serde(skip)]
    pub items: Vec<NotificationResource>,
}

impl Data {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.resources_container {
            ResourcesContainer::Unknown => {
                return Err(ValidationError::new("resources_container", "is invalid"));
            }
            ResourcesContainer::Inline => {
                if self.resources.as_ref().map_or(true, |b| b.is_empty()) {
                    return Err(ValidationError::new("resources", "is required for inline events"));
                }
            }
            ResourcesContainer::Blob => {
                if let Some(info) = &self.resources_blob_info {
                    info.validate().map_err(|e| e.within("resources_blob_info"))?;
                }
            }
        }

        if self.items.is_empty() {
            return Err(ValidationError::new("resources", "must not be empty"));
        }
        for (i, item) in self.items.iter().enumerate() {
            let path = format!("resources[{i}]");
            check_tenant(&self.home_tenant_id, &item.home_tenant_id, &path, "home_tenant_id")?;
            check_tenant(
                &self.resource_home_tenant_id,
                &item.resource_home_tenant_id,
                &path,
                "resource_home_tenant_id",
            )?;
            item.validate().map_err(|e| e.within(&path))?;
        }
        Ok(())
    }
}

/// A parent-level tenant is authoritative: a record may omit it, never contradict it.
fn check_tenant(
    parent: &str,
    item: &str,
    path: &str,
    field: &str,
) -> Result<(), ValidationError> {
    if !parent.is_empty() && !item.is_empty() && parent != item {
        return Err(ValidationError::new(
            format!("{path}.{field}"),
            format!("{item:?} conflicts with notification value {parent:?}"),
        ));
    }
    Ok(())
}

fn serialize_raw<S>(
    value: &Option<Bytes>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(S::Error::custom)?;
            let raw: &RawValue = serde_json::from_str(text).map_err(S::Error::custom)?;
            raw.serialize(serializer)
        }
        None => serializer.serialize_none(),
    }
}
