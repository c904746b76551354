use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::subject;
use super::Data;
use super::NotificationResource;
use crate::constants::DATA_VERSION;
use crate::constants::METADATA_VERSION;
use crate::ValidationError;

/// Envelope header. Flattened into the top level of the event document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub topic: String,
    pub subject: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub id: String,
    pub data_version: String,
    pub metadata_version: String,
}

impl EventMeta {
    /// Header for a batch: fresh ID, current time, subject scoped to the
    /// resources and event type taken from the first one.
    pub fn for_resources(resources: &[NotificationResource]) -> Result<Self, ValidationError> {
        let first = resources
            .first()
            .ok_or_else(|| ValidationError::new("resources", "must not be empty"))?;
        Ok(Self {
            topic: String::new(),
            subject: subject(resources),
            event_type: format!("{}/{}", first.arm_resource.resource_type, first.arm_resource.activity),
            event_time: Utc::now(),
            id: Uuid::new_v4().to_string(),
            data_version: DATA_VERSION.to_string(),
            metadata_version: METADATA_VERSION.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subject.is_empty() {
            return Err(ValidationError::new("subject", "is required"));
        }
        if self.event_type.is_empty() {
            return Err(ValidationError::new("event_type", "is required"));
        }
        if self.event_time.timestamp() == 0 {
            return Err(ValidationError::new("event_time", "is required"));
        }
        if self.id.is_empty() {
            return Err(ValidationError::new("id", "is required"));
        }
        if self.data_version != DATA_VERSION {
            return Err(ValidationError::new("data_version", format!("must be {DATA_VERSION}")));
        }
        if self.metadata_version != METADATA_VERSION {
            return Err(ValidationError::new(
                "metadata_version",
                format!("must be {METADATA_VERSION}"),
            ));
        }
        Ok(())
    }
}

/// The document posted to the receiver.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub data: Data,
}

impl Event {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.meta.validate()?;
        self.data.validate().map_err(|e| e.within("data"))
    }
}
