//! Activity records: the append-only audit trail of entity mutations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::EntityKind;

/// Kind of mutation an activity describes, independent of the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Created,
    Updated,
    StageChanged,
    Completed,
    Deleted,
}

/// Closed set of activity types stored in the `type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ContactCreated,
    ContactUpdated,
    ContactDeleted,
    DealCreated,
    DealUpdated,
    DealStageChanged,
    DealDeleted,
    TaskCreated,
    TaskUpdated,
    TaskCompleted,
    TaskDeleted,
}

impl ActivityType {
    /// Resolve the activity type for a mutation of the given entity kind.
    ///
    /// Returns `None` for combinations outside the closed set (a contact
    /// cannot change stage, a deal cannot be completed).
    pub fn for_mutation(entity: EntityKind, kind: ActivityKind) -> Option<Self> {
        use ActivityKind as K;
        use EntityKind as E;
        let resolved = match (entity, kind) {
            (E::Contact, K::Created) => ActivityType::ContactCreated,
            (E::Contact, K::Updated) => ActivityType::ContactUpdated,
            (E::Contact, K::Deleted) => ActivityType::ContactDeleted,
            (E::Deal, K::Created) => ActivityType::DealCreated,
            (E::Deal, K::Updated) => ActivityType::DealUpdated,
            (E::Deal, K::StageChanged) => ActivityType::DealStageChanged,
            (E::Deal, K::Deleted) => ActivityType::DealDeleted,
            (E::Task, K::Created) => ActivityType::TaskCreated,
            (E::Task, K::Updated) => ActivityType::TaskUpdated,
            (E::Task, K::Completed) => ActivityType::TaskCompleted,
            (E::Task, K::Deleted) => ActivityType::TaskDeleted,
            _ => return None,
        };
        Some(resolved)
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            ActivityType::ContactCreated
            | ActivityType::ContactUpdated
            | ActivityType::ContactDeleted => EntityKind::Contact,
            ActivityType::DealCreated
            | ActivityType::DealUpdated
            | ActivityType::DealStageChanged
            | ActivityType::DealDeleted => EntityKind::Deal,
            ActivityType::TaskCreated
            | ActivityType::TaskUpdated
            | ActivityType::TaskCompleted
            | ActivityType::TaskDeleted => EntityKind::Task,
        }
    }

    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityType::ContactCreated | ActivityType::DealCreated | ActivityType::TaskCreated => {
                ActivityKind::Created
            }
            ActivityType::ContactUpdated | ActivityType::DealUpdated | ActivityType::TaskUpdated => {
                ActivityKind::Updated
            }
            ActivityType::DealStageChanged => ActivityKind::StageChanged,
            ActivityType::TaskCompleted => ActivityKind::Completed,
            ActivityType::ContactDeleted | ActivityType::DealDeleted | ActivityType::TaskDeleted => {
                ActivityKind::Deleted
            }
        }
    }

    /// Short human-readable title, e.g. "Deal Stage Changed"
    pub fn title(&self) -> &'static str {
        match self {
            ActivityType::ContactCreated => "Contact Created",
            ActivityType::ContactUpdated => "Contact Updated",
            ActivityType::ContactDeleted => "Contact Deleted",
            ActivityType::DealCreated => "Deal Created",
            ActivityType::DealUpdated => "Deal Updated",
            ActivityType::DealStageChanged => "Deal Stage Changed",
            ActivityType::DealDeleted => "Deal Deleted",
            ActivityType::TaskCreated => "Task Created",
            ActivityType::TaskUpdated => "Task Updated",
            ActivityType::TaskCompleted => "Task Completed",
            ActivityType::TaskDeleted => "Task Deleted",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind() {
            ActivityKind::Created => "created",
            ActivityKind::Updated => "updated",
            ActivityKind::StageChanged => "stage_changed",
            ActivityKind::Completed => "completed",
            ActivityKind::Deleted => "deleted",
        };
        write!(f, "{}_{}", self.entity(), kind)
    }
}

/// Stored activity record; never updated or deleted by this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    /// Whether the record references the given entity
    pub fn references(&self, kind: EntityKind, id: Uuid) -> bool {
        let subject = match kind {
            EntityKind::Contact => self.contact_id,
            EntityKind::Deal => self.deal_id,
            EntityKind::Task => self.task_id,
        };
        subject == Some(id)
    }
}

/// Activity creation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub activity_type: ActivityType,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_matches_display() {
        for ty in [
            ActivityType::ContactCreated,
            ActivityType::DealStageChanged,
            ActivityType::TaskCompleted,
            ActivityType::TaskDeleted,
        ] {
            let wire = serde_json::to_value(ty).expect("serialize");
            assert_eq!(wire, serde_json::Value::String(ty.to_string()));
        }
    }

    #[test]
    fn test_closed_set_rejects_foreign_combinations() {
        assert_eq!(
            ActivityType::for_mutation(EntityKind::Contact, ActivityKind::StageChanged),
            None
        );
        assert_eq!(
            ActivityType::for_mutation(EntityKind::Deal, ActivityKind::Completed),
            None
        );
        assert_eq!(
            ActivityType::for_mutation(EntityKind::Task, ActivityKind::Completed),
            Some(ActivityType::TaskCompleted)
        );
    }
}
