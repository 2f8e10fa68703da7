//! Audit trail of entity mutations
//!
//! [`classify`] is the single decision table turning a mutation into an
//! activity type, title, description and metadata. [`AuditRecorder`] writes
//! the result; callers that must not fail on audit loss use
//! [`AuditRecorder::record_best_effort`].

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{CrmError, CrmResult},
    models::{
        ActivityKind, ActivityRecord, ActivityType, Contact, Deal, EntityKind, NewActivity, Task,
    },
    repositories::ActivityRepository,
    tenant::TenantScope,
};

/// Audit-relevant view of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct AuditSubject {
    pub kind: EntityKind,
    pub id: Uuid,
    pub organization_id: Uuid,
    pub display_name: String,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    /// Deal stage or task status
    pub state: Option<&'static str>,
    /// Kind-specific headline captured when the entity is created
    pub headline: Value,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Entities that can describe themselves to the audit trail
pub trait Auditable {
    fn audit_subject(&self) -> AuditSubject;
}

impl Auditable for Contact {
    fn audit_subject(&self) -> AuditSubject {
        AuditSubject {
            kind: EntityKind::Contact,
            id: self.id,
            organization_id: self.organization_id,
            display_name: self.display_name(),
            contact_id: Some(self.id),
            deal_id: None,
            task_id: None,
            state: None,
            headline: json!({}),
            completed_at: None,
        }
    }
}

impl Auditable for Deal {
    fn audit_subject(&self) -> AuditSubject {
        AuditSubject {
            kind: EntityKind::Deal,
            id: self.id,
            organization_id: self.organization_id,
            display_name: self.title.clone(),
            contact_id: self.contact_id,
            deal_id: Some(self.id),
            task_id: None,
            state: Some(self.stage.as_str()),
            headline: json!({ "value": self.value, "currency": self.currency }),
            completed_at: None,
        }
    }
}

impl Auditable for Task {
    fn audit_subject(&self) -> AuditSubject {
        AuditSubject {
            kind: EntityKind::Task,
            id: self.id,
            organization_id: self.organization_id,
            display_name: self.title.clone(),
            contact_id: self.contact_id,
            deal_id: self.deal_id,
            task_id: Some(self.id),
            state: Some(self.status.as_str()),
            headline: json!({ "priority": self.priority, "due_date": self.due_date }),
            completed_at: self.completed_at,
        }
    }
}

/// A primary write that succeeded and needs an audit record
#[derive(Debug, Clone, Copy)]
pub enum Mutation<'a> {
    Created {
        after: &'a AuditSubject,
    },
    Updated {
        before: &'a AuditSubject,
        after: &'a AuditSubject,
        changed_fields: &'a [&'static str],
    },
    Deleted {
        before: &'a AuditSubject,
    },
}

impl<'a> Mutation<'a> {
    /// The entity the record describes
    pub fn subject(&self) -> &'a AuditSubject {
        match *self {
            Mutation::Created { after } => after,
            Mutation::Updated { after, .. } => after,
            Mutation::Deleted { before } => before,
        }
    }
}

/// Outcome of classifying a mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub activity_type: ActivityType,
    pub title: &'static str,
    pub description: String,
    pub metadata: Value,
}

fn subject_label(subject: &AuditSubject) -> String {
    match subject.kind {
        EntityKind::Contact => subject.display_name.clone(),
        _ => format!("\"{}\"", subject.display_name),
    }
}

const COMPLETED: &str = "completed";

/// Map a mutation to its activity
pub fn classify(mutation: &Mutation<'_>) -> Classification {
    let subject = mutation.subject();
    let noun = subject.kind.as_str();
    let label = subject_label(subject);

    let (kind, description, metadata) = match mutation {
        Mutation::Created { after } => (
            ActivityKind::Created,
            format!("Created {} {}", noun, label),
            after.headline.clone(),
        ),
        Mutation::Deleted { .. } => (
            ActivityKind::Deleted,
            format!("Deleted {} {}", noun, label),
            json!({}),
        ),
        Mutation::Updated {
            before,
            after,
            changed_fields,
        } => match (after.kind, before.state, after.state) {
            (EntityKind::Deal, Some(old), Some(new)) if old != new => (
                ActivityKind::StageChanged,
                format!("Changed {} {} from {} to {}", noun, label, old, new),
                json!({ "old": old, "new": new }),
            ),
            (EntityKind::Task, Some(old), Some(COMPLETED)) if old != COMPLETED => (
                ActivityKind::Completed,
                format!("Completed {} {}", noun, label),
                json!({ "completed_at": after.completed_at }),
            ),
            _ => (
                ActivityKind::Updated,
                format!("Updated {} {}", noun, label),
                json!({ "changed_fields": changed_fields }),
            ),
        },
    };

    // Every (kind, entity) pair produced above is part of the closed set
    let activity_type = ActivityType::for_mutation(subject.kind, kind).unwrap_or(match subject.kind {
        EntityKind::Contact => ActivityType::ContactUpdated,
        EntityKind::Deal => ActivityType::DealUpdated,
        EntityKind::Task => ActivityType::TaskUpdated,
    });

    Classification {
        activity_type,
        title: activity_type.title(),
        description,
        metadata,
    }
}

/// Appends activity records for successful mutations
#[derive(Clone)]
pub struct AuditRecorder {
    activities: ActivityRepository,
}

impl AuditRecorder {
    pub fn new(activities: ActivityRepository) -> Self {
        Self { activities }
    }

    /// Write exactly one activity record for `mutation`
    pub async fn record(
        &self,
        scope: &TenantScope,
        mutation: &Mutation<'_>,
    ) -> CrmResult<ActivityRecord> {
        let subject = mutation.subject();
        if subject.organization_id != scope.organization_id {
            return Err(CrmError::Unauthorized {
                kind: subject.kind,
                id: subject.id,
            });
        }

        let classification = classify(mutation);
        let activity = NewActivity {
            organization_id: scope.organization_id,
            user_id: scope.actor_id,
            contact_id: subject.contact_id,
            deal_id: subject.deal_id,
            task_id: subject.task_id,
            activity_type: classification.activity_type,
            title: classification.title.to_string(),
            description: classification.description,
            metadata: classification.metadata,
        };

        let record = self.activities.insert(&activity).await?;
        info!(
            entity = %subject.kind,
            id = %subject.id,
            activity = %record.activity_type,
            "Recorded activity"
        );
        Ok(record)
    }

    /// Record `mutation` after its primary write, logging and suppressing
    /// any failure
    pub async fn record_best_effort(
        &self,
        scope: &TenantScope,
        mutation: &Mutation<'_>,
    ) -> Option<ActivityRecord> {
        match self.record(scope, mutation).await {
            Ok(record) => Some(record),
            Err(e) => {
                let subject = mutation.subject();
                warn!(
                    entity = %subject.kind,
                    id = %subject.id,
                    organization_id = %scope.organization_id,
                    activity = %classify(mutation).activity_type,
                    "Failed to record activity: {}",
                    e
                );
                None
            }
        }
    }

    /// Activities referencing one entity within the scope, newest first
    pub async fn history(
        &self,
        scope: &TenantScope,
        kind: EntityKind,
        id: Uuid,
    ) -> CrmResult<Vec<ActivityRecord>> {
        self.activities
            .list_for_entity(scope.organization_id, kind, id)
            .await
    }

    /// Every activity of the scope's organization, newest first
    pub async fn feed(&self, scope: &TenantScope) -> CrmResult<Vec<ActivityRecord>> {
        self.activities.list(scope.organization_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DealStage, TaskStatus};

    fn deal_subject(stage: DealStage) -> AuditSubject {
        AuditSubject {
            kind: EntityKind::Deal,
            id: Uuid::nil(),
            organization_id: Uuid::nil(),
            display_name: "Acme renewal".to_string(),
            contact_id: None,
            deal_id: Some(Uuid::nil()),
            task_id: None,
            state: Some(stage.as_str()),
            headline: json!({}),
            completed_at: None,
        }
    }

    fn task_subject(status: TaskStatus, completed_at: Option<DateTime<Utc>>) -> AuditSubject {
        AuditSubject {
            kind: EntityKind::Task,
            id: Uuid::nil(),
            organization_id: Uuid::nil(),
            display_name: "Call back".to_string(),
            contact_id: None,
            deal_id: None,
            task_id: Some(Uuid::nil()),
            state: Some(status.as_str()),
            headline: json!({}),
            completed_at,
        }
    }

    #[test]
    fn test_stage_change_carries_old_and_new() {
        let before = deal_subject(DealStage::Prospecting);
        let after = deal_subject(DealStage::Proposal);
        let c = classify(&Mutation::Updated {
            before: &before,
            after: &after,
            changed_fields: &["stage"],
        });
        assert_eq!(c.activity_type, ActivityType::DealStageChanged);
        assert_eq!(c.metadata, json!({"old": "prospecting", "new": "proposal"}));
        assert_eq!(
            c.description,
            "Changed deal \"Acme renewal\" from prospecting to proposal"
        );
    }

    #[test]
    fn test_same_stage_is_generic_update() {
        let before = deal_subject(DealStage::Proposal);
        let after = deal_subject(DealStage::Proposal);
        let c = classify(&Mutation::Updated {
            before: &before,
            after: &after,
            changed_fields: &["stage", "notes"],
        });
        assert_eq!(c.activity_type, ActivityType::DealUpdated);
        assert_eq!(c.metadata, json!({"changed_fields": ["stage", "notes"]}));
    }

    #[test]
    fn test_first_completion_only() {
        let now = Utc::now();
        let pending = task_subject(TaskStatus::Pending, None);
        let done = task_subject(TaskStatus::Completed, Some(now));

        let first = classify(&Mutation::Updated {
            before: &pending,
            after: &done,
            changed_fields: &["status"],
        });
        assert_eq!(first.activity_type, ActivityType::TaskCompleted);
        assert_eq!(first.title, "Task Completed");

        let again = classify(&Mutation::Updated {
            before: &done,
            after: &done,
            changed_fields: &["status"],
        });
        assert_eq!(again.activity_type, ActivityType::TaskUpdated);
    }

    #[test]
    fn test_contact_description_is_unquoted() {
        let contact = AuditSubject {
            kind: EntityKind::Contact,
            display_name: "Ada Lovelace".to_string(),
            ..deal_subject(DealStage::Prospecting)
        };
        let c = classify(&Mutation::Created { after: &contact });
        assert_eq!(c.activity_type, ActivityType::ContactCreated);
        assert_eq!(c.description, "Created contact Ada Lovelace");
    }
}
