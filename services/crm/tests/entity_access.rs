//! Integration tests for tenant-scoped entity access and its audit trail
//!
//! Every test runs against the in-process backend, with one client per
//! signed-in actor sharing the same data service.

use std::sync::Arc;

use crm::{
    CrmClient, CrmError, SessionConfig,
    backend::{BackendError, Collection, MemoryAuthBackend, MemoryDataService, Operation},
    models::{
        ActivityKind, ActivityType, ContactPatch, DealPatch, DealStage, EntityKind, NewContact,
        NewDeal, NewTask, TaskPatch, TaskStatus, UserMetadata,
    },
    persistence::MemorySessionPersistence,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

const PASSWORD: &str = "Secret123";

struct Backend {
    data: Arc<MemoryDataService>,
    auth: Arc<MemoryAuthBackend>,
}

impl Backend {
    fn new() -> Self {
        Self {
            data: Arc::new(MemoryDataService::new()),
            auth: Arc::new(MemoryAuthBackend::new()),
        }
    }

    fn client(&self) -> CrmClient {
        CrmClient::new(
            self.data.clone(),
            self.auth.clone(),
            Arc::new(MemorySessionPersistence::new()),
            SessionConfig::default(),
        )
    }

    async fn signed_in(&self, email: &str, first_name: &str) -> CrmClient {
        let metadata = UserMetadata {
            first_name: Some(first_name.to_string()),
            ..Default::default()
        };
        self.auth.add_user(email, PASSWORD, metadata).await;

        let client = self.client();
        client.start().await;
        client
            .session()
            .login(email, PASSWORD)
            .await
            .expect("Failed to sign in");
        client
    }
}

fn contact(first_name: &str, last_name: &str) -> NewContact {
    NewContact {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        ..Default::default()
    }
}

fn deal(title: &str) -> NewDeal {
    NewDeal {
        title: title.to_string(),
        value: Some(25_000.0),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_records_exactly_one_created_activity() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    let organization_id = client
        .session()
        .current_actor()
        .and_then(|actor| actor.organization_id())
        .expect("actor has an organization");

    let created = assert_ok!(client.contacts().create(contact("Charles", "Babbage")).await);
    assert_eq!(created.organization_id, organization_id);
    assert_eq!(created.lead_score, 0, "server default applied");

    let history = assert_ok!(client.contacts().history(created.id).await);
    let created_records: Vec<_> = history
        .iter()
        .filter(|a| a.activity_type.kind() == ActivityKind::Created)
        .collect();
    assert_eq!(created_records.len(), 1);

    let record = created_records[0];
    assert_eq!(record.activity_type, ActivityType::ContactCreated);
    assert_eq!(record.organization_id, organization_id);
    assert!(record.references(EntityKind::Contact, created.id));
    assert_eq!(record.description, "Created contact Charles Babbage");
}

#[tokio::test]
async fn test_reads_never_cross_organizations() {
    let backend = Backend::new();
    let ada = backend.signed_in("ada@example.com", "Ada").await;
    let grace = backend.signed_in("grace@example.com", "Grace").await;

    let ada_deal = assert_ok!(ada.deals().create(deal("Analytical engine")).await);
    assert_ok!(grace.deals().create(deal("Compiler licence")).await);

    let visible = assert_ok!(grace.deals().get_all().await);
    assert_eq!(visible.len(), 1);
    assert!(visible.iter().all(|d| d.id != ada_deal.id));

    let err = assert_err!(grace.deals().get_by_id(ada_deal.id).await);
    assert!(matches!(err, CrmError::Unauthorized { kind: EntityKind::Deal, .. }));

    let patch = DealPatch {
        title: Some("Hijacked".to_string()),
        ..Default::default()
    };
    let err = assert_err!(grace.deals().update(ada_deal.id, patch).await);
    assert!(matches!(err, CrmError::Unauthorized { .. }));

    let err = assert_err!(grace.deals().delete(ada_deal.id).await);
    assert!(matches!(err, CrmError::Unauthorized { .. }));

    let untouched = assert_ok!(ada.deals().get_by_id(ada_deal.id).await);
    assert_eq!(untouched.title, "Analytical engine");
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    let created = assert_ok!(client.contacts().create(contact("Charles", "Babbage")).await);

    assert_ok!(client.contacts().delete(created.id).await);
    assert_ok!(client.contacts().delete(created.id).await);

    let history = assert_ok!(client.contacts().history(created.id).await);
    let deletions = history
        .iter()
        .filter(|a| a.activity_type == ActivityType::ContactDeleted)
        .count();
    assert_eq!(deletions, 1);

    let err = assert_err!(client.contacts().get_by_id(created.id).await);
    assert!(matches!(err, CrmError::NotFound { .. }));
    assert!(client.store().snapshot().contacts.is_empty());
}

#[tokio::test]
async fn test_task_completion_is_stamped_once() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    let task = assert_ok!(
        client
            .tasks()
            .create(NewTask {
                title: "Send proposal".to_string(),
                ..Default::default()
            })
            .await
    );
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.completed_at.is_none());

    let complete = || TaskPatch {
        status: Some(TaskStatus::Completed),
        ..Default::default()
    };
    let completed = assert_ok!(client.tasks().update(task.id, complete()).await);
    let completed_at = completed.completed_at.expect("completion stamped");
    assert!(completed_at >= task.created_at);

    let again = assert_ok!(client.tasks().update(task.id, complete()).await);
    assert_eq!(again.completed_at, Some(completed_at));

    let history = assert_ok!(client.tasks().history(task.id).await);
    let kinds: Vec<_> = history.iter().map(|a| a.activity_type).collect();
    assert_eq!(
        kinds,
        vec![
            ActivityType::TaskUpdated,
            ActivityType::TaskCompleted,
            ActivityType::TaskCreated,
        ]
    );
}

#[tokio::test]
async fn test_deal_stage_change_is_classified() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    let created = assert_ok!(client.deals().create(deal("Analytical engine")).await);
    assert_eq!(created.stage, DealStage::Prospecting);

    let to_proposal = DealPatch {
        stage: Some(DealStage::Proposal),
        ..Default::default()
    };
    assert_ok!(client.deals().update(created.id, to_proposal).await);

    let notes_only = DealPatch {
        notes: Some(Some("Asked for a discount".to_string())),
        ..Default::default()
    };
    assert_ok!(client.deals().update(created.id, notes_only).await);

    let history = assert_ok!(client.deals().history(created.id).await);
    assert_eq!(history.len(), 3);

    let updated = &history[0];
    assert_eq!(updated.activity_type, ActivityType::DealUpdated);
    assert_eq!(updated.metadata, json!({ "changed_fields": ["notes"] }));

    let stage_changed = &history[1];
    assert_eq!(stage_changed.activity_type, ActivityType::DealStageChanged);
    assert_eq!(
        stage_changed.metadata,
        json!({ "old": "prospecting", "new": "proposal" })
    );
    assert_eq!(
        stage_changed.description,
        "Changed deal \"Analytical engine\" from prospecting to proposal"
    );
}

#[tokio::test]
async fn test_empty_patch_only_touches_updated_at() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    let before = assert_ok!(client.deals().create(deal("Analytical engine")).await);

    let after = assert_ok!(client.deals().update(before.id, DealPatch::default()).await);
    assert!(after.updated_at >= before.updated_at);

    let mut normalized = after.clone();
    normalized.updated_at = before.updated_at;
    assert_eq!(normalized, before);

    let history = assert_ok!(client.deals().history(before.id).await);
    assert_eq!(history[0].activity_type, ActivityType::DealUpdated);
    assert_eq!(history[0].metadata, json!({ "changed_fields": [] }));
}

#[tokio::test]
async fn test_explicit_empty_values_are_persisted() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    let created = assert_ok!(
        client
            .contacts()
            .create(NewContact {
                email: Some("charles@example.com".to_string()),
                tags: vec!["engines".to_string()],
                ..contact("Charles", "Babbage")
            })
            .await
    );

    let patch = ContactPatch {
        email: Some(None),
        tags: Some(vec![]),
        ..Default::default()
    };
    let updated = assert_ok!(client.contacts().update(created.id, patch).await);
    assert_eq!(updated.email, None);
    assert!(updated.tags.is_empty());
    assert_eq!(updated.first_name, "Charles");
}

#[tokio::test]
async fn test_failed_audit_does_not_fail_create() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    backend
        .data
        .fail_next(
            Collection::Activities,
            Operation::Insert,
            BackendError::Network("connection reset".to_string()),
        )
        .await;

    let created = assert_ok!(client.contacts().create(contact("Charles", "Babbage")).await);
    let fetched = assert_ok!(client.contacts().get_by_id(created.id).await);
    assert_eq!(fetched.id, created.id);

    let history = assert_ok!(client.contacts().history(created.id).await);
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_failed_write_leaves_no_audit_record() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    backend
        .data
        .fail_next(Collection::Deals, Operation::Insert, BackendError::Timeout)
        .await;

    let err = assert_err!(client.deals().create(deal("Analytical engine")).await);
    assert!(matches!(err, CrmError::Upstream(BackendError::Timeout)));
    assert!(assert_ok!(client.activity_feed().await).is_empty());

    let snapshot = client.store().snapshot();
    assert!(!snapshot.loading());
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn test_invalid_payload_is_rejected_before_any_write() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;

    let err = assert_err!(client.contacts().create(contact("", "Babbage")).await);
    assert!(matches!(err, CrmError::ValidationFailed(_)));

    let err = assert_err!(
        client
            .deals()
            .create(NewDeal {
                probability: Some(140),
                ..deal("Analytical engine")
            })
            .await
    );
    assert!(matches!(err, CrmError::ValidationFailed(_)));

    assert_eq!(backend.data.calls(Collection::Contacts, Operation::Insert).await, 0);
    assert_eq!(backend.data.calls(Collection::Deals, Operation::Insert).await, 0);
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;

    let err = assert_err!(client.tasks().get_by_id(Uuid::new_v4()).await);
    assert!(matches!(err, CrmError::NotFound { kind: EntityKind::Task, .. }));
}

#[tokio::test]
async fn test_operations_require_a_session() {
    let backend = Backend::new();
    let client = backend.client();
    client.start().await;

    let err = assert_err!(client.contacts().get_all().await);
    assert!(matches!(err, CrmError::Unauthenticated(_)));
    assert!(err.requires_login());
    assert_eq!(backend.data.calls(Collection::Contacts, Operation::Select).await, 0);
}

#[tokio::test]
async fn test_get_all_fills_the_store_newest_first() {
    let backend = Backend::new();
    let client = backend.signed_in("ada@example.com", "Ada").await;
    assert_ok!(client.contacts().create(contact("Charles", "Babbage")).await);
    assert_ok!(client.contacts().create(contact("Mary", "Somerville")).await);

    let contacts = assert_ok!(client.contacts().get_all().await);
    let names: Vec<_> = contacts.iter().map(|c| c.first_name.as_str()).collect();
    assert_eq!(names, vec!["Mary", "Charles"]);
    assert_eq!(client.store().snapshot().contacts.len(), 2);

    let feed = assert_ok!(client.activity_feed().await);
    assert_eq!(feed.len(), 2);
}
