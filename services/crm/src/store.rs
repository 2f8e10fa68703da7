//! Client state store
//!
//! Holds the current actor, the entities loaded so far and the status of
//! in-flight operations. Every change publishes a new immutable
//! [`StoreSnapshot`]; readers take a snapshot reference and never lock.
//! Concurrent writes to the same cached entity resolve as last write wins.

use arc_swap::ArcSwap;
use std::{fmt::Display, future::Future, sync::Arc};
use uuid::Uuid;

use crate::models::{Actor, Contact, Deal, Task};

/// Immutable view of the client state
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub actor: Option<Actor>,
    pub contacts: Arc<Vec<Contact>>,
    pub deals: Arc<Vec<Deal>>,
    pub tasks: Arc<Vec<Task>>,
    pub in_flight: usize,
    pub last_error: Option<String>,
}

impl StoreSnapshot {
    /// Whether any tracked operation is still running
    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }
}

/// Entity kinds cached by the store
pub trait Cached: Clone + Send + Sync + 'static {
    fn cache_id(&self) -> Uuid;

    fn slot(snapshot: &StoreSnapshot) -> &Arc<Vec<Self>>;

    fn slot_mut(snapshot: &mut StoreSnapshot) -> &mut Arc<Vec<Self>>;
}

impl Cached for Contact {
    fn cache_id(&self) -> Uuid {
        self.id
    }

    fn slot(snapshot: &StoreSnapshot) -> &Arc<Vec<Self>> {
        &snapshot.contacts
    }

    fn slot_mut(snapshot: &mut StoreSnapshot) -> &mut Arc<Vec<Self>> {
        &mut snapshot.contacts
    }
}

impl Cached for Deal {
    fn cache_id(&self) -> Uuid {
        self.id
    }

    fn slot(snapshot: &StoreSnapshot) -> &Arc<Vec<Self>> {
        &snapshot.deals
    }

    fn slot_mut(snapshot: &mut StoreSnapshot) -> &mut Arc<Vec<Self>> {
        &mut snapshot.deals
    }
}

impl Cached for Task {
    fn cache_id(&self) -> Uuid {
        self.id
    }

    fn slot(snapshot: &StoreSnapshot) -> &Arc<Vec<Self>> {
        &snapshot.tasks
    }

    fn slot_mut(snapshot: &mut StoreSnapshot) -> &mut Arc<Vec<Self>> {
        &mut snapshot.tasks
    }
}

/// Shared handle to the client state; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct ClientStore {
    inner: Arc<ArcSwap<StoreSnapshot>>,
}

impl ClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.inner.load_full()
    }

    fn apply(&self, f: impl Fn(&mut StoreSnapshot)) {
        self.inner.rcu(|current| {
            let mut next = StoreSnapshot::clone(current);
            f(&mut next);
            next
        });
    }

    /// Mark an operation as started
    pub fn begin(&self) {
        self.apply(|s| s.in_flight += 1);
    }

    /// Mark an operation as finished successfully
    pub fn finish_ok(&self) {
        self.apply(|s| {
            s.in_flight = s.in_flight.saturating_sub(1);
            s.last_error = None;
        });
    }

    /// Mark an operation as failed with a human-readable reason
    pub fn finish_err(&self, reason: &str) {
        self.apply(|s| {
            s.in_flight = s.in_flight.saturating_sub(1);
            s.last_error = Some(reason.to_string());
        });
    }

    /// Run `operation` with the loading flag raised and record its outcome
    pub async fn track<T, E: Display>(
        &self,
        operation: impl Future<Output = Result<T, E>>,
    ) -> Result<T, E> {
        self.begin();
        let result = operation.await;
        match &result {
            Ok(_) => self.finish_ok(),
            Err(e) => self.finish_err(&e.to_string()),
        }
        result
    }

    pub fn set_actor(&self, actor: Option<Actor>) {
        self.apply(|s| s.actor = actor.clone());
    }

    /// Cached entities of one kind, newest first
    pub fn entities<T: Cached>(&self) -> Arc<Vec<T>> {
        T::slot(&self.snapshot()).clone()
    }

    pub fn replace_all<T: Cached>(&self, items: Vec<T>) {
        let items = Arc::new(items);
        self.apply(|s| *T::slot_mut(s) = items.clone());
    }

    /// Insert or replace one entity; new entities go to the front
    pub fn upsert<T: Cached>(&self, item: T) {
        self.apply(|s| {
            let items = Arc::make_mut(T::slot_mut(s));
            match items.iter().position(|i| i.cache_id() == item.cache_id()) {
                Some(index) => items[index] = item.clone(),
                None => items.insert(0, item.clone()),
            }
        });
    }

    pub fn remove<T: Cached>(&self, id: Uuid) {
        self.apply(|s| {
            if T::slot(s).iter().any(|i| i.cache_id() == id) {
                Arc::make_mut(T::slot_mut(s)).retain(|i| i.cache_id() != id);
            }
        });
    }

    /// Drop the actor and every cached entity
    pub fn clear(&self) {
        self.apply(|s| {
            let in_flight = s.in_flight;
            *s = StoreSnapshot {
                in_flight,
                ..StoreSnapshot::default()
            };
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomFields, TaskPriority, TaskStatus, TaskType};
    use chrono::Utc;

    fn task(title: &str) -> Task {
        Task {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            task_type: TaskType::Task,
            priority: TaskPriority::Medium,
            status: TaskStatus::Pending,
            due_date: None,
            completed_at: None,
            reminder_at: None,
            tags: vec![],
            notes: None,
            custom_fields: CustomFields::new(),
            contact_id: None,
            deal_id: None,
            assigned_to: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let store = ClientStore::new();
        let before = store.snapshot();

        store.upsert(task("first"));
        assert!(before.tasks.is_empty());
        assert_eq!(store.snapshot().tasks.len(), 1);
    }

    #[test]
    fn test_upsert_replaces_by_id_and_prepends_new() {
        let store = ClientStore::new();
        let mut first = task("first");
        store.upsert(first.clone());
        store.upsert(task("second"));

        first.title = "renamed".to_string();
        store.upsert(first.clone());

        let tasks = store.entities::<Task>();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "second");
        assert_eq!(tasks[1].title, "renamed");

        store.remove::<Task>(first.id);
        assert_eq!(store.entities::<Task>().len(), 1);
    }

    #[tokio::test]
    async fn test_track_records_failure_reason() {
        let store = ClientStore::new();
        let result: Result<(), String> = store.track(async { Err("backend down".to_string()) }).await;
        assert!(result.is_err());

        let snapshot = store.snapshot();
        assert!(!snapshot.loading());
        assert_eq!(snapshot.last_error.as_deref(), Some("backend down"));
    }

    #[test]
    fn test_operation_tracking() {
        let store = ClientStore::new();
        store.begin();
        store.begin();
        assert!(store.snapshot().loading());

        store.finish_err("boom");
        assert_eq!(store.snapshot().last_error.as_deref(), Some("boom"));
        store.finish_ok();
        assert!(!store.snapshot().loading());
        assert!(store.snapshot().last_error.is_none());
    }
}
