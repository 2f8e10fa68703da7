//! In-process backend implementations
//!
//! Both services keep their state behind tokio locks and yield to the
//! scheduler on every call so that callers observe the same interleavings
//! they would against a networked backend. Server-side defaults mirror the
//! relational schema in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use super::{AuthBackend, AuthError, AuthEvent, BackendError, Collection, DataService, Query, Row};
use crate::models::{AuthSession, AuthUser, Registration, UserMetadata};

/// Data service operation, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug)]
struct Fault {
    collection: Collection,
    operation: Operation,
    error: BackendError,
    once: bool,
}

/// Data service holding every collection in memory
#[derive(Default)]
pub struct MemoryDataService {
    tables: RwLock<HashMap<Collection, Vec<Row>>>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<HashMap<(Collection, Operation), usize>>,
}

impl MemoryDataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `operation` on `collection` with `error`
    pub async fn fail_next(&self, collection: Collection, operation: Operation, error: BackendError) {
        self.faults.lock().await.push(Fault {
            collection,
            operation,
            error,
            once: true,
        });
    }

    /// Fail every `operation` on `collection` until [`clear_faults`](Self::clear_faults)
    pub async fn fail_always(
        &self,
        collection: Collection,
        operation: Operation,
        error: BackendError,
    ) {
        self.faults.lock().await.push(Fault {
            collection,
            operation,
            error,
            once: false,
        });
    }

    pub async fn clear_faults(&self) {
        self.faults.lock().await.clear();
    }

    /// Number of times `operation` was issued against `collection`
    pub async fn calls(&self, collection: Collection, operation: Operation) -> usize {
        self.calls
            .lock()
            .await
            .get(&(collection, operation))
            .copied()
            .unwrap_or(0)
    }

    /// Raw contents of a collection in insertion order
    pub async fn rows(&self, collection: Collection) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    async fn enter(&self, collection: Collection, operation: Operation) -> Result<(), BackendError> {
        tokio::task::yield_now().await;

        *self
            .calls
            .lock()
            .await
            .entry((collection, operation))
            .or_insert(0) += 1;

        let mut faults = self.faults.lock().await;
        let position = faults
            .iter()
            .position(|f| f.collection == collection && f.operation == operation);
        match position {
            Some(index) if faults[index].once => Err(faults.remove(index).error),
            Some(index) => Err(faults[index].error.clone()),
            None => Ok(()),
        }
    }
}

fn server_defaults(collection: Collection) -> Vec<(&'static str, Value)> {
    match collection {
        Collection::Profiles => vec![("role", json!("user")), ("onboarding_completed", json!(false))],
        Collection::Organizations => vec![("subscription_plan", json!("free"))],
        Collection::Contacts => vec![
            ("tags", json!([])),
            ("lead_score", json!(0)),
            ("status", json!("active")),
            ("lifecycle_stage", json!("lead")),
            ("custom_fields", json!({})),
        ],
        Collection::Deals => vec![
            ("value", json!(0)),
            ("currency", json!("USD")),
            ("stage", json!("prospecting")),
            ("probability", json!(10)),
            ("tags", json!([])),
            ("custom_fields", json!({})),
        ],
        Collection::Tasks => vec![
            ("type", json!("task")),
            ("priority", json!("medium")),
            ("status", json!("pending")),
            ("tags", json!([])),
            ("custom_fields", json!({})),
        ],
        Collection::Activities => vec![("metadata", json!({}))],
    }
}

fn has_updated_at(collection: Collection) -> bool {
    !matches!(collection, Collection::Activities | Collection::Organizations)
}

fn sort_key(row: &Row, column: &str) -> (Option<DateTime<Utc>>, String) {
    let value = row.get(column).unwrap_or(&Value::Null);
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let instant = DateTime::parse_from_rfc3339(&text)
        .ok()
        .map(|t| t.with_timezone(&Utc));
    (instant, text)
}

#[async_trait]
impl DataService for MemoryDataService {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>, BackendError> {
        self.enter(collection, Operation::Select).await?;

        let tables = self.tables.read().await;
        // Newest rows first so that ties in the sort column keep recency
        let mut rows: Vec<Row> = tables
            .get(&collection)
            .map(|rows| rows.iter().rev().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let (a, b) = (sort_key(a, &order.column), sort_key(b, &order.column));
                if order.descending { b.cmp(&a) } else { a.cmp(&b) }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        debug!(collection = %collection, rows = rows.len(), "memory select");
        Ok(rows)
    }

    async fn insert(&self, collection: Collection, mut row: Row) -> Result<Row, BackendError> {
        self.enter(collection, Operation::Insert).await?;

        let now = json!(Utc::now());
        row.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
        row.entry("created_at").or_insert_with(|| now.clone());
        if has_updated_at(collection) {
            row.entry("updated_at").or_insert(now);
        }
        for (column, value) in server_defaults(collection) {
            row.entry(column).or_insert(value);
        }

        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        if table.iter().any(|existing| existing.get("id") == row.get("id")) {
            return Err(BackendError::UniqueViolation {
                collection,
                constraint: format!("{}_pkey", collection.table()),
            });
        }
        table.push(row.clone());

        debug!(collection = %collection, "memory insert");
        Ok(row)
    }

    async fn update(
        &self,
        collection: Collection,
        query: &Query,
        changes: Row,
    ) -> Result<Vec<Row>, BackendError> {
        self.enter(collection, Operation::Update).await?;

        let mut tables = self.tables.write().await;
        let mut updated = Vec::new();
        if let Some(table) = tables.get_mut(&collection) {
            for row in table.iter_mut().filter(|r| query.matches(r)) {
                for (column, value) in &changes {
                    row.insert(column.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }

        debug!(collection = %collection, rows = updated.len(), "memory update");
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, query: &Query) -> Result<u64, BackendError> {
        self.enter(collection, Operation::Delete).await?;

        let mut tables = self.tables.write().await;
        let removed = match tables.get_mut(&collection) {
            Some(table) => {
                let before = table.len();
                table.retain(|r| !query.matches(r));
                (before - table.len()) as u64
            }
            None => 0,
        };

        debug!(collection = %collection, removed, "memory delete");
        Ok(removed)
    }
}

struct StoredUser {
    user: AuthUser,
    password: String,
}

#[derive(Default)]
struct AuthState {
    users: HashMap<String, StoredUser>,
    access: HashMap<String, (Uuid, DateTime<Utc>)>,
    refresh: HashMap<String, Uuid>,
    sign_out_failure: Option<AuthError>,
    refresh_failure: Option<AuthError>,
    sign_in_calls: usize,
}

impl AuthState {
    fn user_by_id(&self, id: Uuid) -> Option<&AuthUser> {
        self.users.values().map(|s| &s.user).find(|u| u.id == id)
    }

    fn issue(&mut self, user: AuthUser, ttl: Duration) -> AuthSession {
        let access_token = Uuid::new_v4().simple().to_string();
        let refresh_token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + ttl;
        self.access
            .insert(access_token.clone(), (user.id, expires_at));
        self.refresh.insert(refresh_token.clone(), user.id);
        AuthSession {
            access_token,
            refresh_token,
            expires_at,
            user,
        }
    }
}

/// Auth backend holding users and opaque tokens in memory
///
/// Events are only broadcast through [`emit`](Self::emit), which lets tests
/// play the role of another client sharing the same backend.
pub struct MemoryAuthBackend {
    state: Mutex<AuthState>,
    events: broadcast::Sender<AuthEvent>,
    token_ttl: Duration,
    require_confirmation: bool,
}

impl Default for MemoryAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuthBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: Mutex::new(AuthState::default()),
            events,
            token_ttl: Duration::hours(1),
            require_confirmation: false,
        }
    }

    /// Lifetime of issued access tokens
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Hold back sessions at sign-up until the email is confirmed
    pub fn requiring_confirmation(mut self) -> Self {
        self.require_confirmation = true;
        self
    }

    /// Register a user directly, bypassing sign-up
    pub async fn add_user(&self, email: &str, password: &str, metadata: UserMetadata) -> AuthUser {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            email_confirmed: true,
            metadata,
        };
        self.state.lock().await.users.insert(
            user.email.clone(),
            StoredUser {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Issue a session for an existing user without going through sign-in
    pub async fn issue_session(&self, user_id: Uuid) -> Result<AuthSession, AuthError> {
        let mut state = self.state.lock().await;
        let user = state
            .user_by_id(user_id)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;
        Ok(state.issue(user, self.token_ttl))
    }

    pub async fn confirm_email(&self, email: &str) {
        if let Some(stored) = self.state.lock().await.users.get_mut(&email.to_lowercase()) {
            stored.user.email_confirmed = true;
        }
    }

    /// Make every following sign-out fail with `error`
    pub async fn set_sign_out_failure(&self, error: Option<AuthError>) {
        self.state.lock().await.sign_out_failure = error;
    }

    /// Make every following refresh fail with `error`
    pub async fn set_refresh_failure(&self, error: Option<AuthError>) {
        self.state.lock().await.refresh_failure = error;
    }

    pub async fn sign_in_calls(&self) -> usize {
        self.state.lock().await.sign_in_calls
    }

    /// Broadcast an event to every subscriber
    pub fn emit(&self, event: AuthEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthBackend for MemoryAuthBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.sign_in_calls += 1;

        let user = match state.users.get(&email.to_lowercase()) {
            Some(stored) if stored.password == password => stored.user.clone(),
            _ => return Err(AuthError::InvalidCredentials),
        };
        if self.require_confirmation && !user.email_confirmed {
            return Err(AuthError::Validation("Email not confirmed".to_string()));
        }
        Ok(state.issue(user, self.token_ttl))
    }

    async fn sign_up(&self, registration: &Registration) -> Result<Option<AuthSession>, AuthError> {
        tokio::task::yield_now().await;
        let email = registration.email.to_lowercase();
        let mut state = self.state.lock().await;
        if state.users.contains_key(&email) {
            return Err(AuthError::EmailTaken(email));
        }

        let user = AuthUser {
            id: Uuid::new_v4(),
            email: email.clone(),
            email_confirmed: !self.require_confirmation,
            metadata: registration.metadata(),
        };
        state.users.insert(
            email,
            StoredUser {
                user: user.clone(),
                password: registration.password.clone(),
            },
        );

        if self.require_confirmation {
            return Ok(None);
        }
        Ok(Some(state.issue(user, self.token_ttl)))
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        if let Some(error) = state.sign_out_failure.clone() {
            return Err(error);
        }
        state.access.remove(&session.access_token);
        state.refresh.remove(&session.refresh_token);
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        if let Some(error) = state.refresh_failure.clone() {
            return Err(error);
        }
        let user_id = state
            .refresh
            .remove(refresh_token)
            .ok_or(AuthError::InvalidToken)?;
        let user = state
            .user_by_id(user_id)
            .cloned()
            .ok_or(AuthError::InvalidToken)?;
        Ok(state.issue(user, self.token_ttl))
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        tokio::task::yield_now().await;
        let state = self.state.lock().await;
        let (user_id, expires_at) = *state
            .access
            .get(access_token)
            .ok_or(AuthError::InvalidToken)?;
        if expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }
        state
            .user_by_id(user_id)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
