//! Contracts of the external backend the data layer talks to
//!
//! The backend is a relational data service with row-level filtering plus an
//! authentication service with a push channel for session changes. Both are
//! traits so the core can run against PostgreSQL, the in-process
//! implementations in [`memory`], or anything else that speaks rows.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub mod auth;
pub mod memory;
pub mod postgres;

pub use auth::{AuthBackend, AuthError, AuthEvent};
pub use memory::{MemoryAuthBackend, MemoryDataService, Operation};
pub use postgres::PgDataService;

/// A single row keyed by wire column names
pub type Row = Map<String, Value>;

/// Named collections of the backend store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Profiles,
    Organizations,
    Contacts,
    Deals,
    Tasks,
    Activities,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Profiles => "profiles",
            Collection::Organizations => "organizations",
            Collection::Contacts => "contacts",
            Collection::Deals => "deals",
            Collection::Tasks => "tasks",
            Collection::Activities => "activities",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Ordering applied to a select
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Row filter: equality predicates joined with AND, optional order and limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter on `column`
    pub fn eq<V: Serialize>(mut self, column: &str, value: V) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.filters.push((column.to_string(), value));
        self
    }

    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            descending: true,
        });
        self
    }

    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            descending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `row` satisfies every filter
    pub fn matches(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
    }
}

/// Failure reported by the data service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("duplicate key in {collection} violates {constraint}")]
    UniqueViolation {
        collection: Collection,
        constraint: String,
    },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl BackendError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, BackendError::UniqueViolation { .. })
    }
}

/// Row-level access to the backend store
#[async_trait]
pub trait DataService: Send + Sync {
    /// Rows of `collection` matching `query`
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>, BackendError>;

    /// Insert one row and return it as stored, server defaults included
    async fn insert(&self, collection: Collection, row: Row) -> Result<Row, BackendError>;

    /// Apply `changes` to every row matching `query`, returning the updated rows
    async fn update(
        &self,
        collection: Collection,
        query: &Query,
        changes: Row,
    ) -> Result<Vec<Row>, BackendError>;

    /// Delete rows matching `query`, returning how many were removed
    async fn delete(&self, collection: Collection, query: &Query) -> Result<u64, BackendError>;

    async fn select_one(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Option<Row>, BackendError> {
        let query = query.clone().limit(1);
        Ok(self.select(collection, &query).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_query_matches_all_filters() {
        let org = Uuid::new_v4();
        let query = Query::new().eq("organization_id", org).eq("status", "active");

        let mut row = Row::new();
        row.insert("organization_id".into(), json!(org.to_string()));
        row.insert("status".into(), json!("active"));
        assert!(query.matches(&row));

        row.insert("status".into(), json!("inactive"));
        assert!(!query.matches(&row));
    }

    #[test]
    fn test_missing_column_only_matches_null() {
        let row = Row::new();
        assert!(Query::new().eq("deal_id", Value::Null).matches(&row));
        assert!(!Query::new().eq("deal_id", "x").matches(&row));
    }
}
