//! PostgreSQL implementation of the data service
//!
//! Rows travel as JSON objects: reads go through `to_jsonb` and writes through
//! `jsonb_populate_record`, so column typing stays in PostgreSQL and the
//! statements only ever splice validated identifiers.

use async_trait::async_trait;
use common::error::{DatabaseError, DatabaseResult};
use regex::Regex;
use serde_json::Value;
use sqlx::{PgPool, types::Json};
use std::sync::OnceLock;
use tracing::{debug, error, info};

use super::{BackendError, Collection, DataService, Query, Row};

/// Data service backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgDataService {
    pool: PgPool,
}

impl PgDataService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Apply the schema migrations shipped with the workspace
pub async fn migrate(pool: &PgPool) -> DatabaseResult<()> {
    info!("Running database migrations");
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    Ok(())
}

fn ident(name: &str) -> Result<String, BackendError> {
    static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = IDENT_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z_][a-z0-9_]*$").expect("Failed to compile identifier regex")
    });

    if !regex.is_match(name) {
        return Err(BackendError::Rejected(format!("invalid identifier `{}`", name)));
    }
    Ok(format!("\"{}\"", name))
}

fn filter_object(query: &Query) -> Row {
    query.filters.iter().cloned().collect()
}

/// WHERE clause comparing `t` against the populated filter record `f`
fn where_clause(query: &Query) -> Result<String, BackendError> {
    if query.filters.is_empty() {
        return Ok(String::new());
    }
    let predicates = query
        .filters
        .iter()
        .map(|(column, _)| {
            let column = ident(column)?;
            Ok(format!("t.{column} IS NOT DISTINCT FROM f.{column}"))
        })
        .collect::<Result<Vec<_>, BackendError>>()?;
    Ok(format!(" WHERE {}", predicates.join(" AND ")))
}

pub(crate) fn select_sql(collection: Collection, query: &Query) -> Result<String, BackendError> {
    let table = ident(collection.table())?;
    let mut sql = format!(
        "SELECT to_jsonb(t) FROM {table} AS t, jsonb_populate_record(NULL::{table}, $1) AS f{}",
        where_clause(query)?
    );
    if let Some(order) = &query.order {
        let direction = if order.descending { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY t.{} {direction}", ident(&order.column)?));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    Ok(sql)
}

pub(crate) fn insert_sql(collection: Collection, row: &Row) -> Result<String, BackendError> {
    let table = ident(collection.table())?;
    if row.is_empty() {
        return Ok(format!(
            "INSERT INTO {table} AS t DEFAULT VALUES RETURNING to_jsonb(t)"
        ));
    }
    let columns = row
        .keys()
        .map(|c| ident(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    Ok(format!(
        "INSERT INTO {table} AS t ({columns}) \
         SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) \
         RETURNING to_jsonb(t)"
    ))
}

pub(crate) fn update_sql(
    collection: Collection,
    query: &Query,
    changes: &Row,
) -> Result<String, BackendError> {
    let table = ident(collection.table())?;
    let assignments = changes
        .keys()
        .map(|c| ident(c).map(|c| format!("{c} = s.{c}")))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    Ok(format!(
        "UPDATE {table} AS t SET {assignments} \
         FROM jsonb_populate_record(NULL::{table}, $1) AS f, \
         jsonb_populate_record(NULL::{table}, $2) AS s{} \
         RETURNING to_jsonb(t)",
        where_clause(query)?
    ))
}

pub(crate) fn delete_sql(collection: Collection, query: &Query) -> Result<String, BackendError> {
    let table = ident(collection.table())?;
    Ok(format!(
        "DELETE FROM {table} AS t USING jsonb_populate_record(NULL::{table}, $1) AS f{}",
        where_clause(query)?
    ))
}

fn backend_error(collection: Collection, err: sqlx::Error) -> BackendError {
    match err {
        sqlx::Error::PoolTimedOut => BackendError::Timeout,
        sqlx::Error::Io(e) => BackendError::Network(e.to_string()),
        sqlx::Error::PoolClosed => BackendError::Network("connection pool closed".to_string()),
        sqlx::Error::Database(db) => {
            let constraint = db.constraint().unwrap_or("unknown").to_string();
            let message = db.message().to_string();
            let err = DatabaseError::Query(sqlx::Error::Database(db));
            match err.sqlstate().as_deref() {
                Some("23505") => BackendError::UniqueViolation {
                    collection,
                    constraint,
                },
                Some(code) if code.starts_with("23") => BackendError::Constraint(message),
                _ => {
                    error!(collection = %collection, "Database error: {}", err);
                    BackendError::Query(message)
                }
            }
        }
        other => BackendError::Query(other.to_string()),
    }
}

#[async_trait]
impl DataService for PgDataService {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>, BackendError> {
        let sql = select_sql(collection, query)?;
        debug!(collection = %collection, "select");

        let rows: Vec<Json<Row>> = sqlx::query_scalar(&sql)
            .bind(Json(filter_object(query)))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend_error(collection, e))?;

        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }

    async fn insert(&self, collection: Collection, row: Row) -> Result<Row, BackendError> {
        let sql = insert_sql(collection, &row)?;
        debug!(collection = %collection, "insert");

        let Json(stored): Json<Row> = sqlx::query_scalar(&sql)
            .bind(Json(row))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| backend_error(collection, e))?;

        Ok(stored)
    }

    async fn update(
        &self,
        collection: Collection,
        query: &Query,
        changes: Row,
    ) -> Result<Vec<Row>, BackendError> {
        if changes.is_empty() {
            return self.select(collection, query).await;
        }
        let sql = update_sql(collection, query, &changes)?;
        debug!(collection = %collection, "update");

        let rows: Vec<Json<Row>> = sqlx::query_scalar(&sql)
            .bind(Json(filter_object(query)))
            .bind(Json(Value::Object(changes)))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend_error(collection, e))?;

        Ok(rows.into_iter().map(|Json(row)| row).collect())
    }

    async fn delete(&self, collection: Collection, query: &Query) -> Result<u64, BackendError> {
        let sql = delete_sql(collection, query)?;
        debug!(collection = %collection, "delete");

        let result = sqlx::query(&sql)
            .bind(Json(filter_object(query)))
            .execute(&self.pool)
            .await
            .map_err(|e| backend_error(collection, e))?;

        Ok(result.rows_affected())
    }
}
