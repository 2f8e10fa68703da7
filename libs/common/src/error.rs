//! Error types shared by the infrastructure helpers
//!
//! Services convert these into their own typed errors at their boundaries.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Failure while talking to PostgreSQL
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The pool could not be created or a connection could not be acquired
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// A statement failed
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Applying the schema migrations failed
    #[error("Database migration error: {0}")]
    Migration(String),

    /// The connection settings are unusable
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl DatabaseError {
    /// SQLSTATE reported by the server, when the failure came from a statement
    pub fn sqlstate(&self) -> Option<String> {
        match self {
            DatabaseError::Query(SqlxError::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
