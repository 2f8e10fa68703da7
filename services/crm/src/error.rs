//! Error taxonomy of the data layer

use thiserror::Error;
use uuid::Uuid;

use crate::{
    backend::{AuthError, BackendError},
    models::EntityKind,
    schema::SchemaError,
    session::SessionState,
};

/// Failure of a CRM operation as seen by the caller
#[derive(Error, Debug)]
pub enum CrmError {
    /// No session, an expired session, or no organization scope for the actor
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// The entity belongs to another organization
    #[error("{kind} {id} belongs to another organization")]
    Unauthorized { kind: EntityKind, id: Uuid },

    /// The id does not resolve to a row
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    /// The payload does not satisfy the entity's schema
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The backend data service reported a failure
    #[error("Upstream failure: {0}")]
    Upstream(#[from] BackendError),

    /// The authentication backend rejected the request
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The session manager cannot accept the call in its current state
    #[error("Session manager is {0}")]
    InvalidState(SessionState),
}

impl From<SchemaError> for CrmError {
    fn from(err: SchemaError) -> Self {
        CrmError::ValidationFailed(err.to_string())
    }
}

impl CrmError {
    /// Whether the failure means the caller has to sign in again
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            CrmError::Unauthenticated(_)
                | CrmError::Auth(AuthError::InvalidToken)
                | CrmError::Auth(AuthError::TokenExpired)
        )
    }
}

/// Type alias for Result with CrmError
pub type CrmResult<T> = Result<T, CrmError>;
