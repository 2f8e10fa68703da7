//! Authentication backend contract

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{AuthSession, AuthUser, Registration};

/// Session change pushed by the auth backend
///
/// Delivered asynchronously, e.g. when credentials are refreshed in the
/// background or the user signs out from another context sharing the backend.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    TokenRefreshed(AuthSession),
    UserUpdated(AuthSession),
    SignedOut { user_id: Uuid },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Too many attempts, try again later")]
    RateLimited,

    #[error("{0}")]
    Validation(String),

    #[error("Auth backend error: {0}")]
    Backend(String),
}

impl AuthError {
    /// Whether the backend refused the credentials themselves, as opposed to
    /// failing to answer
    pub fn rejects_credentials(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::TokenExpired
        )
    }
}

/// Credential issuance and verification
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Register a new user.
    ///
    /// Returns `None` when the backend requires email confirmation before
    /// issuing a session.
    async fn sign_up(&self, registration: &Registration) -> Result<Option<AuthSession>, AuthError>;

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError>;

    /// Exchange a refresh credential for a new session
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError>;

    /// Resolve the user an access credential belongs to
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_credential_errors_reject_the_session() {
        assert!(AuthError::InvalidToken.rejects_credentials());
        assert!(AuthError::TokenExpired.rejects_credentials());
        assert!(!AuthError::Backend("timeout".to_string()).rejects_credentials());
        assert!(!AuthError::RateLimited.rejects_credentials());
    }
}
