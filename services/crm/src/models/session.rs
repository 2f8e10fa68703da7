//! Authentication session and actor identity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Organization, Profile};

/// Identity metadata the auth backend attaches to a user at sign-up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserMetadata {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub organization_name: Option<String>,
}

/// User as known to the auth backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub email_confirmed: bool,
    #[serde(default)]
    pub metadata: UserMetadata,
}

/// Credentials issued by the auth backend
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Whether the access credential expires within `margin` from now
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at <= Utc::now() + margin
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.id)
            .finish()
    }
}

/// Sign-up request
#[derive(Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub organization_name: Option<String>,
}

impl Registration {
    pub fn metadata(&self) -> UserMetadata {
        UserMetadata {
            first_name: Some(self.first_name.clone()),
            last_name: Some(self.last_name.clone()),
            avatar_url: None,
            organization_name: self.organization_name.clone(),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("organization_name", &self.organization_name)
            .finish_non_exhaustive()
    }
}

/// Current-actor view exposed to the presentation layer
///
/// `profile` and `organization` stay empty until bootstrap has produced a
/// profile row for the actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub metadata: UserMetadata,
    pub profile: Option<Profile>,
    pub organization: Option<Organization>,
}

impl Actor {
    pub fn from_user(user: &AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            email_verified: user.email_confirmed,
            metadata: user.metadata.clone(),
            profile: None,
            organization: None,
        }
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        self.profile.as_ref().map(|p| p.organization_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_in: Duration) -> AuthSession {
        AuthSession {
            access_token: "secret-access".to_string(),
            refresh_token: "secret-refresh".to_string(),
            expires_at: Utc::now() + expires_in,
            user: AuthUser {
                id: Uuid::new_v4(),
                email: "a@x.com".to_string(),
                email_confirmed: true,
                metadata: UserMetadata::default(),
            },
        }
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", session(Duration::minutes(5)));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    #[test]
    fn test_expiry_margin() {
        let s = session(Duration::seconds(30));
        assert!(!s.is_expired());
        assert!(s.expires_within(Duration::seconds(60)));
        assert!(!s.expires_within(Duration::seconds(10)));
    }
}
