//! User model and related functionality

use chrono::{DateTime, Utc};
use crm::models::{AuthUser, UserMetadata};
use uuid::Uuid;

/// User entity
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub metadata: UserMetadata,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    /// Public view handed to the data layer
    pub fn to_auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: self.email.clone(),
            email_confirmed: self.email_confirmed(),
            metadata: self.metadata.clone(),
        }
    }
}

/// New user creation payload; the password is hashed by the repository
#[derive(Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub metadata: UserMetadata,
    pub email_confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_user_reflects_confirmation() {
        let mut user = User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            metadata: UserMetadata {
                first_name: Some("Ada".to_string()),
                ..Default::default()
            },
            email_confirmed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!user.to_auth_user().email_confirmed);

        user.email_confirmed_at = Some(Utc::now());
        let auth_user = user.to_auth_user();
        assert!(auth_user.email_confirmed);
        assert_eq!(auth_user.metadata.first_name.as_deref(), Some("Ada"));
    }
}
