//! Self-healing profile bootstrap
//!
//! An authenticated user without a profile gets a minimal one, owned by an
//! organization derived from the user id. Both inserts are compare-and-create:
//! a unique violation means a concurrent bootstrap won, and the existing row
//! is read back instead.

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    backend::BackendError,
    error::{CrmError, CrmResult},
    models::{AuthUser, Organization, Profile, UserRole},
    repositories::ProfileRepository,
    schema::NewProfile,
};

/// Namespace of organization ids derived from user ids
const ORGANIZATION_NAMESPACE: Uuid = Uuid::from_u128(0x6f3c_9a2e_41d7_4b8a_9c55_2e7d_0b14_a9f1);

/// Organization id owned by a bootstrapped user
pub fn organization_id_for(user_id: Uuid) -> Uuid {
    Uuid::new_v5(&ORGANIZATION_NAMESPACE, user_id.as_bytes())
}

/// Name of a bootstrapped organization
pub fn organization_name_for(user: &AuthUser) -> String {
    let explicit = user
        .metadata
        .organization_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if let Some(name) = explicit {
        return name.to_string();
    }

    let owner = user
        .metadata
        .first_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| user.email.split('@').next().unwrap_or(&user.email));
    format!("{}'s Organization", owner)
}

fn is_unique_violation(err: &CrmError) -> bool {
    matches!(err, CrmError::Upstream(e) if e.is_unique_violation())
}

#[derive(Clone)]
pub struct ProfileBootstrap {
    profiles: ProfileRepository,
}

impl ProfileBootstrap {
    pub fn new(profiles: ProfileRepository) -> Self {
        Self { profiles }
    }

    /// Profile and organization of `user`, creating them when absent
    pub async fn ensure(&self, user: &AuthUser) -> CrmResult<(Profile, Option<Organization>)> {
        if let Some(profile) = self.profiles.find_profile(user.id).await? {
            debug!(user_id = %user.id, "Profile already exists");
            let organization = self
                .profiles
                .find_organization(profile.organization_id)
                .await?;
            return Ok((profile, organization));
        }

        info!(user_id = %user.id, "Bootstrapping profile");
        let organization = self.ensure_organization(user).await?;
        let profile = self.ensure_profile(user, organization.id).await?;
        Ok((profile, Some(organization)))
    }

    async fn ensure_organization(&self, user: &AuthUser) -> CrmResult<Organization> {
        let id = organization_id_for(user.id);
        if let Some(existing) = self.profiles.find_organization(id).await? {
            return Ok(existing);
        }

        match self
            .profiles
            .insert_organization(id, &organization_name_for(user))
            .await
        {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => {
                debug!(organization_id = %id, "Organization created concurrently");
                self.profiles
                    .find_organization(id)
                    .await?
                    .ok_or_else(|| CrmError::Upstream(unique_without_row("organizations")))
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_profile(&self, user: &AuthUser, organization_id: Uuid) -> CrmResult<Profile> {
        let metadata = &user.metadata;
        let new = NewProfile {
            id: user.id,
            email: &user.email,
            first_name: metadata.first_name.as_deref(),
            last_name: metadata.last_name.as_deref(),
            avatar_url: metadata.avatar_url.as_deref(),
            organization_id,
            role: UserRole::Owner,
        };

        match self.profiles.insert_profile(&new).await {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => {
                debug!(user_id = %user.id, "Profile created concurrently");
                self.profiles
                    .find_profile(user.id)
                    .await?
                    .ok_or_else(|| CrmError::Upstream(unique_without_row("profiles")))
            }
            Err(e) => Err(e),
        }
    }
}

fn unique_without_row(collection: &str) -> BackendError {
    BackendError::Query(format!(
        "{} reported a duplicate key but the row is not readable",
        collection
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserMetadata;

    fn user(metadata: UserMetadata) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            email_confirmed: true,
            metadata,
        }
    }

    #[test]
    fn test_organization_id_is_stable_per_user() {
        let id = Uuid::new_v4();
        assert_eq!(organization_id_for(id), organization_id_for(id));
        assert_ne!(organization_id_for(id), organization_id_for(Uuid::new_v4()));
    }

    #[test]
    fn test_organization_name_fallbacks() {
        let named = user(UserMetadata {
            organization_name: Some("Analytical Engines".to_string()),
            ..Default::default()
        });
        assert_eq!(organization_name_for(&named), "Analytical Engines");

        let first = user(UserMetadata {
            first_name: Some("Ada".to_string()),
            organization_name: Some("  ".to_string()),
            ..Default::default()
        });
        assert_eq!(organization_name_for(&first), "Ada's Organization");

        let bare = user(UserMetadata::default());
        assert_eq!(organization_name_for(&bare), "ada's Organization");
    }
}
