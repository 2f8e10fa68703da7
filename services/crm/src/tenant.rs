//! Organization scoping of every read and write

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{CrmError, CrmResult},
    models::{AuthSession, EntityKind},
    repositories::ProfileRepository,
};

/// Source of the active, unexpired session
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn active_session(&self) -> CrmResult<AuthSession>;
}

/// Organization and actor every operation is confined to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    pub organization_id: Uuid,
    pub actor_id: Uuid,
}

impl TenantScope {
    /// Reject entities owned by another organization
    pub fn ensure_owned(&self, kind: EntityKind, id: Uuid, organization_id: Uuid) -> CrmResult<()> {
        if organization_id != self.organization_id {
            return Err(CrmError::Unauthorized { kind, id });
        }
        Ok(())
    }
}

/// Derives the tenant scope from the current session
#[derive(Clone)]
pub struct TenantResolver {
    sessions: Arc<dyn SessionSource>,
    profiles: ProfileRepository,
}

impl TenantResolver {
    pub fn new(sessions: Arc<dyn SessionSource>, profiles: ProfileRepository) -> Self {
        Self { sessions, profiles }
    }

    /// Scope of the actor behind the active session
    pub async fn current_scope(&self) -> CrmResult<TenantScope> {
        let session = self.sessions.active_session().await?;
        self.resolve(session.user.id).await
    }

    /// Resolve the organization of `actor_id` from its profile.
    ///
    /// An actor without a profile has no scope and is treated as
    /// unauthenticated.
    pub async fn resolve(&self, actor_id: Uuid) -> CrmResult<TenantScope> {
        let profile = self.profiles.find_profile(actor_id).await?.ok_or_else(|| {
            CrmError::Unauthenticated(format!("user {} has no organization profile", actor_id))
        })?;

        debug!(actor_id = %actor_id, organization_id = %profile.organization_id, "resolved tenant scope");
        Ok(TenantScope {
            organization_id: profile.organization_id,
            actor_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_owned() {
        let scope = TenantScope {
            organization_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
        };
        let id = Uuid::new_v4();
        assert!(scope.ensure_owned(EntityKind::Deal, id, scope.organization_id).is_ok());
        assert!(matches!(
            scope.ensure_owned(EntityKind::Deal, id, Uuid::new_v4()),
            Err(CrmError::Unauthorized { kind: EntityKind::Deal, .. })
        ));
    }
}
