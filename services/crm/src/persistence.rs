//! Persisted session storage
//!
//! Lets a client recover its session on the next start. The Redis store keys
//! the serialized session under a single configurable key and lets Redis
//! expire it together with the refresh credential.

use anyhow::Result;
use async_trait::async_trait;
use common::cache::RedisPool;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::AuthSession;

/// Storage for the current session between process runs
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn load(&self) -> Result<Option<AuthSession>>;
    async fn save(&self, session: &AuthSession) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Session storage living only as long as the process
#[derive(Default)]
pub struct MemorySessionPersistence {
    slot: RwLock<Option<AuthSession>>,
}

impl MemorySessionPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an already persisted session
    pub fn with_session(session: AuthSession) -> Self {
        Self {
            slot: RwLock::new(Some(session)),
        }
    }
}

#[async_trait]
impl SessionPersistence for MemorySessionPersistence {
    async fn load(&self) -> Result<Option<AuthSession>> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, session: &AuthSession) -> Result<()> {
        *self.slot.write().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.write().await = None;
        Ok(())
    }
}

/// Session storage in Redis
#[derive(Clone)]
pub struct RedisSessionPersistence {
    redis_pool: RedisPool,
    key: String,
    ttl_secs: u64,
}

impl RedisSessionPersistence {
    /// Create a new Redis-backed session store
    pub fn new(redis_pool: RedisPool, key: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            redis_pool,
            key: key.into(),
            ttl_secs,
        }
    }
}

#[async_trait]
impl SessionPersistence for RedisSessionPersistence {
    async fn load(&self) -> Result<Option<AuthSession>> {
        let Some(raw) = self.redis_pool.get(&self.key).await? else {
            return Ok(None);
        };
        let session: AuthSession = serde_json::from_str(&raw)?;
        Ok(Some(session))
    }

    async fn save(&self, session: &AuthSession) -> Result<()> {
        info!("Persisting session for user: {}", session.user.id);

        let raw = serde_json::to_string(session)?;
        self.redis_pool
            .set(&self.key, &raw, Some(self.ttl_secs))
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        info!("Clearing persisted session");
        self.redis_pool.delete(&self.key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthUser, UserMetadata};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session() -> AuthSession {
        AuthSession {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Utc::now() + Duration::minutes(10),
            user: AuthUser {
                id: Uuid::new_v4(),
                email: "a@x.com".to_string(),
                email_confirmed: true,
                metadata: UserMetadata::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_memory_round_trip() -> Result<()> {
        let store = MemorySessionPersistence::new();
        assert!(store.load().await?.is_none());

        let s = session();
        store.save(&s).await?;
        assert_eq!(store.load().await?, Some(s));

        store.clear().await?;
        assert!(store.load().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires a running redis"]
    async fn test_redis_round_trip() -> Result<()> {
        let pool = RedisPool::new(&common::cache::RedisConfig::default()).await?;
        let store = RedisSessionPersistence::new(pool, "crm:test:session", 30);

        let s = session();
        store.save(&s).await?;
        assert_eq!(store.load().await?, Some(s));
        store.clear().await?;
        assert!(store.load().await?.is_none());
        Ok(())
    }
}
