//! Redis access for session persistence and token bookkeeping
//!
//! Thin wrapper over a multiplexed connection exposing the handful of
//! commands the services need: string get/set with TTL, delete, existence
//! checks and a health ping.

use anyhow::Result;
use redis::{AsyncCommands, Client};
use serde::Deserialize;
use tracing::{debug, info};

/// Configuration for Redis connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| Self::default().url);
        Ok(RedisConfig { url })
    }
}

/// Shared Redis handle; clones share the underlying client
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Open a client for the configured URL
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    /// Set a key-value pair with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection().await?;

        match ttl_seconds {
            // SETEX rejects a zero TTL
            Some(0) => {
                let _: u64 = conn.del(key).await?;
            }
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }

        debug!(key, "redis set");
        Ok(())
    }

    /// Get a value by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Whether a key is present
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let present: bool = conn.exists(key).await?;
        Ok(present)
    }

    /// Delete a key
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running redis"]
    async fn test_set_get_delete() -> Result<()> {
        let pool = RedisPool::new(&RedisConfig::default()).await?;

        pool.set("crm_test_key", "value", Some(5)).await?;
        assert_eq!(pool.get("crm_test_key").await?, Some("value".to_string()));
        assert!(pool.exists("crm_test_key").await?);

        pool.delete("crm_test_key").await?;
        assert_eq!(pool.get("crm_test_key").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_open_rejects_malformed_url() {
        let config = RedisConfig {
            url: "not a url".to_string(),
        };
        assert!(RedisPool::new(&config).await.is_err());
    }
}
