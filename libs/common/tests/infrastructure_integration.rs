//! Integration tests for the infrastructure components
//!
//! These need the PostgreSQL and Redis instances the services run against
//! and are ignored by default.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};
use sqlx::Row;

#[tokio::test]
#[ignore = "requires running postgres and redis"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;
    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;
    assert!(redis_pool.health_check().await?, "Redis health check failed");

    let key = "crm:integration_test_key";
    redis_pool.set(key, "value", Some(10)).await?;
    assert_eq!(redis_pool.get(key).await?, Some("value".to_string()));

    redis_pool.delete(key).await?;
    assert!(!redis_pool.exists(key).await?);

    Ok(())
}
