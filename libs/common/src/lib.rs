//! Shared infrastructure for the CRM services
//!
//! Database pooling, Redis access, layered settings loading and the
//! database error type used by both the data layer and the auth backend.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, init_pool, health_check};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
