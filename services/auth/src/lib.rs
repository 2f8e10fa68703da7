//! Password authentication for the CRM data layer
//!
//! [`PgAuthBackend`] implements [`crm::backend::AuthBackend`] on top of a
//! PostgreSQL `users` table, Argon2 password hashes and JWT credentials whose
//! revocations are kept in Redis.

pub mod backend;
pub mod jwt;
pub mod models;
pub mod rate_limiter;
pub mod repositories;
pub mod validation;

pub use backend::PgAuthBackend;
pub use jwt::{JwtConfig, JwtService};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
