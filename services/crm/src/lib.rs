//! Multi-tenant CRM data layer
//!
//! Mediates between a client and a relational backend with an auth service:
//! maps domain entities to backend rows, confines every read and write to the
//! actor's organization, appends an activity record after each mutation and
//! keeps the client's session and cached state consistent.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crm::{
//!     CrmClient, SessionConfig,
//!     backend::{MemoryAuthBackend, MemoryDataService},
//!     models::NewContact,
//!     persistence::MemorySessionPersistence,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CrmClient::new(
//!         Arc::new(MemoryDataService::new()),
//!         Arc::new(MemoryAuthBackend::new()),
//!         Arc::new(MemorySessionPersistence::new()),
//!         SessionConfig::default(),
//!     );
//!     client.start().await;
//!     client.session().login("ada@example.com", "Secret123").await?;
//!
//!     let contact = client
//!         .contacts()
//!         .create(NewContact {
//!             first_name: "Charles".to_string(),
//!             last_name: "Babbage".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("Created contact {}", contact.id);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod repositories;
pub mod schema;
pub mod services;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod tenant;
pub mod validation;

pub use client::CrmClient;
pub use config::{CrmConfig, SessionConfig};
pub use error::{CrmError, CrmResult};
pub use session::{SessionManager, SessionState};
pub use store::{ClientStore, StoreSnapshot};
