//! Composition root of the data layer
//!
//! A [`CrmClient`] is one client context: one session, one client store and
//! the entity services bound to both.

use anyhow::{Context, Result};
use common::{
    cache::RedisPool,
    database::{self, DatabaseConfig},
};
use std::sync::Arc;
use tracing::info;

use crate::{
    audit::AuditRecorder,
    backend::{AuthBackend, DataService, PgDataService, postgres},
    config::{CrmConfig, SessionConfig},
    error::CrmResult,
    models::ActivityRecord,
    persistence::{RedisSessionPersistence, SessionPersistence},
    repositories::{ActivityRepository, ProfileRepository},
    services::{ContactService, DealService, TaskService},
    session::{SessionManager, SessionState},
    store::ClientStore,
    tenant::TenantResolver,
};

pub struct CrmClient {
    session: Arc<SessionManager>,
    store: ClientStore,
    tenant: TenantResolver,
    audit: AuditRecorder,
    contacts: ContactService,
    deals: DealService,
    tasks: TaskService,
}

impl CrmClient {
    pub fn new(
        data: Arc<dyn DataService>,
        auth: Arc<dyn AuthBackend>,
        persistence: Arc<dyn SessionPersistence>,
        config: SessionConfig,
    ) -> Self {
        let store = ClientStore::new();
        let session = Arc::new(SessionManager::new(
            auth,
            data.clone(),
            persistence,
            store.clone(),
            config,
        ));
        let tenant = TenantResolver::new(session.clone(), ProfileRepository::new(data.clone()));
        let audit = AuditRecorder::new(ActivityRepository::new(data.clone()));

        Self {
            contacts: ContactService::new(data.clone(), tenant.clone(), audit.clone(), store.clone()),
            deals: DealService::new(data.clone(), tenant.clone(), audit.clone(), store.clone()),
            tasks: TaskService::new(data, tenant.clone(), audit.clone(), store.clone()),
            session,
            store,
            tenant,
            audit,
        }
    }

    /// Client backed by PostgreSQL with the session persisted in Redis.
    ///
    /// Pending migrations are applied before the client is returned.
    pub async fn with_postgres(config: &CrmConfig, auth: Arc<dyn AuthBackend>) -> Result<Self> {
        let pool = connect(&config.database).await?;
        let redis_pool = RedisPool::new(&config.redis)
            .await
            .context("Failed to connect to Redis")?;
        let persistence = RedisSessionPersistence::new(
            redis_pool,
            config.session.persistence_key.clone(),
            config.session.persistence_ttl_secs,
        );

        info!("CRM client connected to PostgreSQL and Redis");
        Ok(Self::new(
            Arc::new(PgDataService::new(pool)),
            auth,
            Arc::new(persistence),
            config.session.clone(),
        ))
    }

    /// Recover the persisted session and start following auth events
    pub async fn start(&self) -> SessionState {
        let state = self.session.initialize().await;
        self.session.spawn_listener().await;
        state
    }

    pub async fn shutdown(&self) {
        self.session.terminate().await;
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn store(&self) -> &ClientStore {
        &self.store
    }

    pub fn contacts(&self) -> &ContactService {
        &self.contacts
    }

    pub fn deals(&self) -> &DealService {
        &self.deals
    }

    pub fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    /// Activity feed of the actor's organization, newest first
    pub async fn activity_feed(&self) -> CrmResult<Vec<ActivityRecord>> {
        let scope = self.tenant.current_scope().await?;
        self.audit.feed(&scope).await
    }
}

async fn connect(config: &DatabaseConfig) -> Result<sqlx::PgPool> {
    let pool = database::init_pool(config)
        .await
        .context("Failed to connect to PostgreSQL")?;
    postgres::migrate(&pool)
        .await
        .context("Failed to run migrations")?;
    Ok(pool)
}
