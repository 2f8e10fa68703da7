//! Generic entity access: tenant-scoped CRUD with an audit trail
//!
//! Every operation resolves the tenant scope first, talks to the data
//! service through the schema translator, appends an activity after a
//! successful write and mirrors the outcome into the client store.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::{marker::PhantomData, sync::Arc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    audit::{AuditRecorder, Auditable, Mutation},
    backend::{DataService, Query, Row},
    error::{CrmError, CrmResult},
    models::ActivityRecord,
    schema::{EntityShape, RowShape, SchemaError, columns},
    store::{Cached, ClientStore},
    tenant::{TenantResolver, TenantScope},
};

/// Per-kind rules layered on top of the generic CRUD pattern
pub trait ManagedEntity: EntityShape + Auditable + Cached {
    fn validate_new(new: &Self::New) -> Result<(), String>;

    fn validate_patch(patch: &Self::Patch) -> Result<(), String>;

    /// Adjust the row about to be inserted
    fn prepare_insert(
        _new: &Self::New,
        _row: &mut Row,
        _now: DateTime<Utc>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    /// Adjust the changes about to be applied to `before`
    fn prepare_update(
        _before: &Self,
        _patch: &Self::Patch,
        _changes: &mut Row,
        _now: DateTime<Utc>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }
}

/// CRUD service for one entity kind
pub struct EntityService<E> {
    data: Arc<dyn DataService>,
    tenant: TenantResolver,
    audit: AuditRecorder,
    store: ClientStore,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            tenant: self.tenant.clone(),
            audit: self.audit.clone(),
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: ManagedEntity> EntityService<E> {
    pub fn new(
        data: Arc<dyn DataService>,
        tenant: TenantResolver,
        audit: AuditRecorder,
        store: ClientStore,
    ) -> Self {
        Self {
            data,
            tenant,
            audit,
            store,
            _entity: PhantomData,
        }
    }

    async fn fetch(&self, id: Uuid) -> CrmResult<Option<E>> {
        let query = Query::new().eq(columns::ID, id);
        let row = self.data.select_one(E::COLLECTION, &query).await?;
        Ok(row.as_ref().map(E::from_row).transpose()?)
    }

    async fn fetch_owned(&self, scope: &TenantScope, id: Uuid) -> CrmResult<E> {
        let entity = self
            .fetch(id)
            .await?
            .ok_or(CrmError::NotFound { kind: E::KIND, id })?;
        scope.ensure_owned(E::KIND, id, entity.organization_id())?;
        Ok(entity)
    }

    fn scoped_by_id(scope: &TenantScope, id: Uuid) -> Query {
        Query::new()
            .eq(columns::ID, id)
            .eq(columns::ORGANIZATION_ID, scope.organization_id)
    }

    /// All entities of the actor's organization, newest first
    pub async fn get_all(&self) -> CrmResult<Vec<E>> {
        self.store.track(async {
            let scope = self.tenant.current_scope().await?;
            let query = Query::new()
                .eq(columns::ORGANIZATION_ID, scope.organization_id)
                .order_desc(columns::CREATED_AT);
            let rows = self.data.select(E::COLLECTION, &query).await?;

            let mut entities = Vec::with_capacity(rows.len());
            for row in &rows {
                let entity = E::from_row(row)?;
                if entity.organization_id() != scope.organization_id {
                    warn!(entity = %E::KIND, id = %entity.id(), "Dropping row outside tenant scope");
                    continue;
                }
                entities.push(entity);
            }

            info!(
                entity = %E::KIND,
                organization_id = %scope.organization_id,
                count = entities.len(),
                "Fetched entities"
            );
            self.store.replace_all(entities.clone());
            Ok(entities)
        })
        .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> CrmResult<E> {
        self.store.track(async {
            let scope = self.tenant.current_scope().await?;
            let entity = self.fetch_owned(&scope, id).await?;
            self.store.upsert(entity.clone());
            Ok(entity)
        })
        .await
    }

    /// Persist a new entity stamped with the actor's organization.
    ///
    /// Returns the entity as stored, including server-assigned defaults.
    pub async fn create(&self, new: E::New) -> CrmResult<E> {
        self.store.track(async {
            E::validate_new(&new).map_err(CrmError::ValidationFailed)?;
            let scope = self.tenant.current_scope().await?;
            let now = Utc::now();

            let mut row = E::insert_row(&new)?;
            row.insert(
                columns::ORGANIZATION_ID.to_string(),
                json!(scope.organization_id),
            );
            row.insert(columns::CREATED_BY.to_string(), json!(scope.actor_id));
            E::prepare_insert(&new, &mut row, now)?;

            let stored = self.data.insert(E::COLLECTION, row).await?;
            let entity = E::from_row(&stored)?;
            info!(
                entity = %E::KIND,
                id = %entity.id(),
                organization_id = %scope.organization_id,
                "Created entity"
            );

            let after = entity.audit_subject();
            self.audit
                .record_best_effort(&scope, &Mutation::Created { after: &after })
                .await;

            self.store.upsert(entity.clone());
            Ok(entity)
        })
        .await
    }

    /// Apply a sparse patch.
    ///
    /// Reads the current state first so the audit record can describe what
    /// actually changed; the write is confined to the actor's organization.
    pub async fn update(&self, id: Uuid, patch: E::Patch) -> CrmResult<E> {
        self.store.track(async {
            E::validate_patch(&patch).map_err(CrmError::ValidationFailed)?;
            let scope = self.tenant.current_scope().await?;
            let before = self.fetch_owned(&scope, id).await?;
            let now = Utc::now();

            let patch_row = E::patch_row(&patch)?;
            let mut changes = patch_row.row;
            E::prepare_update(&before, &patch, &mut changes, now)?;
            changes.insert(columns::UPDATED_AT.to_string(), json!(now));

            let rows = self
                .data
                .update(E::COLLECTION, &Self::scoped_by_id(&scope, id), changes)
                .await?;
            let row = rows.first().ok_or(CrmError::NotFound { kind: E::KIND, id })?;
            let after = E::from_row(row)?;
            info!(
                entity = %E::KIND,
                id = %id,
                changed = patch_row.changed.len(),
                "Updated entity"
            );

            let (before_subject, after_subject) = (before.audit_subject(), after.audit_subject());
            self.audit
                .record_best_effort(
                    &scope,
                    &Mutation::Updated {
                        before: &before_subject,
                        after: &after_subject,
                        changed_fields: &patch_row.changed,
                    },
                )
                .await;

            self.store.upsert(after.clone());
            Ok(after)
        })
        .await
    }

    /// Delete an entity; deleting a missing id succeeds without an audit record
    pub async fn delete(&self, id: Uuid) -> CrmResult<()> {
        self.store.track(async {
            let scope = self.tenant.current_scope().await?;
            let Some(before) = self.fetch(id).await? else {
                info!(entity = %E::KIND, id = %id, "Entity already deleted");
                self.store.remove::<E>(id);
                return Ok(());
            };
            scope.ensure_owned(E::KIND, id, before.organization_id())?;

            let removed = self
                .data
                .delete(E::COLLECTION, &Self::scoped_by_id(&scope, id))
                .await?;
            self.store.remove::<E>(id);
            if removed == 0 {
                info!(entity = %E::KIND, id = %id, "Entity deleted concurrently");
                return Ok(());
            }
            info!(entity = %E::KIND, id = %id, "Deleted entity");

            let subject = before.audit_subject();
            self.audit
                .record_best_effort(&scope, &Mutation::Deleted { before: &subject })
                .await;
            Ok(())
        })
        .await
    }

    /// Activity trail of one entity, newest first
    pub async fn history(&self, id: Uuid) -> CrmResult<Vec<ActivityRecord>> {
        let scope = self.tenant.current_scope().await?;
        self.audit.history(&scope, E::KIND, id).await
    }
}
