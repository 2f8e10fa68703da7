//! Activity repository

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    backend::{Collection, DataService, Query},
    error::CrmResult,
    models::{ActivityRecord, EntityKind, NewActivity},
    schema::{self, RowShape, columns},
};

/// Append-only access to activity records
#[derive(Clone)]
pub struct ActivityRepository {
    data: Arc<dyn DataService>,
}

impl ActivityRepository {
    pub fn new(data: Arc<dyn DataService>) -> Self {
        Self { data }
    }

    pub async fn insert(&self, activity: &NewActivity) -> CrmResult<ActivityRecord> {
        let row = schema::new_activity_row(activity)?;
        let stored = self.data.insert(Collection::Activities, row).await?;
        Ok(ActivityRecord::from_row(&stored)?)
    }

    /// Activities of an organization, newest first
    pub async fn list(&self, organization_id: Uuid) -> CrmResult<Vec<ActivityRecord>> {
        let query = Query::new()
            .eq(columns::ORGANIZATION_ID, organization_id)
            .order_desc(columns::CREATED_AT);
        self.fetch(&query).await
    }

    /// Activities referencing one entity, newest first
    pub async fn list_for_entity(
        &self,
        organization_id: Uuid,
        kind: EntityKind,
        id: Uuid,
    ) -> CrmResult<Vec<ActivityRecord>> {
        let reference = match kind {
            EntityKind::Contact => "contact_id",
            EntityKind::Deal => "deal_id",
            EntityKind::Task => "task_id",
        };
        let query = Query::new()
            .eq(columns::ORGANIZATION_ID, organization_id)
            .eq(reference, id)
            .order_desc(columns::CREATED_AT);
        self.fetch(&query).await
    }

    async fn fetch(&self, query: &Query) -> CrmResult<Vec<ActivityRecord>> {
        let rows = self.data.select(Collection::Activities, query).await?;
        rows.iter()
            .map(|row| ActivityRecord::from_row(row).map_err(Into::into))
            .collect()
    }
}
