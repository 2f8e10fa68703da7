//! Profile and organization repository

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    backend::{Collection, DataService, Query},
    error::{CrmError, CrmResult},
    models::{Organization, Profile, ProfileUpdate, SubscriptionPlan},
    schema::{self, NewProfile, RowShape, columns},
};

/// Profile repository
#[derive(Clone)]
pub struct ProfileRepository {
    data: Arc<dyn DataService>,
}

impl ProfileRepository {
    /// Create a new profile repository
    pub fn new(data: Arc<dyn DataService>) -> Self {
        Self { data }
    }

    /// Find the profile of an actor
    pub async fn find_profile(&self, actor_id: Uuid) -> CrmResult<Option<Profile>> {
        let query = Query::new().eq(columns::ID, actor_id);
        let row = self.data.select_one(Collection::Profiles, &query).await?;
        Ok(row.as_ref().map(Profile::from_row).transpose()?)
    }

    /// Find an organization by id
    pub async fn find_organization(&self, organization_id: Uuid) -> CrmResult<Option<Organization>> {
        let query = Query::new().eq(columns::ID, organization_id);
        let row = self
            .data
            .select_one(Collection::Organizations, &query)
            .await?;
        Ok(row.as_ref().map(Organization::from_row).transpose()?)
    }

    /// Insert an organization; a duplicate id surfaces as a unique violation
    pub async fn insert_organization(&self, id: Uuid, name: &str) -> CrmResult<Organization> {
        info!("Creating organization: {}", name);

        let row = schema::new_organization_row(id, name, SubscriptionPlan::Free)?;
        let stored = self.data.insert(Collection::Organizations, row).await?;
        Ok(Organization::from_row(&stored)?)
    }

    /// Insert a profile; a duplicate id surfaces as a unique violation
    pub async fn insert_profile(&self, profile: &NewProfile<'_>) -> CrmResult<Profile> {
        info!("Creating profile for user: {}", profile.id);

        let row = schema::new_profile_row(profile)?;
        let stored = self.data.insert(Collection::Profiles, row).await?;
        Ok(Profile::from_row(&stored)?)
    }

    /// Apply profile edits and optionally flip the onboarding flag
    pub async fn update_profile(
        &self,
        actor_id: Uuid,
        update: &ProfileUpdate,
        onboarding_completed: Option<bool>,
    ) -> CrmResult<Profile> {
        info!("Updating profile for user: {}", actor_id);

        let changes = schema::profile_update_row(update, onboarding_completed, Utc::now())?;
        let query = Query::new().eq(columns::ID, actor_id);
        let rows = self
            .data
            .update(Collection::Profiles, &query, changes)
            .await?;
        let row = rows.first().ok_or_else(|| {
            CrmError::Unauthenticated(format!("no profile exists for user {}", actor_id))
        })?;
        Ok(Profile::from_row(row)?)
    }
}
