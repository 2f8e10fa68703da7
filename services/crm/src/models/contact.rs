//! Contact model and related payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CustomFields, LeadSource, patch::nullable};
use crate::validation;

/// Relationship status of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    Active,
    Inactive,
    Qualified,
    Unqualified,
    Converted,
}

/// Marketing lifecycle stage of a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Subscriber,
    #[default]
    Lead,
    MarketingQualifiedLead,
    SalesQualifiedLead,
    Opportunity,
    Customer,
    Evangelist,
}

/// Postal address stored as a single structured column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Contact entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,
    pub address: Option<Address>,
    pub tags: Vec<String>,
    pub lead_score: i32,
    pub status: ContactStatus,
    pub lead_source: Option<LeadSource>,
    pub lifecycle_stage: LifecycleStage,
    pub notes: Option<String>,
    pub custom_fields: CustomFields,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub next_follow_up_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// New contact creation payload
///
/// Unset optional fields fall back to the store's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewContact {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,
    pub address: Option<Address>,
    pub tags: Vec<String>,
    pub lead_score: Option<i32>,
    pub status: Option<ContactStatus>,
    pub lead_source: Option<LeadSource>,
    pub lifecycle_stage: Option<LifecycleStage>,
    pub notes: Option<String>,
    pub custom_fields: CustomFields,
    pub next_follow_up_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
}

impl NewContact {
    pub fn validate(&self) -> Result<(), String> {
        validation::validate_required("first_name", &self.first_name)?;
        validation::validate_required("last_name", &self.last_name)?;
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            validation::validate_email(email)?;
        }
        if let Some(score) = self.lead_score {
            validation::validate_percentage("lead_score", score)?;
        }
        validation::validate_custom_fields(&self.custom_fields)
    }
}

/// Contact update payload; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub mobile: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub company: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub job_title: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub department: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub website: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub linkedin_url: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub twitter_url: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub facebook_url: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub address: Option<Option<Address>>,
    pub tags: Option<Vec<String>>,
    pub lead_score: Option<i32>,
    pub status: Option<ContactStatus>,
    #[serde(deserialize_with = "nullable")]
    pub lead_source: Option<Option<LeadSource>>,
    pub lifecycle_stage: Option<LifecycleStage>,
    #[serde(deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    pub custom_fields: Option<CustomFields>,
    #[serde(deserialize_with = "nullable")]
    pub last_contacted_at: Option<Option<DateTime<Utc>>>,
    #[serde(deserialize_with = "nullable")]
    pub next_follow_up_at: Option<Option<DateTime<Utc>>>,
    #[serde(deserialize_with = "nullable")]
    pub assigned_to: Option<Option<Uuid>>,
}

impl ContactPatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Some(email)) = &self.email {
            if !email.is_empty() {
                validation::validate_email(email)?;
            }
        }
        if let Some(score) = self.lead_score {
            validation::validate_percentage("lead_score", score)?;
        }
        if let Some(fields) = &self.custom_fields {
            validation::validate_custom_fields(fields)?;
        }
        Ok(())
    }
}
