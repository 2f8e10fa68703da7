//! Deal model and related payloads

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{CustomFields, LeadSource, patch::nullable};
use crate::validation;

/// Pipeline stage of a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    #[default]
    Prospecting,
    Qualification,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl DealStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStage::Prospecting => "prospecting",
            DealStage::Qualification => "qualification",
            DealStage::Proposal => "proposal",
            DealStage::Negotiation => "negotiation",
            DealStage::ClosedWon => "closed_won",
            DealStage::ClosedLost => "closed_lost",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, DealStage::ClosedWon | DealStage::ClosedLost)
    }
}

impl fmt::Display for DealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deal entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub value: f64,
    pub currency: String,
    pub stage: DealStage,
    pub probability: i32,
    pub expected_close_date: Option<NaiveDate>,
    pub actual_close_date: Option<NaiveDate>,
    pub lead_source: Option<LeadSource>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub custom_fields: CustomFields,
    pub contact_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New deal creation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewDeal {
    pub title: String,
    pub description: Option<String>,
    pub value: Option<f64>,
    pub currency: Option<String>,
    pub stage: Option<DealStage>,
    pub probability: Option<i32>,
    pub expected_close_date: Option<NaiveDate>,
    pub actual_close_date: Option<NaiveDate>,
    pub lead_source: Option<LeadSource>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub custom_fields: CustomFields,
    pub contact_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
}

impl NewDeal {
    pub fn validate(&self) -> Result<(), String> {
        validation::validate_required("title", &self.title)?;
        if let Some(value) = self.value {
            validation::validate_amount("value", value)?;
        }
        if let Some(currency) = &self.currency {
            validation::validate_currency(currency)?;
        }
        if let Some(probability) = self.probability {
            validation::validate_percentage("probability", probability)?;
        }
        validation::validate_custom_fields(&self.custom_fields)
    }
}

/// Deal update payload; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DealPatch {
    pub title: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub value: Option<f64>,
    pub currency: Option<String>,
    pub stage: Option<DealStage>,
    pub probability: Option<i32>,
    #[serde(deserialize_with = "nullable")]
    pub expected_close_date: Option<Option<NaiveDate>>,
    #[serde(deserialize_with = "nullable")]
    pub actual_close_date: Option<Option<NaiveDate>>,
    #[serde(deserialize_with = "nullable")]
    pub lead_source: Option<Option<LeadSource>>,
    pub tags: Option<Vec<String>>,
    #[serde(deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    pub custom_fields: Option<CustomFields>,
    #[serde(deserialize_with = "nullable")]
    pub contact_id: Option<Option<Uuid>>,
    #[serde(deserialize_with = "nullable")]
    pub assigned_to: Option<Option<Uuid>>,
}

impl DealPatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(value) = self.value {
            validation::validate_amount("value", value)?;
        }
        if let Some(currency) = &self.currency {
            validation::validate_currency(currency)?;
        }
        if let Some(probability) = self.probability {
            validation::validate_percentage("probability", probability)?;
        }
        if let Some(fields) = &self.custom_fields {
            validation::validate_custom_fields(fields)?;
        }
        Ok(())
    }
}
