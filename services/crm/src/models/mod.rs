//! Domain models of the CRM data layer

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod activity;
pub mod contact;
pub mod custom_fields;
pub mod deal;
pub mod patch;
pub mod profile;
pub mod session;
pub mod task;

// Re-export for convenience
pub use activity::{ActivityKind, ActivityRecord, ActivityType, NewActivity};
pub use contact::{Address, Contact, ContactPatch, ContactStatus, LifecycleStage, NewContact};
pub use custom_fields::{CustomFieldError, CustomFields};
pub use deal::{Deal, DealPatch, DealStage, NewDeal};
pub use profile::{Organization, Profile, ProfileUpdate, SubscriptionPlan, UserRole};
pub use session::{Actor, AuthSession, AuthUser, Registration, UserMetadata};
pub use task::{NewTask, Task, TaskPatch, TaskPriority, TaskStatus, TaskType};

/// Kind of business entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    Deal,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Deal => "deal",
            EntityKind::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a contact or deal originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    SocialMedia,
    EmailCampaign,
    ColdCall,
    Event,
    Advertisement,
    Other,
}
