//! Row mappings of activities, profiles and organizations

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{FieldMap, RowReader, RowShape, RowWriter, SchemaError};
use crate::{
    backend::{Collection, Row},
    models::{
        ActivityRecord, NewActivity, Organization, Profile, ProfileUpdate, SubscriptionPlan,
        UserRole,
    },
};

static ACTIVITY_FIELDS: FieldMap = FieldMap::new(
    "activity",
    &[
        "id",
        "organization_id",
        "user_id",
        "contact_id",
        "deal_id",
        "task_id",
        "activity_type",
        "title",
        "description",
        "metadata",
        "created_at",
    ],
    &[("activity_type", "type")],
);

static PROFILE_FIELDS: FieldMap = FieldMap::new(
    "profile",
    &[
        "id",
        "email",
        "first_name",
        "last_name",
        "role",
        "organization_id",
        "job_title",
        "phone",
        "avatar_url",
        "onboarding_completed",
        "created_at",
        "updated_at",
    ],
    &[],
);

static ORGANIZATION_FIELDS: FieldMap = FieldMap::new(
    "organization",
    &["id", "name", "subscription_plan", "created_at"],
    &[],
);

impl RowShape for ActivityRecord {
    const COLLECTION: Collection = Collection::Activities;

    fn fields() -> &'static FieldMap {
        &ACTIVITY_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self, SchemaError> {
        let r = RowReader::new(&ACTIVITY_FIELDS, row);
        Ok(ActivityRecord {
            id: r.required("id")?,
            organization_id: r.required("organization_id")?,
            user_id: r.required("user_id")?,
            contact_id: r.optional("contact_id")?,
            deal_id: r.optional("deal_id")?,
            task_id: r.optional("task_id")?,
            activity_type: r.required("activity_type")?,
            title: r.required("title")?,
            description: r.or_default("description")?,
            metadata: r.or_default("metadata")?,
            created_at: r.required("created_at")?,
        })
    }
}

pub fn new_activity_row(activity: &NewActivity) -> Result<Row, SchemaError> {
    RowWriter::new(&ACTIVITY_FIELDS)
        .set("organization_id", activity.organization_id)
        .set("user_id", activity.user_id)
        .set_opt("contact_id", activity.contact_id)
        .set_opt("deal_id", activity.deal_id)
        .set_opt("task_id", activity.task_id)
        .set("activity_type", activity.activity_type)
        .set("title", &activity.title)
        .set("description", &activity.description)
        .set("metadata", &activity.metadata)
        .finish()
}

impl RowShape for Profile {
    const COLLECTION: Collection = Collection::Profiles;

    fn fields() -> &'static FieldMap {
        &PROFILE_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self, SchemaError> {
        let r = RowReader::new(&PROFILE_FIELDS, row);
        Ok(Profile {
            id: r.required("id")?,
            email: r.required("email")?,
            first_name: r.optional("first_name")?,
            last_name: r.optional("last_name")?,
            role: r.or_default("role")?,
            organization_id: r.required("organization_id")?,
            job_title: r.optional("job_title")?,
            phone: r.optional("phone")?,
            avatar_url: r.optional("avatar_url")?,
            onboarding_completed: r.or_default("onboarding_completed")?,
            created_at: r.required("created_at")?,
            updated_at: r.required("updated_at")?,
        })
    }
}

/// Fields of a profile created by bootstrap
#[derive(Debug, Clone)]
pub struct NewProfile<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub organization_id: Uuid,
    pub role: UserRole,
}

pub fn new_profile_row(profile: &NewProfile<'_>) -> Result<Row, SchemaError> {
    RowWriter::new(&PROFILE_FIELDS)
        .set("id", profile.id)
        .set("email", profile.email)
        .set_opt("first_name", profile.first_name)
        .set_opt("last_name", profile.last_name)
        .set_opt("avatar_url", profile.avatar_url)
        .set("organization_id", profile.organization_id)
        .set("role", profile.role)
        .finish()
}

pub fn profile_update_row(
    update: &ProfileUpdate,
    onboarding_completed: Option<bool>,
    now: DateTime<Utc>,
) -> Result<Row, SchemaError> {
    RowWriter::new(&PROFILE_FIELDS)
        .set_opt("first_name", update.first_name.as_ref())
        .set_opt("last_name", update.last_name.as_ref())
        .set_opt("phone", update.phone.as_ref())
        .set_opt("job_title", update.job_title.as_ref())
        .set_opt("onboarding_completed", onboarding_completed)
        .set("updated_at", now)
        .finish()
}

impl RowShape for Organization {
    const COLLECTION: Collection = Collection::Organizations;

    fn fields() -> &'static FieldMap {
        &ORGANIZATION_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self, SchemaError> {
        let r = RowReader::new(&ORGANIZATION_FIELDS, row);
        Ok(Organization {
            id: r.required("id")?,
            name: r.required("name")?,
            subscription_plan: r.or_default("subscription_plan")?,
            created_at: r.required("created_at")?,
        })
    }
}

pub fn new_organization_row(
    id: Uuid,
    name: &str,
    plan: SubscriptionPlan,
) -> Result<Row, SchemaError> {
    RowWriter::new(&ORGANIZATION_FIELDS)
        .set("id", id)
        .set("name", name)
        .set("subscription_plan", plan)
        .finish()
}
