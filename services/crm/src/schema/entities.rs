//! Row mappings of the business entities

use uuid::Uuid;

use super::{EntityShape, FieldMap, PatchRow, RowReader, RowShape, RowWriter, SchemaError};
use crate::{
    backend::{Collection, Row},
    models::{
        Contact, ContactPatch, Deal, DealPatch, EntityKind, NewContact, NewDeal, NewTask, Task,
        TaskPatch,
    },
};

static CONTACT_FIELDS: FieldMap = FieldMap::new(
    "contact",
    &[
        "id",
        "organization_id",
        "first_name",
        "last_name",
        "email",
        "phone",
        "mobile",
        "company",
        "job_title",
        "department",
        "website",
        "linkedin_url",
        "twitter_url",
        "facebook_url",
        "address",
        "tags",
        "lead_score",
        "status",
        "lead_source",
        "lifecycle_stage",
        "notes",
        "custom_fields",
        "last_contacted_at",
        "next_follow_up_at",
        "assigned_to",
        "created_by",
        "created_at",
        "updated_at",
    ],
    &[],
);

static DEAL_FIELDS: FieldMap = FieldMap::new(
    "deal",
    &[
        "id",
        "organization_id",
        "title",
        "description",
        "value",
        "currency",
        "stage",
        "probability",
        "expected_close_date",
        "actual_close_date",
        "lead_source",
        "tags",
        "notes",
        "custom_fields",
        "contact_id",
        "assigned_to",
        "created_by",
        "created_at",
        "updated_at",
    ],
    &[],
);

static TASK_FIELDS: FieldMap = FieldMap::new(
    "task",
    &[
        "id",
        "organization_id",
        "title",
        "description",
        "task_type",
        "priority",
        "status",
        "due_date",
        "completed_at",
        "reminder_at",
        "tags",
        "notes",
        "custom_fields",
        "contact_id",
        "deal_id",
        "assigned_to",
        "created_by",
        "created_at",
        "updated_at",
    ],
    &[("task_type", "type")],
);

impl RowShape for Contact {
    const COLLECTION: Collection = Collection::Contacts;

    fn fields() -> &'static FieldMap {
        &CONTACT_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self, SchemaError> {
        let r = RowReader::new(&CONTACT_FIELDS, row);
        Ok(Contact {
            id: r.required("id")?,
            organization_id: r.required("organization_id")?,
            first_name: r.required("first_name")?,
            last_name: r.or_default("last_name")?,
            email: r.optional("email")?,
            phone: r.optional("phone")?,
            mobile: r.optional("mobile")?,
            company: r.optional("company")?,
            job_title: r.optional("job_title")?,
            department: r.optional("department")?,
            website: r.optional("website")?,
            linkedin_url: r.optional("linkedin_url")?,
            twitter_url: r.optional("twitter_url")?,
            facebook_url: r.optional("facebook_url")?,
            address: r.optional("address")?,
            tags: r.or_default("tags")?,
            lead_score: r.or_default("lead_score")?,
            status: r.or_default("status")?,
            lead_source: r.optional("lead_source")?,
            lifecycle_stage: r.or_default("lifecycle_stage")?,
            notes: r.optional("notes")?,
            custom_fields: r.or_default("custom_fields")?,
            last_contacted_at: r.optional("last_contacted_at")?,
            next_follow_up_at: r.optional("next_follow_up_at")?,
            assigned_to: r.optional("assigned_to")?,
            created_by: r.optional("created_by")?,
            created_at: r.required("created_at")?,
            updated_at: r.required("updated_at")?,
        })
    }
}

impl EntityShape for Contact {
    type New = NewContact;
    type Patch = ContactPatch;

    const KIND: EntityKind = EntityKind::Contact;

    fn id(&self) -> Uuid {
        self.id
    }

    fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    fn display_name(&self) -> String {
        Contact::display_name(self)
    }

    fn insert_row(new: &NewContact) -> Result<Row, SchemaError> {
        RowWriter::new(&CONTACT_FIELDS)
            .set("first_name", &new.first_name)
            .set("last_name", &new.last_name)
            .set_opt("email", new.email.as_ref())
            .set_opt("phone", new.phone.as_ref())
            .set_opt("mobile", new.mobile.as_ref())
            .set_opt("company", new.company.as_ref())
            .set_opt("job_title", new.job_title.as_ref())
            .set_opt("department", new.department.as_ref())
            .set_opt("website", new.website.as_ref())
            .set_opt("linkedin_url", new.linkedin_url.as_ref())
            .set_opt("twitter_url", new.twitter_url.as_ref())
            .set_opt("facebook_url", new.facebook_url.as_ref())
            .set_opt("address", new.address.as_ref())
            .set("tags", &new.tags)
            .set_opt("lead_score", new.lead_score)
            .set_opt("status", new.status)
            .set_opt("lead_source", new.lead_source)
            .set_opt("lifecycle_stage", new.lifecycle_stage)
            .set_opt("notes", new.notes.as_ref())
            .set("custom_fields", &new.custom_fields)
            .set_opt("next_follow_up_at", new.next_follow_up_at)
            .set_opt("assigned_to", new.assigned_to)
            .finish()
    }

    fn patch_row(patch: &ContactPatch) -> Result<PatchRow, SchemaError> {
        RowWriter::new(&CONTACT_FIELDS)
            .set_opt("first_name", patch.first_name.as_ref())
            .set_opt("last_name", patch.last_name.as_ref())
            .set_opt("email", patch.email.as_ref())
            .set_opt("phone", patch.phone.as_ref())
            .set_opt("mobile", patch.mobile.as_ref())
            .set_opt("company", patch.company.as_ref())
            .set_opt("job_title", patch.job_title.as_ref())
            .set_opt("department", patch.department.as_ref())
            .set_opt("website", patch.website.as_ref())
            .set_opt("linkedin_url", patch.linkedin_url.as_ref())
            .set_opt("twitter_url", patch.twitter_url.as_ref())
            .set_opt("facebook_url", patch.facebook_url.as_ref())
            .set_opt("address", patch.address.as_ref())
            .set_opt("tags", patch.tags.as_ref())
            .set_opt("lead_score", patch.lead_score)
            .set_opt("status", patch.status)
            .set_opt("lead_source", patch.lead_source)
            .set_opt("lifecycle_stage", patch.lifecycle_stage)
            .set_opt("notes", patch.notes.as_ref())
            .set_opt("custom_fields", patch.custom_fields.as_ref())
            .set_opt("last_contacted_at", patch.last_contacted_at)
            .set_opt("next_follow_up_at", patch.next_follow_up_at)
            .set_opt("assigned_to", patch.assigned_to)
            .finish_patch()
    }
}

impl RowShape for Deal {
    const COLLECTION: Collection = Collection::Deals;

    fn fields() -> &'static FieldMap {
        &DEAL_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self, SchemaError> {
        let r = RowReader::new(&DEAL_FIELDS, row);
        Ok(Deal {
            id: r.required("id")?,
            organization_id: r.required("organization_id")?,
            title: r.required("title")?,
            description: r.optional("description")?,
            value: r.or_default("value")?,
            currency: r.required("currency")?,
            stage: r.or_default("stage")?,
            probability: r.or_default("probability")?,
            expected_close_date: r.optional("expected_close_date")?,
            actual_close_date: r.optional("actual_close_date")?,
            lead_source: r.optional("lead_source")?,
            tags: r.or_default("tags")?,
            notes: r.optional("notes")?,
            custom_fields: r.or_default("custom_fields")?,
            contact_id: r.optional("contact_id")?,
            assigned_to: r.optional("assigned_to")?,
            created_by: r.optional("created_by")?,
            created_at: r.required("created_at")?,
            updated_at: r.required("updated_at")?,
        })
    }
}

impl EntityShape for Deal {
    type New = NewDeal;
    type Patch = DealPatch;

    const KIND: EntityKind = EntityKind::Deal;

    fn id(&self) -> Uuid {
        self.id
    }

    fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    fn display_name(&self) -> String {
        self.title.clone()
    }

    fn insert_row(new: &NewDeal) -> Result<Row, SchemaError> {
        RowWriter::new(&DEAL_FIELDS)
            .set("title", &new.title)
            .set_opt("description", new.description.as_ref())
            .set_opt("value", new.value)
            .set_opt("currency", new.currency.as_ref())
            .set_opt("stage", new.stage)
            .set_opt("probability", new.probability)
            .set_opt("expected_close_date", new.expected_close_date)
            .set_opt("actual_close_date", new.actual_close_date)
            .set_opt("lead_source", new.lead_source)
            .set("tags", &new.tags)
            .set_opt("notes", new.notes.as_ref())
            .set("custom_fields", &new.custom_fields)
            .set_opt("contact_id", new.contact_id)
            .set_opt("assigned_to", new.assigned_to)
            .finish()
    }

    fn patch_row(patch: &DealPatch) -> Result<PatchRow, SchemaError> {
        RowWriter::new(&DEAL_FIELDS)
            .set_opt("title", patch.title.as_ref())
            .set_opt("description", patch.description.as_ref())
            .set_opt("value", patch.value)
            .set_opt("currency", patch.currency.as_ref())
            .set_opt("stage", patch.stage)
            .set_opt("probability", patch.probability)
            .set_opt("expected_close_date", patch.expected_close_date)
            .set_opt("actual_close_date", patch.actual_close_date)
            .set_opt("lead_source", patch.lead_source)
            .set_opt("tags", patch.tags.as_ref())
            .set_opt("notes", patch.notes.as_ref())
            .set_opt("custom_fields", patch.custom_fields.as_ref())
            .set_opt("contact_id", patch.contact_id)
            .set_opt("assigned_to", patch.assigned_to)
            .finish_patch()
    }
}

impl RowShape for Task {
    const COLLECTION: Collection = Collection::Tasks;

    fn fields() -> &'static FieldMap {
        &TASK_FIELDS
    }

    fn from_row(row: &Row) -> Result<Self, SchemaError> {
        let r = RowReader::new(&TASK_FIELDS, row);
        Ok(Task {
            id: r.required("id")?,
            organization_id: r.required("organization_id")?,
            title: r.required("title")?,
            description: r.optional("description")?,
            task_type: r.or_default("task_type")?,
            priority: r.or_default("priority")?,
            status: r.or_default("status")?,
            due_date: r.optional("due_date")?,
            completed_at: r.optional("completed_at")?,
            reminder_at: r.optional("reminder_at")?,
            tags: r.or_default("tags")?,
            notes: r.optional("notes")?,
            custom_fields: r.or_default("custom_fields")?,
            contact_id: r.optional("contact_id")?,
            deal_id: r.optional("deal_id")?,
            assigned_to: r.optional("assigned_to")?,
            created_by: r.optional("created_by")?,
            created_at: r.required("created_at")?,
            updated_at: r.required("updated_at")?,
        })
    }
}

impl EntityShape for Task {
    type New = NewTask;
    type Patch = TaskPatch;

    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> Uuid {
        self.id
    }

    fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    fn display_name(&self) -> String {
        self.title.clone()
    }

    fn insert_row(new: &NewTask) -> Result<Row, SchemaError> {
        RowWriter::new(&TASK_FIELDS)
            .set("title", &new.title)
            .set_opt("description", new.description.as_ref())
            .set_opt("task_type", new.task_type)
            .set_opt("priority", new.priority)
            .set_opt("status", new.status)
            .set_opt("due_date", new.due_date)
            .set_opt("reminder_at", new.reminder_at)
            .set("tags", &new.tags)
            .set_opt("notes", new.notes.as_ref())
            .set("custom_fields", &new.custom_fields)
            .set_opt("contact_id", new.contact_id)
            .set_opt("deal_id", new.deal_id)
            .set_opt("assigned_to", new.assigned_to)
            .finish()
    }

    fn patch_row(patch: &TaskPatch) -> Result<PatchRow, SchemaError> {
        RowWriter::new(&TASK_FIELDS)
            .set_opt("title", patch.title.as_ref())
            .set_opt("description", patch.description.as_ref())
            .set_opt("task_type", patch.task_type)
            .set_opt("priority", patch.priority)
            .set_opt("status", patch.status)
            .set_opt("due_date", patch.due_date)
            .set_opt("reminder_at", patch.reminder_at)
            .set_opt("tags", patch.tags.as_ref())
            .set_opt("notes", patch.notes.as_ref())
            .set_opt("custom_fields", patch.custom_fields.as_ref())
            .set_opt("contact_id", patch.contact_id)
            .set_opt("deal_id", patch.deal_id)
            .set_opt("assigned_to", patch.assigned_to)
            .finish_patch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskStatus, TaskType};
    use serde_json::{Value, json};

    fn task_row() -> Row {
        let value = json!({
            "id": Uuid::new_v4(),
            "organization_id": Uuid::new_v4(),
            "title": "Send proposal",
            "type": "follow_up",
            "status": "in_progress",
            "priority": "high",
            "tags": ["q3"],
            "custom_fields": {"region": "emea"},
            "created_at": "2025-03-01T09:00:00Z",
            "updated_at": "2025-03-01T09:00:00Z"
        });
        match value {
            Value::Object(row) => row,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_task_type_reads_from_type_column() {
        let task = Task::from_row(&task_row()).expect("task");
        assert_eq!(task.task_type, TaskType::FollowUp);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.tags, vec!["q3".to_string()]);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_task_patch_writes_type_column() {
        let patch = TaskPatch {
            task_type: Some(TaskType::Call),
            ..Default::default()
        };
        let patch = Task::patch_row(&patch).expect("patch");
        assert_eq!(patch.row.get("type"), Some(&json!("call")));
        assert_eq!(patch.changed, vec!["task_type"]);
    }

    #[test]
    fn test_sparse_patch_keeps_empty_values() {
        let patch = ContactPatch {
            company: Some(Some(String::new())),
            phone: Some(None),
            tags: Some(vec![]),
            lead_score: Some(0),
            ..Default::default()
        };
        let patch = Contact::patch_row(&patch).expect("patch");
        assert_eq!(patch.row.get("company"), Some(&json!("")));
        assert_eq!(patch.row.get("phone"), Some(&Value::Null));
        assert_eq!(patch.row.get("tags"), Some(&json!([])));
        assert_eq!(patch.row.get("lead_score"), Some(&json!(0)));
        assert_eq!(patch.changed.len(), 4);
        assert!(!patch.row.contains_key("email"));
    }

    #[test]
    fn test_insert_row_leaves_defaults_to_the_store() {
        let new = NewDeal {
            title: "Expansion".to_string(),
            ..Default::default()
        };
        let row = Deal::insert_row(&new).expect("row");
        assert!(!row.contains_key("stage"));
        assert!(!row.contains_key("probability"));
        assert_eq!(row.get("title"), Some(&json!("Expansion")));
    }

    #[test]
    fn test_missing_required_column_is_reported() {
        let mut row = task_row();
        row.remove("title");
        assert!(matches!(
            Task::from_row(&row),
            Err(SchemaError::Missing { field, .. }) if field == "title"
        ));
    }
}
