//! Task access
//!
//! Completion time is owned by the data layer: it is stamped when a task is
//! created as completed or first moves into the completed status, and a
//! repeated completion leaves it untouched.

use chrono::{DateTime, Utc};
use serde_json::json;

use super::{EntityService, ManagedEntity};
use crate::{
    backend::Row,
    models::{NewTask, Task, TaskPatch, TaskStatus},
    schema::{RowShape, SchemaError},
};

pub type TaskService = EntityService<Task>;

fn stamp_completion(row: &mut Row, now: DateTime<Utc>) -> Result<(), SchemaError> {
    let column = Task::fields().column("completed_at")?;
    row.insert(column.to_string(), json!(now));
    Ok(())
}

impl ManagedEntity for Task {
    fn validate_new(new: &NewTask) -> Result<(), String> {
        new.validate()
    }

    fn validate_patch(patch: &TaskPatch) -> Result<(), String> {
        patch.validate()
    }

    fn prepare_insert(new: &NewTask, row: &mut Row, now: DateTime<Utc>) -> Result<(), SchemaError> {
        if new.status == Some(TaskStatus::Completed) {
            stamp_completion(row, now)?;
        }
        Ok(())
    }

    fn prepare_update(
        before: &Task,
        patch: &TaskPatch,
        changes: &mut Row,
        now: DateTime<Utc>,
    ) -> Result<(), SchemaError> {
        if patch.completes() && before.status != TaskStatus::Completed {
            stamp_completion(changes, now)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomFields, TaskPriority, TaskType};
    use uuid::Uuid;

    fn task(status: TaskStatus) -> Task {
        Task {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            title: "Follow up".to_string(),
            description: None,
            task_type: TaskType::FollowUp,
            priority: TaskPriority::High,
            status,
            due_date: None,
            completed_at: None,
            reminder_at: None,
            tags: vec![],
            notes: None,
            custom_fields: CustomFields::new(),
            contact_id: None,
            deal_id: None,
            assigned_to: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn completing() -> TaskPatch {
        TaskPatch {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_completion_is_stamped() {
        let mut changes = Row::new();
        let now = Utc::now();
        Task::prepare_update(&task(TaskStatus::Pending), &completing(), &mut changes, now)
            .expect("prepare");
        assert_eq!(changes.get("completed_at"), Some(&json!(now)));
    }

    #[test]
    fn test_repeated_completion_is_not_restamped() {
        let mut changes = Row::new();
        Task::prepare_update(
            &task(TaskStatus::Completed),
            &completing(),
            &mut changes,
            Utc::now(),
        )
        .expect("prepare");
        assert!(!changes.contains_key("completed_at"));
    }

    #[test]
    fn test_created_completed_is_stamped() {
        let new = NewTask {
            title: "Done already".to_string(),
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let mut row = Row::new();
        Task::prepare_insert(&new, &mut row, Utc::now()).expect("prepare");
        assert!(row.contains_key("completed_at"));
    }
}
