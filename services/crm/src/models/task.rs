//! Task model and related payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{CustomFields, patch::nullable};
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Task,
    Call,
    Email,
    Meeting,
    FollowUp,
    Demo,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task entity
///
/// `completed_at` is stamped by the data layer the first time the task
/// moves to [`TaskStatus::Completed`] and is never taken from callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminder_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub custom_fields: CustomFields,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New task creation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub custom_fields: CustomFields,
    pub contact_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), String> {
        validation::validate_required("title", &self.title)?;
        if let (Some(reminder), Some(due)) = (self.reminder_at, self.due_date) {
            if reminder > due {
                return Err("reminder_at must not be after due_date".to_string());
            }
        }
        validation::validate_custom_fields(&self.custom_fields)
    }
}

/// Task update payload; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
    pub title: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(rename = "type")]
    pub task_type: Option<TaskType>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    #[serde(deserialize_with = "nullable")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(deserialize_with = "nullable")]
    pub reminder_at: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
    #[serde(deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
    pub custom_fields: Option<CustomFields>,
    #[serde(deserialize_with = "nullable")]
    pub contact_id: Option<Option<Uuid>>,
    #[serde(deserialize_with = "nullable")]
    pub deal_id: Option<Option<Uuid>>,
    #[serde(deserialize_with = "nullable")]
    pub assigned_to: Option<Option<Uuid>>,
}

impl TaskPatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(fields) = &self.custom_fields {
            validation::validate_custom_fields(fields)?;
        }
        Ok(())
    }

    /// Whether this patch asks for the task to be marked completed
    pub fn completes(&self) -> bool {
        self.status == Some(TaskStatus::Completed)
    }
}
