use chrono::{DateTime, Utc};
use tracing::debug;

use crate::datetime::parse_date_expr;
use crate::error::{FormField, TaskError, TaskResult, ValidationErrors};
use crate::task::{Priority, Task, TaskDraft, TaskPatch};

/// Raw create/edit form input, exactly as the user typed it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskForm {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub priority: Option<Priority>,
    pub due_date: String,
}

struct Checked {
    title: String,
    category_id: u64,
    due_date: Option<DateTime<Utc>>,
}

impl TaskForm {
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            category_id: task.category_id.to_string(),
            priority: Some(task.priority),
            due_date: task
                .due_date
                .map(|due| due.to_rfc3339())
                .unwrap_or_default(),
        }
    }

    /// Validates the form into a create request. Every failing field is
    /// reported at once.
    pub fn validate(&self, now: DateTime<Utc>) -> TaskResult<TaskDraft> {
        let checked = self.check(now)?;
        Ok(TaskDraft {
            title: checked.title,
            description: self.description.clone(),
            category_id: checked.category_id,
            priority: self.priority.unwrap_or_default(),
            due_date: checked.due_date,
        })
    }

    /// Validates the form into a full-record edit. An empty due date clears
    /// the deadline.
    pub fn to_patch(&self, now: DateTime<Utc>) -> TaskResult<TaskPatch> {
        let checked = self.check(now)?;
        Ok(TaskPatch {
            title: Some(checked.title),
            description: Some(self.description.clone()),
            category_id: Some(checked.category_id),
            priority: self.priority,
            due_date: Some(checked.due_date),
            completed: None,
        })
    }

    fn check(&self, now: DateTime<Utc>) -> TaskResult<Checked> {
        let mut errors = ValidationErrors::default();

        let title = self.title.trim().to_string();
        if title.is_empty() {
            errors.add(FormField::Title, "Title is required");
        }

        let category_id = match self.category_id.trim() {
            "" => {
                errors.add(FormField::Category, "Category is required");
                None
            }
            raw => match raw.parse::<u64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add(FormField::Category, "Category is required");
                    None
                }
            },
        };

        let due_date = match self.due_date.trim() {
            "" => None,
            raw => match parse_date_expr(raw, now) {
                Ok(due) => Some(due),
                Err(err) => {
                    debug!(input = raw, error = %err, "rejected due date");
                    errors.add(FormField::DueDate, "Invalid due date");
                    None
                }
            },
        };

        match category_id {
            Some(category_id) if errors.is_empty() => Ok(Checked {
                title,
                category_id,
                due_date,
            }),
            _ => Err(TaskError::Validation(errors)),
        }
    }
}
