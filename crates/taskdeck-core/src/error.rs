use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("invalid input: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl TaskError {
    pub fn task_not_found(id: u64) -> Self {
        Self::NotFound { entity: "task", id }
    }

    pub fn category_not_found(id: u64) -> Self {
        Self::NotFound {
            entity: "category",
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Backend failures. The cause is opaque to callers; they only surface it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed backend payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TaskError {
    fn from(err: reqwest::Error) -> Self {
        Self::Gateway(GatewayError::Transport(err))
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Gateway(GatewayError::Decode(err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormField {
    Title,
    Category,
    DueDate,
}

impl FormField {
    pub fn as_str(self) -> &'static str {
        match self {
            FormField::Title => "title",
            FormField::Category => "categoryId",
            FormField::DueDate => "dueDate",
        }
    }
}

/// Per-field messages, so each one can be shown next to its input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<FormField, String>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: FormField, message: impl Into<String>) {
        self.fields.insert(field, message.into());
    }

    pub fn get(&self, field: FormField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FormField, &str)> {
        self.fields
            .iter()
            .map(|(field, message)| (*field, message.as_str()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {message}", field.as_str())?;
            first = false;
        }
        Ok(())
    }
}
