use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::debug;

use crate::task::Task;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Order,
    DueDate,
    Priority,
    Created,
    Alphabetical,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Order => "order",
            SortKey::DueDate => "dueDate",
            SortKey::Priority => "priority",
            SortKey::Created => "created",
            SortKey::Alphabetical => "alphabetical",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "order" => Ok(SortKey::Order),
            "duedate" | "due" => Ok(SortKey::DueDate),
            "priority" => Ok(SortKey::Priority),
            "created" | "createdat" => Ok(SortKey::Created),
            "alphabetical" | "alpha" | "title" => Ok(SortKey::Alphabetical),
            other => Err(anyhow!("unknown sort key: {other}")),
        }
    }
}

/// Returns a new, ordered copy of `tasks`.
///
/// `slice::sort_by` is stable: tasks the comparator treats as equal keep
/// their input order. No key adds a secondary tie-break.
pub fn sort_tasks(tasks: &[Task], key: SortKey) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    sorted.sort_by(|a, b| compare(a, b, key));
    debug!(count = sorted.len(), key = %key, "sorted tasks");
    sorted
}

pub fn compare(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::DueDate => match (a.due_date, b.due_date) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => x.cmp(&y),
        },
        SortKey::Priority => b.priority.rank().cmp(&a.priority.rank()),
        SortKey::Created => b.created_at.cmp(&a.created_at),
        SortKey::Alphabetical => compare_titles(&a.title, &b.title),
        SortKey::Order => a.order.cmp(&b.order),
    }
}

// Case-folded comparison, raw text as tiebreak.
fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
