use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  trace
};

use crate::datetime::is_overdue;
use crate::task::{
  Priority,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Completed,
  Overdue
}

impl StatusFilter {
  pub fn as_str(self) -> &'static str {
    match self {
      | StatusFilter::All => "all",
      | StatusFilter::Active => "active",
      | StatusFilter::Completed => {
        "completed"
      }
      | StatusFilter::Overdue => {
        "overdue"
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "all" => {
        Ok(StatusFilter::All)
      }
      | "active" | "open" => {
        Ok(StatusFilter::Active)
      }
      | "completed" | "done" => {
        Ok(StatusFilter::Completed)
      }
      | "overdue" => {
        Ok(StatusFilter::Overdue)
      }
      | other => {
        Err(anyhow!(
          "unknown status filter: \
           {other}"
        ))
      }
    }
  }
}

/// Search/category/priority/status
/// constraints applied before display.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
)]
pub struct FilterCriteria {
  pub category: Option<u64>,
  pub priority: Option<Priority>,
  pub status:   StatusFilter,
  pub search:   String
}

/// A partial change to the user's
/// criteria. `Some(None)` clears a
/// dimension.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
)]
pub struct FilterUpdate {
  pub category: Option<Option<u64>>,
  pub priority:
    Option<Option<Priority>>,
  pub status:   Option<StatusFilter>,
  pub search:   Option<String>
}

impl FilterCriteria {
  #[must_use]
  pub fn merge(
    &self,
    update: FilterUpdate
  ) -> Self {
    let mut out = self.clone();
    if let Some(category) =
      update.category
    {
      out.category = category;
    }
    if let Some(priority) =
      update.priority
    {
      out.priority = priority;
    }
    if let Some(status) = update.status
    {
      out.status = status;
    }
    if let Some(search) = update.search
    {
      out.search = search;
    }
    out
  }

  pub fn clear(&mut self) {
    *self = Self::default();
  }

  pub fn has_active_filters(
    &self
  ) -> bool {
    self.category.is_some()
      || self.priority.is_some()
      || self.status != StatusFilter::All
      || !self.search.trim().is_empty()
  }

  fn matches_with(
    &self,
    task: &Task,
    needle: Option<&str>,
    now: DateTime<Utc>
  ) -> bool {
    if let Some(needle) = needle {
      let title_match = task
        .title
        .to_lowercase()
        .contains(needle);
      let description_match = task
        .description
        .to_lowercase()
        .contains(needle);
      if !title_match
        && !description_match
      {
        return false;
      }
    }

    if let Some(category) =
      self.category
      && task.category_id != category
    {
      return false;
    }

    if let Some(priority) =
      self.priority
      && task.priority != priority
    {
      return false;
    }

    let ok = match self.status {
      | StatusFilter::All => true,
      | StatusFilter::Active => {
        !task.completed
      }
      | StatusFilter::Completed => {
        task.completed
      }
      | StatusFilter::Overdue => {
        !task.completed
          && is_overdue(
            task.due_date,
            now
          )
      }
    };

    trace!(id = task.id, status = %self.status, ok, "filter predicate evaluation");
    ok
  }
}

fn normalized_search(
  search: &str
) -> Option<String> {
  let trimmed = search.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(trimmed.to_lowercase())
  }
}

/// Keeps the tasks matching `criteria`,
/// in input order. The input is never
/// touched; `now` decides what counts
/// as overdue.
#[tracing::instrument(skip(
  tasks, criteria, now
))]
pub fn filter_tasks(
  tasks: &[Task],
  criteria: &FilterCriteria,
  now: DateTime<Utc>
) -> Vec<Task> {
  let needle =
    normalized_search(&criteria.search);
  let out: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      criteria.matches_with(
        task,
        needle.as_deref(),
        now
      )
    })
    .cloned()
    .collect();

  debug!(
    input = tasks.len(),
    output = out.len(),
    category = ?criteria.category,
    priority = ?criteria.priority,
    status = %criteria.status,
    search = %criteria.search,
    "filtered tasks"
  );
  out
}
