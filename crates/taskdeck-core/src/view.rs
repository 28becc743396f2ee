use std::fmt;

use chrono::{
  DateTime,
  Utc
};
use tracing::debug;

use crate::filter::{
  FilterCriteria,
  StatusFilter
};
use crate::task::{
  Category,
  Priority,
  Task
};

/// Navigation routes the task list can
/// be rendered under.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Route {
  All,
  Completed,
  Overdue,
  Category(u64),
  Priority(Priority),
  Unknown
}

impl Route {
  pub fn parse(path: &str) -> Self {
    let trimmed = path.trim();
    let trimmed =
      trimmed.trim_end_matches('/');
    let segments: Vec<&str> = trimmed
      .split('/')
      .filter(|seg| !seg.is_empty())
      .collect();

    match segments.as_slice() {
      | [] => Route::All,
      | ["completed"] => {
        Route::Completed
      }
      | ["overdue"] => Route::Overdue,
      | ["category", id] => {
        match id.parse::<u64>() {
          | Ok(id) => Route::Category(id),
          | Err(_) => Route::Unknown
        }
      }
      | ["priority", level] => {
        match *level {
          | "low" => {
            Route::Priority(Priority::Low)
          }
          | "medium" => {
            Route::Priority(
              Priority::Medium
            )
          }
          | "high" => {
            Route::Priority(
              Priority::High
            )
          }
          | _ => Route::Unknown
        }
      }
      | _ => Route::Unknown
    }
  }
}

impl fmt::Display for Route {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Route::All | Route::Unknown => {
        f.write_str("/")
      }
      | Route::Completed => {
        f.write_str("/completed")
      }
      | Route::Overdue => {
        f.write_str("/overdue")
      }
      | Route::Category(id) => {
        write!(f, "/category/{id}")
      }
      | Route::Priority(priority) => {
        write!(f, "/priority/{priority}")
      }
    }
  }
}

/// Route-derived criteria. Whatever it
/// sets overrides the user's value;
/// search is never touched.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub struct FilterPatch {
  pub status:   Option<StatusFilter>,
  pub category: Option<u64>,
  pub priority: Option<Priority>
}

impl FilterPatch {
  pub fn is_empty(&self) -> bool {
    self == &Self::default()
  }

  #[must_use]
  pub fn apply(
    &self,
    user: &FilterCriteria
  ) -> FilterCriteria {
    FilterCriteria {
      category: self
        .category
        .or(user.category),
      priority: self
        .priority
        .or(user.priority),
      status:   self
        .status
        .unwrap_or(user.status),
      search:   user.search.clone()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewContext {
  pub route:       Route,
  pub title:       String,
  pub description: String,
  pub patch:       FilterPatch,
  category_name:   Option<String>
}

impl ViewContext {
  /// The "All Tasks" view with nothing
  /// pinned, used for unmatched routes.
  pub fn unrouted() -> Self {
    Self {
      route:         Route::Unknown,
      title:         "All Tasks"
        .to_string(),
      description:   "Manage all your \
                      tasks in one place"
        .to_string(),
      patch:         FilterPatch::default(),
      category_name: None
    }
  }

  pub fn criteria(
    &self,
    user: &FilterCriteria
  ) -> FilterCriteria {
    self.patch.apply(user)
  }

  pub fn empty_message(
    &self,
    user_search: &str
  ) -> String {
    match self.route {
      | Route::Completed => {
        "No completed tasks yet. \
         Start checking off those \
         tasks!"
          .to_string()
      }
      | Route::Overdue => {
        "Great! No overdue tasks. \
         You're staying on top of \
         things."
          .to_string()
      }
      | Route::Category(_) => {
        match &self.category_name {
          | Some(name) => format!(
            "No tasks in {name} \
             category yet."
          ),
          | None => {
            "No tasks in this category \
             yet."
              .to_string()
          }
        }
      }
      | Route::Priority(priority) => {
        format!(
          "No {priority} priority \
           tasks found."
        )
      }
      | Route::All | Route::Unknown => {
        let search = user_search.trim();
        if search.is_empty() {
          "No tasks found. Create your \
           first task to get started!"
            .to_string()
        } else {
          format!(
            "No tasks found matching \
             \"{search}\"."
          )
        }
      }
    }
  }
}

#[tracing::instrument(skip(categories))]
pub fn resolve(
  route: Route,
  categories: &[Category]
) -> ViewContext {
  let ctx = match route {
    | Route::All => ViewContext {
      route,
      title: "All Tasks".to_string(),
      description: "Manage all your \
                    tasks in one place"
        .to_string(),
      patch: FilterPatch {
        status: Some(StatusFilter::All),
        ..FilterPatch::default()
      },
      category_name: None
    },
    | Route::Completed => ViewContext {
      route,
      title: "Completed Tasks"
        .to_string(),
      description: "Tasks you've \
                    successfully \
                    completed"
        .to_string(),
      patch: FilterPatch {
        status: Some(
          StatusFilter::Completed
        ),
        ..FilterPatch::default()
      },
      category_name: None
    },
    | Route::Overdue => ViewContext {
      route,
      title: "Overdue Tasks".to_string(),
      description: "Tasks that need \
                    immediate attention"
        .to_string(),
      patch: FilterPatch {
        status: Some(
          StatusFilter::Overdue
        ),
        ..FilterPatch::default()
      },
      category_name: None
    },
    | Route::Category(id) => {
      let category = categories
        .iter()
        .find(|cat| cat.id == id);
      let (title, description) =
        match category {
          | Some(cat) => (
            format!("{} Tasks", cat.name),
            format!(
              "Tasks in the {} category",
              cat.name
            )
          ),
          | None => (
            "Category Tasks".to_string(),
            "Tasks in this category"
              .to_string()
          )
        };
      ViewContext {
        route,
        title,
        description,
        patch: FilterPatch {
          category: Some(id),
          ..FilterPatch::default()
        },
        category_name: category
          .map(|cat| cat.name.clone())
      }
    }
    | Route::Priority(priority) => {
      ViewContext {
        route,
        title: format!(
          "{} Priority",
          priority.label()
        ),
        description: format!(
          "Tasks with {priority} \
           priority level"
        ),
        patch: FilterPatch {
          priority: Some(priority),
          ..FilterPatch::default()
        },
        category_name: None
      }
    }
    | Route::Unknown => {
      ViewContext::unrouted()
    }
  };

  debug!(route = %route, title = %ctx.title, patch = ?ctx.patch, "resolved view");
  ctx
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
  pub id:    u64,
  pub name:  String,
  pub color: String,
  pub count: usize
}

/// Per-view badge counts for the
/// navigation sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarCounts {
  pub all:         usize,
  pub completed:   usize,
  pub overdue:     usize,
  pub by_priority: Vec<(Priority, usize)>,
  pub by_category: Vec<CategoryCount>
}

pub fn sidebar_counts(
  tasks: &[Task],
  categories: &[Category],
  now: DateTime<Utc>
) -> SidebarCounts {
  let by_priority = Priority::ALL
    .iter()
    .map(|priority| {
      (
        *priority,
        tasks
          .iter()
          .filter(|task| {
            task.priority == *priority
          })
          .count()
      )
    })
    .collect();

  let by_category = categories
    .iter()
    .map(|cat| CategoryCount {
      id:    cat.id,
      name:  cat.name.clone(),
      color: cat.color.clone(),
      count: tasks
        .iter()
        .filter(|task| {
          task.category_id == cat.id
        })
        .count()
    })
    .collect();

  SidebarCounts {
    all: tasks.len(),
    completed: tasks
      .iter()
      .filter(|task| task.completed)
      .count(),
    overdue: tasks
      .iter()
      .filter(|task| task.is_overdue(now))
      .count(),
    by_priority,
    by_category
  }
}
