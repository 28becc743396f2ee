//! Persistence gateways: CRUD over task and category records.
//!
//! Two interchangeable backends implement the traits: [`memory`] keeps the
//! records in process (optionally simulating latency) and [`remote`] talks to
//! a tabular record API. Nothing above this module knows which one is active.

pub mod memory;
pub mod query;
pub mod remote;

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::error::TaskResult;
use crate::filter::{FilterCriteria, StatusFilter, filter_tasks};
use crate::sort::{SortKey, sort_tasks};
use crate::task::{Category, CategoryDraft, CategoryPatch, Priority, Task, TaskDraft, TaskPatch};

pub use memory::{MemoryCategoryGateway, MemoryGateway};
pub use remote::{RemoteCategoryGateway, RemoteGateway, RemoteSettings};

pub trait TaskGateway: Send + Sync {
    fn list(&self) -> impl Future<Output = TaskResult<Vec<Task>>> + Send;

    fn get(&self, id: u64) -> impl Future<Output = TaskResult<Task>> + Send;

    /// Assigns `id`, `created_at` and `order`; `completed` starts false.
    fn create(&self, draft: TaskDraft) -> impl Future<Output = TaskResult<Task>> + Send;

    fn update(&self, id: u64, patch: TaskPatch)
    -> impl Future<Output = TaskResult<Task>> + Send;

    fn delete(&self, id: u64) -> impl Future<Output = TaskResult<()>> + Send;

    fn toggle_complete(&self, id: u64) -> impl Future<Output = TaskResult<Task>> + Send {
        async move {
            let current = self.get(id).await?;
            self.update(id, TaskPatch::completed(!current.completed))
                .await
        }
    }

    fn by_category(&self, category_id: u64) -> impl Future<Output = TaskResult<Vec<Task>>> + Send {
        async move {
            let criteria = FilterCriteria {
                category: Some(category_id),
                ..FilterCriteria::default()
            };
            query_local(self, criteria, SortKey::Order, Utc::now()).await
        }
    }

    fn by_priority(&self, priority: Priority) -> impl Future<Output = TaskResult<Vec<Task>>> + Send {
        async move {
            let criteria = FilterCriteria {
                priority: Some(priority),
                ..FilterCriteria::default()
            };
            query_local(self, criteria, SortKey::Order, Utc::now()).await
        }
    }

    fn completed(&self) -> impl Future<Output = TaskResult<Vec<Task>>> + Send {
        async move {
            let criteria = FilterCriteria {
                status: StatusFilter::Completed,
                ..FilterCriteria::default()
            };
            query_local(self, criteria, SortKey::Order, Utc::now()).await
        }
    }

    fn overdue(&self, now: DateTime<Utc>) -> impl Future<Output = TaskResult<Vec<Task>>> + Send {
        async move {
            let criteria = FilterCriteria {
                status: StatusFilter::Overdue,
                ..FilterCriteria::default()
            };
            query_local(self, criteria, SortKey::DueDate, now).await
        }
    }

    /// Blank text lists everything.
    fn search(&self, text: &str) -> impl Future<Output = TaskResult<Vec<Task>>> + Send {
        let criteria = FilterCriteria {
            search: text.to_string(),
            ..FilterCriteria::default()
        };
        async move { query_local(self, criteria, SortKey::Order, Utc::now()).await }
    }
}

async fn query_local<G: TaskGateway + ?Sized>(
    gateway: &G,
    criteria: FilterCriteria,
    key: SortKey,
    now: DateTime<Utc>,
) -> TaskResult<Vec<Task>> {
    let tasks = gateway.list().await?;
    Ok(sort_tasks(&filter_tasks(&tasks, &criteria, now), key))
}

pub trait CategoryGateway: Send + Sync {
    fn list(&self) -> impl Future<Output = TaskResult<Vec<Category>>> + Send;

    fn get(&self, id: u64) -> impl Future<Output = TaskResult<Category>> + Send;

    fn create(&self, draft: CategoryDraft) -> impl Future<Output = TaskResult<Category>> + Send;

    fn update(
        &self,
        id: u64,
        patch: CategoryPatch,
    ) -> impl Future<Output = TaskResult<Category>> + Send;

    fn delete(&self, id: u64) -> impl Future<Output = TaskResult<Category>> + Send;
}

/// Issues strictly increasing order keys from a millisecond clock.
///
/// Rapid successive creations land one millisecond apart instead of
/// colliding, so ascending `order` always follows creation order.
#[derive(Debug, Default)]
pub struct OrderClock {
    last: AtomicI64,
}

impl OrderClock {
    pub fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    pub fn next(&self, now: DateTime<Utc>) -> i64 {
        let now_ms = now.timestamp_millis();
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(current.saturating_add(1));
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::OrderClock;

    #[test]
    fn order_keys_never_repeat() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let clock = OrderClock::default();
        let a = clock.next(now);
        let b = clock.next(now);
        let c = clock.next(now);
        assert_eq!(a, now.timestamp_millis());
        assert_eq!(b, a + 1);
        assert_eq!(c, a + 2);

        let seeded = OrderClock::starting_after(a + 100);
        assert_eq!(seeded.next(now), a + 101);
    }
}
