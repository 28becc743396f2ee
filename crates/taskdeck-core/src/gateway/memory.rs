use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use super::{CategoryGateway, OrderClock, TaskGateway};
use crate::error::{TaskError, TaskResult};
use crate::task::{
    Category, CategoryDraft, CategoryPatch, DEFAULT_CATEGORY_COLOR, Task, TaskDraft, TaskPatch,
};

#[derive(Debug)]
struct TaskTable {
    tasks: Vec<Task>,
    // Highest id ever handed out; deleted ids are never reissued.
    high_water: u64,
}

/// In-process task backend. Every call waits `latency` before touching the
/// table; the lock is never held across that wait.
#[derive(Debug)]
pub struct MemoryGateway {
    table: Mutex<TaskTable>,
    clock: OrderClock,
    latency: Duration,
}

impl MemoryGateway {
    pub fn new(seed: Vec<Task>) -> Self {
        let high_water = seed.iter().map(|t| t.id).max().unwrap_or(0);
        let last_order = seed.iter().map(|t| t.order).max().unwrap_or(0);
        debug!(count = seed.len(), high_water, "seeded memory gateway");
        Self {
            table: Mutex::new(TaskTable {
                tasks: seed,
                high_water,
            }),
            clock: OrderClock::starting_after(last_order),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.table.lock().tasks.clone()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl TaskGateway for MemoryGateway {
    #[instrument(skip(self))]
    async fn list(&self) -> TaskResult<Vec<Task>> {
        self.simulate_latency().await;
        Ok(self.snapshot())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: u64) -> TaskResult<Task> {
        self.simulate_latency().await;
        self.table
            .lock()
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| TaskError::task_not_found(id))
    }

    #[instrument(skip(self, draft), fields(title_len = draft.title.len(), category = draft.category_id))]
    async fn create(&self, draft: TaskDraft) -> TaskResult<Task> {
        self.simulate_latency().await;
        let now = Utc::now();
        let order = self.clock.next(now);

        let task = {
            let mut table = self.table.lock();
            table.high_water += 1;
            let task = Task::from_draft(draft, table.high_water, now, order);
            table.tasks.push(task.clone());
            task
        };

        info!(id = task.id, order = task.order, "created task");
        Ok(task)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: u64, patch: TaskPatch) -> TaskResult<Task> {
        self.simulate_latency().await;
        let mut table = self.table.lock();
        let task = table
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskError::task_not_found(id))?;
        task.apply_patch(patch);
        debug!(id, completed = task.completed, "updated task");
        Ok(task.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: u64) -> TaskResult<()> {
        self.simulate_latency().await;
        let mut table = self.table.lock();
        let idx = table
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TaskError::task_not_found(id))?;
        table.tasks.remove(idx);
        info!(id, remaining = table.tasks.len(), "deleted task");
        Ok(())
    }

    // One critical section, so a concurrent update cannot slip between the
    // read and the flip.
    #[instrument(skip(self))]
    async fn toggle_complete(&self, id: u64) -> TaskResult<Task> {
        self.simulate_latency().await;
        let mut table = self.table.lock();
        let task = table
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TaskError::task_not_found(id))?;
        task.completed = !task.completed;
        debug!(id, completed = task.completed, "toggled task");
        Ok(task.clone())
    }
}

#[derive(Debug)]
struct CategoryTable {
    categories: Vec<Category>,
    high_water: u64,
}

#[derive(Debug)]
pub struct MemoryCategoryGateway {
    table: Mutex<CategoryTable>,
    latency: Duration,
}

impl MemoryCategoryGateway {
    pub fn new(seed: Vec<Category>) -> Self {
        let high_water = seed.iter().map(|c| c.id).max().unwrap_or(0);
        Self {
            table: Mutex::new(CategoryTable {
                categories: seed,
                high_water,
            }),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn snapshot(&self) -> Vec<Category> {
        self.table.lock().categories.clone()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl CategoryGateway for MemoryCategoryGateway {
    #[instrument(skip(self))]
    async fn list(&self) -> TaskResult<Vec<Category>> {
        self.simulate_latency().await;
        Ok(self.snapshot())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: u64) -> TaskResult<Category> {
        self.simulate_latency().await;
        self.table
            .lock()
            .categories
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| TaskError::category_not_found(id))
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    async fn create(&self, draft: CategoryDraft) -> TaskResult<Category> {
        self.simulate_latency().await;
        let mut table = self.table.lock();
        table.high_water += 1;
        let id = table.high_water;
        let category = Category {
            id,
            name: draft.name,
            color: draft
                .color
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            order: table.categories.len() as u32 + 1,
        };
        table.categories.push(category.clone());
        info!(id, "created category");
        Ok(category)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: u64, patch: CategoryPatch) -> TaskResult<Category> {
        self.simulate_latency().await;
        let mut table = self.table.lock();
        let category = table
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| TaskError::category_not_found(id))?;
        category.apply_patch(patch);
        Ok(category.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: u64) -> TaskResult<Category> {
        self.simulate_latency().await;
        let mut table = self.table.lock();
        let idx = table
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| TaskError::category_not_found(id))?;
        let removed = table.categories.remove(idx);
        info!(id, "deleted category");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::{MemoryCategoryGateway, MemoryGateway};
    use crate::error::TaskError;
    use crate::gateway::{CategoryGateway, TaskGateway};
    use crate::task::{CategoryDraft, Priority, TaskDraft, TaskPatch};

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let gateway = MemoryGateway::new(vec![]);
        let mut draft = TaskDraft::new("Write report", 2);
        draft.description = "quarterly".to_string();
        draft.priority = Priority::High;

        let created = gateway.create(draft.clone()).await.expect("create");
        let fetched = gateway.get(created.id).await.expect("get");

        assert_eq!(fetched, created);
        assert_eq!(fetched.title, draft.title);
        assert_eq!(fetched.description, draft.description);
        assert_eq!(fetched.category_id, draft.category_id);
        assert_eq!(fetched.priority, draft.priority);
        assert!(!fetched.completed);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let gateway = MemoryGateway::new(vec![]);
        let a = gateway.create(TaskDraft::new("a", 1)).await.unwrap();
        let b = gateway.create(TaskDraft::new("b", 1)).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert!(b.order > a.order);

        gateway.delete(b.id).await.unwrap();
        let c = gateway.create(TaskDraft::new("c", 1)).await.unwrap();
        assert_eq!(c.id, 3);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let gateway = MemoryGateway::new(vec![]);
        assert!(matches!(
            gateway.get(999).await,
            Err(TaskError::NotFound { id: 999, .. })
        ));
        assert!(gateway.update(999, TaskPatch::default()).await.unwrap_err().is_not_found());
        assert!(gateway.delete(999).await.unwrap_err().is_not_found());
        assert!(gateway.toggle_complete(999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn toggle_flips_only_completion() {
        let gateway = MemoryGateway::new(vec![]);
        let created = gateway.create(TaskDraft::new("a", 1)).await.unwrap();

        let toggled = gateway.toggle_complete(created.id).await.unwrap();
        assert!(toggled.completed);
        assert_eq!(toggled.created_at, created.created_at);
        assert_eq!(toggled.order, created.order);

        let back = gateway.toggle_complete(created.id).await.unwrap();
        assert!(!back.completed);
    }

    #[tokio::test]
    async fn query_helpers_filter_listing() {
        let gateway = MemoryGateway::new(vec![]).with_latency(Duration::from_millis(1));
        let mut urgent = TaskDraft::new("urgent", 1);
        urgent.priority = Priority::High;
        urgent.due_date = Some(Utc::now() - chrono::Duration::hours(1));
        gateway.create(urgent).await.unwrap();
        gateway.create(TaskDraft::new("groceries", 2)).await.unwrap();

        assert_eq!(gateway.by_category(2).await.unwrap().len(), 1);
        assert_eq!(gateway.by_priority(Priority::High).await.unwrap().len(), 1);
        assert_eq!(gateway.overdue(Utc::now()).await.unwrap().len(), 1);
        assert_eq!(gateway.search("GROC").await.unwrap().len(), 1);
        assert_eq!(gateway.search("  ").await.unwrap().len(), 2);
        assert!(gateway.completed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn category_crud() {
        let gateway = MemoryCategoryGateway::new(vec![]);
        let work = gateway
            .create(CategoryDraft {
                name: "Work".to_string(),
                color: None,
            })
            .await
            .unwrap();
        assert_eq!(work.id, 1);
        assert_eq!(work.order, 1);
        assert_eq!(work.color, "#6B7280");

        let removed = gateway.delete(work.id).await.unwrap();
        assert_eq!(removed.name, "Work");
        assert!(gateway.get(work.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn category_ids_are_not_reused_after_delete() {
        let gateway = MemoryCategoryGateway::new(crate::datastore::default_categories());
        let draft = |name: &str| CategoryDraft {
            name: name.to_string(),
            color: None,
        };

        let errands = gateway.create(draft("Errands")).await.unwrap();
        assert_eq!(errands.id, 5);
        gateway.delete(errands.id).await.unwrap();

        let garden = gateway.create(draft("Garden")).await.unwrap();
        assert_eq!(garden.id, 6);
        assert_eq!(garden.order, 5);
    }
}
