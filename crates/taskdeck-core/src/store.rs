//! Client-side state: the task list with the user's filters, and the
//! category list. Both change only after a gateway call has succeeded.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use crate::error::TaskResult;
use crate::filter::{FilterCriteria, FilterUpdate, filter_tasks};
use crate::gateway::{CategoryGateway, TaskGateway};
use crate::sort::{SortKey, sort_tasks};
use crate::task::{Category, CategoryDraft, CategoryPatch, Task, TaskDraft, TaskPatch};
use crate::view::ViewContext;

/// A mutation to run against the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCommand {
    Create(TaskDraft),
    Update { id: u64, patch: TaskPatch },
    Delete(u64),
    ToggleComplete(u64),
}

/// What a successful command changed, ready to fold into a [`TaskStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Created(Task),
    Updated(Task),
    Deleted(u64),
}

impl TaskCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TaskCommand::Create(_) => "create",
            TaskCommand::Update { .. } => "update",
            TaskCommand::Delete(_) => "delete",
            TaskCommand::ToggleComplete(_) => "toggle",
        }
    }

    /// Runs the command without touching any store. Several executions may
    /// be in flight at once; their outcomes are applied as they finish.
    #[instrument(skip(gateway), fields(command = self.name()))]
    pub async fn execute<G>(self, gateway: &G) -> TaskResult<CommandOutcome>
    where
        G: TaskGateway + ?Sized,
    {
        let outcome = match self {
            TaskCommand::Create(draft) => CommandOutcome::Created(gateway.create(draft).await?),
            TaskCommand::Update { id, patch } => {
                CommandOutcome::Updated(gateway.update(id, patch).await?)
            }
            TaskCommand::Delete(id) => {
                gateway.delete(id).await?;
                CommandOutcome::Deleted(id)
            }
            TaskCommand::ToggleComplete(id) => {
                CommandOutcome::Updated(gateway.toggle_complete(id).await?)
            }
        };
        Ok(outcome)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    filters: FilterCriteria,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            filters: FilterCriteria::default(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn filters(&self) -> &FilterCriteria {
        &self.filters
    }

    pub fn find(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Replaces the local list with the gateway's. On failure the current
    /// list is kept.
    #[instrument(skip_all)]
    pub async fn load<G>(&mut self, gateway: &G) -> TaskResult<usize>
    where
        G: TaskGateway + ?Sized,
    {
        let tasks = gateway.list().await.inspect_err(|err| {
            error!(error = %err, "failed to load tasks");
        })?;
        self.tasks = tasks;
        debug!(count = self.tasks.len(), "loaded tasks");
        Ok(self.tasks.len())
    }

    pub fn set_filter(&mut self, update: FilterUpdate) {
        self.filters = self.filters.merge(update);
        debug!(filters = ?self.filters, "filters updated");
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// Route patch over the user's filters, then filter, then sort.
    pub fn visible(&self, view: &ViewContext, key: SortKey, now: DateTime<Utc>) -> Vec<Task> {
        let criteria = view.criteria(&self.filters);
        sort_tasks(&filter_tasks(&self.tasks, &criteria, now), key)
    }

    pub fn apply(&mut self, outcome: CommandOutcome) {
        match outcome {
            CommandOutcome::Created(task) => {
                self.tasks.insert(0, task);
            }
            CommandOutcome::Updated(task) => {
                match self.tasks.iter_mut().find(|t| t.id == task.id) {
                    Some(slot) => *slot = task,
                    None => debug!(id = task.id, "update for task no longer listed"),
                }
            }
            CommandOutcome::Deleted(id) => {
                self.tasks.retain(|t| t.id != id);
            }
        }
    }

    /// Executes `command` and folds the result in. A failed command leaves
    /// the store exactly as it was.
    pub async fn dispatch<G>(
        &mut self,
        gateway: &G,
        command: TaskCommand,
    ) -> TaskResult<CommandOutcome>
    where
        G: TaskGateway + ?Sized,
    {
        let name = command.name();
        match command.execute(gateway).await {
            Ok(outcome) => {
                info!(command = name, "command applied");
                self.apply(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                error!(command = name, error = %err, "command failed");
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CategoryStore {
    categories: Vec<Category>,
}

impl CategoryStore {
    pub fn new(mut categories: Vec<Category>) -> Self {
        categories.sort_by_key(|c| c.order);
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn find(&self, id: u64) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn name_of(&self, id: u64) -> Option<&str> {
        self.find(id).map(|c| c.name.as_str())
    }

    #[instrument(skip_all)]
    pub async fn load<G>(&mut self, gateway: &G) -> TaskResult<usize>
    where
        G: CategoryGateway + ?Sized,
    {
        let mut categories = gateway.list().await?;
        categories.sort_by_key(|c| c.order);
        self.categories = categories;
        Ok(self.categories.len())
    }

    pub async fn create<G>(&mut self, gateway: &G, draft: CategoryDraft) -> TaskResult<Category>
    where
        G: CategoryGateway + ?Sized,
    {
        let category = gateway.create(draft).await?;
        self.categories.push(category.clone());
        self.categories.sort_by_key(|c| c.order);
        Ok(category)
    }

    pub async fn update<G>(
        &mut self,
        gateway: &G,
        id: u64,
        patch: CategoryPatch,
    ) -> TaskResult<Category>
    where
        G: CategoryGateway + ?Sized,
    {
        let category = gateway.update(id, patch).await?;
        if let Some(slot) = self.categories.iter_mut().find(|c| c.id == id) {
            *slot = category.clone();
        }
        self.categories.sort_by_key(|c| c.order);
        Ok(category)
    }

    pub async fn delete<G>(&mut self, gateway: &G, id: u64) -> TaskResult<Category>
    where
        G: CategoryGateway + ?Sized,
    {
        let removed = gateway.delete(id).await?;
        self.categories.retain(|c| c.id != id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{CategoryStore, CommandOutcome, TaskCommand, TaskStore};
    use crate::error::{GatewayError, TaskError, TaskResult};
    use crate::filter::{FilterUpdate, StatusFilter};
    use crate::gateway::{MemoryCategoryGateway, MemoryGateway, TaskGateway};
    use crate::sort::SortKey;
    use crate::task::{CategoryDraft, Priority, Task, TaskDraft, TaskPatch};
    use crate::view::{Route, ViewContext, resolve};

    fn task(id: u64, title: &str, priority: Priority, completed: bool, due: Option<&str>) -> Task {
        Task {
            id,
            title: title.to_string(),
            description: String::new(),
            category_id: 1,
            priority,
            due_date: due.map(|d| d.parse().unwrap()),
            completed,
            created_at: Utc.with_ymd_and_hms(2019, 12, 1, 0, 0, 0).unwrap(),
            order: id as i64,
        }
    }

    fn seed() -> Vec<Task> {
        vec![
            task(1, "A", Priority::Low, false, None),
            task(2, "B", Priority::High, true, Some("2020-01-01T00:00:00Z")),
        ]
    }

    struct Offline;

    impl TaskGateway for Offline {
        async fn list(&self) -> TaskResult<Vec<Task>> {
            Err(GatewayError::Rejected("offline".to_string()).into())
        }

        async fn get(&self, _id: u64) -> TaskResult<Task> {
            Err(GatewayError::Rejected("offline".to_string()).into())
        }

        async fn create(&self, _draft: TaskDraft) -> TaskResult<Task> {
            Err(GatewayError::Rejected("offline".to_string()).into())
        }

        async fn update(&self, _id: u64, _patch: TaskPatch) -> TaskResult<Task> {
            Err(GatewayError::Rejected("offline".to_string()).into())
        }

        async fn delete(&self, _id: u64) -> TaskResult<()> {
            Err(GatewayError::Rejected("offline".to_string()).into())
        }
    }

    #[test]
    fn active_view_and_priority_sort() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::new(seed());
        store.set_filter(FilterUpdate {
            status: Some(StatusFilter::Active),
            ..FilterUpdate::default()
        });

        let unrouted = ViewContext::unrouted();
        let active = store.visible(&unrouted, SortKey::Order, now);
        assert_eq!(active.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);

        store.clear_filters();
        let by_priority = store.visible(&unrouted, SortKey::Priority, now);
        assert_eq!(by_priority.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn route_overrides_status_but_keeps_search() {
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let mut store = TaskStore::new(seed());
        store.set_filter(FilterUpdate {
            status: Some(StatusFilter::Active),
            search: Some("b".to_string()),
            ..FilterUpdate::default()
        });

        let completed = resolve(Route::Completed, &[]);
        let ids: Vec<u64> = store
            .visible(&completed, SortKey::Order, now)
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(store.filters().status, StatusFilter::Active);
    }

    #[tokio::test]
    async fn update_of_missing_id_leaves_store_untouched() {
        let gateway = MemoryGateway::new(seed());
        let mut store = TaskStore::default();
        store.load(&gateway).await.unwrap();
        let before = store.tasks().to_vec();

        let err = store
            .dispatch(
                &gateway,
                TaskCommand::Update {
                    id: 999,
                    patch: TaskPatch {
                        title: Some("ghost".to_string()),
                        ..TaskPatch::default()
                    },
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::NotFound { id: 999, .. }));
        assert_eq!(store.tasks(), before.as_slice());
    }

    #[tokio::test]
    async fn gateway_failure_keeps_local_state() {
        let mut store = TaskStore::new(seed());
        let before = store.tasks().to_vec();

        assert!(store.load(&Offline).await.is_err());
        assert!(store.dispatch(&Offline, TaskCommand::Delete(1)).await.is_err());
        assert!(
            store
                .dispatch(&Offline, TaskCommand::ToggleComplete(1))
                .await
                .is_err()
        );
        assert_eq!(store.tasks(), before.as_slice());
    }

    #[tokio::test]
    async fn created_tasks_go_to_the_front() {
        let gateway = MemoryGateway::new(seed());
        let mut store = TaskStore::new(seed());
        let outcome = store
            .dispatch(&gateway, TaskCommand::Create(TaskDraft::new("C", 1)))
            .await
            .unwrap();

        let CommandOutcome::Created(created) = outcome else {
            panic!("expected a created outcome");
        };
        assert_eq!(created.id, 3);
        assert_eq!(store.tasks()[0].id, 3);
        assert!(store.tasks()[0].order > store.tasks()[2].order);

        store.dispatch(&gateway, TaskCommand::Delete(3)).await.unwrap();
        assert!(store.find(3).is_none());
    }

    #[tokio::test]
    async fn overlapping_commands_are_last_write_wins() {
        let gateway = MemoryGateway::new(seed());
        let mut store = TaskStore::new(seed());

        let edit = TaskCommand::Update {
            id: 1,
            patch: TaskPatch {
                title: Some("A2".to_string()),
                ..TaskPatch::default()
            },
        };
        let (edited, toggled) = tokio::join!(
            edit.execute(&gateway),
            TaskCommand::ToggleComplete(1).execute(&gateway)
        );
        store.apply(edited.unwrap());
        store.apply(toggled.unwrap());

        let stored = store.find(1).unwrap();
        assert_eq!(stored, &gateway.get(1).await.unwrap());
        assert!(stored.completed);
        assert_eq!(stored.title, "A2");
    }

    #[tokio::test]
    async fn late_update_for_deleted_task_is_ignored() {
        let gateway = MemoryGateway::new(seed());
        let mut store = TaskStore::new(seed());

        let toggled = TaskCommand::ToggleComplete(1).execute(&gateway).await.unwrap();
        store.dispatch(&gateway, TaskCommand::Delete(1)).await.unwrap();
        store.apply(toggled);

        assert!(store.find(1).is_none());
        assert_eq!(store.tasks().len(), 1);
    }

    #[tokio::test]
    async fn category_store_keeps_display_order() {
        let gateway = MemoryCategoryGateway::new(vec![]);
        let mut categories = CategoryStore::default();
        for name in ["Work", "Home"] {
            categories
                .create(
                    &gateway,
                    CategoryDraft {
                        name: name.to_string(),
                        color: None,
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(categories.name_of(2), Some("Home"));

        categories.delete(&gateway, 1).await.unwrap();
        assert_eq!(categories.categories().len(), 1);

        let mut reloaded = CategoryStore::default();
        assert_eq!(reloaded.load(&gateway).await.unwrap(), 1);
        assert!(reloaded.find(1).is_none());
    }
}
