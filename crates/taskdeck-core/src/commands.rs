use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::{AddArgs, Command, EditArgs, ListArgs};
use crate::config::Config;
use crate::error::TaskError;
use crate::filter::FilterUpdate;
use crate::form::TaskForm;
use crate::gateway::{CategoryGateway, TaskGateway};
use crate::render::Renderer;
use crate::store::{CategoryStore, CommandOutcome, TaskCommand, TaskStore};
use crate::view::{Route, ViewContext, resolve, sidebar_counts};

/// Whether a command wrote through the gateway, so the caller knows to
/// persist a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ReadOnly,
    Mutated,
}

#[instrument(skip_all)]
pub async fn dispatch<T, C>(
    tasks: &T,
    categories: &C,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<Effect>
where
    T: TaskGateway,
    C: CategoryGateway,
{
    let now = Utc::now();
    debug!(?command, "dispatching command");

    match command {
        Command::List(args) => cmd_list(tasks, categories, cfg, renderer, args, now).await,
        Command::Add(args) => cmd_add(tasks, categories, renderer, args, now).await,
        Command::Edit(args) => cmd_edit(tasks, renderer, args, now).await,
        Command::Toggle { id } => cmd_toggle(tasks, id).await,
        Command::Delete { id } => cmd_delete(tasks, id).await,
        Command::Info { id } => cmd_info(tasks, categories, renderer, id, now).await,
        Command::Categories => cmd_categories(tasks, categories, renderer, now).await,
        Command::Summary => cmd_summary(tasks, categories, renderer, now).await,
    }
}

async fn load_both<T, C>(tasks: &T, categories: &C) -> anyhow::Result<(TaskStore, CategoryStore)>
where
    T: TaskGateway,
    C: CategoryGateway,
{
    let mut task_store = TaskStore::default();
    let mut category_store = CategoryStore::default();
    tokio::try_join!(task_store.load(tasks), category_store.load(categories))
        .context("failed to load tasks and categories")?;
    Ok((task_store, category_store))
}

#[instrument(skip(tasks, categories, cfg, renderer, now))]
async fn cmd_list<T, C>(
    tasks: &T,
    categories: &C,
    cfg: &Config,
    renderer: &mut Renderer,
    args: ListArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<Effect>
where
    T: TaskGateway,
    C: CategoryGateway,
{
    info!("command list");

    let (mut task_store, category_store) = load_both(tasks, categories).await?;

    task_store.set_filter(FilterUpdate {
        category: args.category.map(Some),
        priority: args.priority.map(Some),
        status: args.status,
        search: args.search,
    });

    let view = match args.view.as_deref() {
        Some(path) => {
            let route = Route::parse(path);
            if route == Route::Unknown {
                warn!(path, "unknown view, showing all tasks");
            }
            resolve(route, category_store.categories())
        }
        None => ViewContext::unrouted(),
    };

    let key = match args.sort {
        Some(key) => key,
        None => cfg.default_sort()?,
    };

    let visible = task_store.visible(&view, key, now);
    let empty_message = view.empty_message(&task_store.filters().search);
    debug!(
        total = task_store.tasks().len(),
        visible = visible.len(),
        sort = %key,
        "list computed"
    );

    renderer.print_view(&view, &visible, &category_store, &empty_message, now)?;
    Ok(Effect::ReadOnly)
}

#[instrument(skip(tasks, categories, renderer, args, now))]
async fn cmd_add<T, C>(
    tasks: &T,
    categories: &C,
    renderer: &mut Renderer,
    args: AddArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<Effect>
where
    T: TaskGateway,
    C: CategoryGateway,
{
    info!("command add");

    let form = TaskForm {
        title: args.title.join(" "),
        description: args.description.unwrap_or_default(),
        category_id: args.category.unwrap_or_default(),
        priority: args.priority,
        due_date: args.due.unwrap_or_default(),
    };
    let draft = match form.validate(now) {
        Ok(draft) => draft,
        Err(err) => return report_invalid(renderer, err),
    };

    match categories.get(draft.category_id).await {
        Ok(_) => {}
        Err(err) if err.is_not_found() => {
            warn!(category = draft.category_id, "task references an unknown category");
        }
        Err(err) => return Err(err).context("failed to look up category"),
    }

    let mut store = TaskStore::default();
    let outcome = store
        .dispatch(tasks, TaskCommand::Create(draft))
        .await
        .context("failed to create task")?;
    if let CommandOutcome::Created(task) = outcome {
        println!("Created task {}.", task.id);
    }
    Ok(Effect::Mutated)
}

#[instrument(skip(tasks, renderer, args, now), fields(id = args.id))]
async fn cmd_edit<T>(
    tasks: &T,
    renderer: &mut Renderer,
    args: EditArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<Effect>
where
    T: TaskGateway,
{
    info!("command edit");

    let current = tasks
        .get(args.id)
        .await
        .with_context(|| format!("failed to load task {}", args.id))?;

    let mut form = TaskForm::from_task(&current);
    if let Some(title) = args.title {
        form.title = title;
    }
    if let Some(description) = args.description {
        form.description = description;
    }
    if let Some(category) = args.category {
        form.category_id = category;
    }
    if let Some(priority) = args.priority {
        form.priority = Some(priority);
    }
    if let Some(due) = args.due {
        form.due_date = due;
    }
    if args.clear_due {
        form.due_date.clear();
    }

    let patch = match form.to_patch(now) {
        Ok(patch) => patch,
        Err(err) => return report_invalid(renderer, err),
    };

    let mut store = TaskStore::new(vec![current]);
    store
        .dispatch(tasks, TaskCommand::Update { id: args.id, patch })
        .await
        .with_context(|| format!("failed to modify task {}", args.id))?;
    println!("Modified task {}.", args.id);
    Ok(Effect::Mutated)
}

#[instrument(skip(tasks))]
async fn cmd_toggle<T>(tasks: &T, id: u64) -> anyhow::Result<Effect>
where
    T: TaskGateway,
{
    info!("command toggle");

    let mut store = TaskStore::default();
    let outcome = store
        .dispatch(tasks, TaskCommand::ToggleComplete(id))
        .await
        .with_context(|| format!("failed to toggle task {id}"))?;
    if let CommandOutcome::Updated(task) = outcome {
        let verb = if task.completed { "Completed" } else { "Reopened" };
        println!("{verb} task {} '{}'.", task.id, task.title);
    }
    Ok(Effect::Mutated)
}

#[instrument(skip(tasks))]
async fn cmd_delete<T>(tasks: &T, id: u64) -> anyhow::Result<Effect>
where
    T: TaskGateway,
{
    info!("command delete");

    let mut store = TaskStore::default();
    store
        .dispatch(tasks, TaskCommand::Delete(id))
        .await
        .with_context(|| format!("failed to delete task {id}"))?;
    println!("Deleted task {id}.");
    Ok(Effect::Mutated)
}

#[instrument(skip(tasks, categories, renderer, now))]
async fn cmd_info<T, C>(
    tasks: &T,
    categories: &C,
    renderer: &mut Renderer,
    id: u64,
    now: DateTime<Utc>,
) -> anyhow::Result<Effect>
where
    T: TaskGateway,
    C: CategoryGateway,
{
    info!("command info");

    let mut category_store = CategoryStore::default();
    let (task, _) = tokio::try_join!(tasks.get(id), category_store.load(categories))
        .with_context(|| format!("failed to load task {id}"))?;
    renderer.print_task_info(&task, &category_store, now)?;
    Ok(Effect::ReadOnly)
}

#[instrument(skip_all)]
async fn cmd_categories<T, C>(
    tasks: &T,
    categories: &C,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<Effect>
where
    T: TaskGateway,
    C: CategoryGateway,
{
    info!("command categories");

    let (task_store, category_store) = load_both(tasks, categories).await?;
    let counts = sidebar_counts(task_store.tasks(), category_store.categories(), now);
    renderer.print_categories(&counts)?;
    Ok(Effect::ReadOnly)
}

#[instrument(skip_all)]
async fn cmd_summary<T, C>(
    tasks: &T,
    categories: &C,
    renderer: &mut Renderer,
    now: DateTime<Utc>,
) -> anyhow::Result<Effect>
where
    T: TaskGateway,
    C: CategoryGateway,
{
    info!("command summary");

    let (task_store, category_store) = load_both(tasks, categories).await?;
    let counts = sidebar_counts(task_store.tasks(), category_store.categories(), now);
    renderer.print_summary(&counts)?;
    Ok(Effect::ReadOnly)
}

fn report_invalid(renderer: &mut Renderer, err: TaskError) -> anyhow::Result<Effect> {
    match err {
        TaskError::Validation(errors) => {
            renderer.print_validation(&errors)?;
            Err(anyhow!("task not saved: {} invalid field(s)", errors.iter().count()))
        }
        other => Err(other.into()),
    }
}
