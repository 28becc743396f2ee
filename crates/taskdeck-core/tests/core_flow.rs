use chrono::{Duration, Utc};
use taskdeck_core::datastore::DataStore;
use taskdeck_core::filter::{FilterUpdate, StatusFilter};
use taskdeck_core::form::TaskForm;
use taskdeck_core::gateway::{MemoryCategoryGateway, MemoryGateway, TaskGateway};
use taskdeck_core::sort::SortKey;
use taskdeck_core::store::{CategoryStore, TaskCommand, TaskStore};
use taskdeck_core::task::Priority;
use taskdeck_core::view::{Route, ViewContext, resolve, sidebar_counts};
use tempfile::tempdir;

#[tokio::test]
async fn snapshot_gateway_store_and_views() {
    let temp = tempdir().expect("tempdir");
    let datastore = DataStore::open(temp.path()).expect("open datastore");
    let now = Utc::now();

    let tasks = MemoryGateway::new(datastore.load_tasks().expect("load tasks"));
    let categories = MemoryCategoryGateway::new(
        datastore
            .load_categories_or_seed()
            .expect("seed categories"),
    );

    let mut category_store = CategoryStore::default();
    category_store.load(&categories).await.expect("load categories");
    let work = category_store
        .categories()
        .iter()
        .find(|c| c.name == "Work")
        .expect("work category")
        .id;

    let mut store = TaskStore::default();
    for (title, priority, due) in [
        ("Ship release notes", Priority::High, "-2h"),
        ("Book flights", Priority::Low, "+3d"),
        ("Review budget", Priority::Medium, ""),
    ] {
        let form = TaskForm {
            title: title.to_string(),
            category_id: work.to_string(),
            priority: Some(priority),
            due_date: due.to_string(),
            ..TaskForm::default()
        };
        let draft = form.validate(now).expect("valid form");
        store
            .dispatch(&tasks, TaskCommand::Create(draft))
            .await
            .expect("create task");
    }
    assert_eq!(store.tasks()[0].title, "Review budget");

    let review = store.tasks()[0].id;
    store
        .dispatch(&tasks, TaskCommand::ToggleComplete(review))
        .await
        .expect("toggle");

    datastore.save_tasks(&tasks.snapshot()).expect("save snapshot");

    // A fresh session sees the same records.
    let reopened = MemoryGateway::new(datastore.load_tasks().expect("reload"));
    let mut fresh = TaskStore::default();
    fresh.load(&reopened).await.expect("load");
    assert_eq!(fresh.tasks().len(), 3);

    let later = now + Duration::minutes(1);
    let overdue = resolve(Route::parse("/overdue"), category_store.categories());
    let titles: Vec<String> = fresh
        .visible(&overdue, SortKey::DueDate, later)
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(titles, vec!["Ship release notes".to_string()]);

    let by_category = resolve(
        Route::parse(&format!("/category/{work}")),
        category_store.categories(),
    );
    assert_eq!(by_category.title, "Work Tasks");
    let ordered: Vec<Priority> = fresh
        .visible(&by_category, SortKey::Priority, later)
        .iter()
        .map(|t| t.priority)
        .collect();
    assert_eq!(ordered, vec![Priority::High, Priority::Medium, Priority::Low]);

    // The root route pins status to all; unrouted lists honour the user's status.
    fresh.set_filter(FilterUpdate {
        status: Some(StatusFilter::Completed),
        search: Some("FLIGHTS".to_string()),
        ..FilterUpdate::default()
    });
    let all = resolve(Route::All, category_store.categories());
    assert_eq!(fresh.visible(&all, SortKey::Order, later).len(), 1);
    let unrouted = ViewContext::unrouted();
    assert!(fresh.visible(&unrouted, SortKey::Order, later).is_empty());

    fresh.set_filter(FilterUpdate {
        search: Some("budget".to_string()),
        ..FilterUpdate::default()
    });
    let completed = fresh.visible(&unrouted, SortKey::Order, later);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, review);

    fresh.set_filter(FilterUpdate {
        search: Some("nothing like this".to_string()),
        ..FilterUpdate::default()
    });
    assert!(fresh.visible(&unrouted, SortKey::Order, later).is_empty());
    assert_eq!(
        unrouted.empty_message(&fresh.filters().search),
        "No tasks found matching \"nothing like this\"."
    );

    let counts = sidebar_counts(fresh.tasks(), category_store.categories(), later);
    assert_eq!((counts.all, counts.completed, counts.overdue), (3, 1, 1));

    let err = reopened.update(999, Default::default()).await.unwrap_err();
    assert!(err.is_not_found());
}
