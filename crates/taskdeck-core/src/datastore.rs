use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::{Category, Task};

/// Snapshot files backing the memory gateways between CLI runs.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub categories_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let categories_path = data_dir.join("categories.data");

        for path in [&tasks_path, &categories_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            categories = %categories_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            categories_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_categories(&self) -> anyhow::Result<Vec<Category>> {
        load_jsonl(&self.categories_path).context("failed to load categories.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut sorted = tasks.to_vec();
        sorted.sort_by_key(|t| t.id);
        save_jsonl_atomic(&self.tasks_path, &sorted).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, categories))]
    pub fn save_categories(&self, categories: &[Category]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.categories_path, categories)
            .context("failed to save categories.data")
    }

    /// Loads categories, writing the starter set first when the file is empty.
    #[tracing::instrument(skip(self))]
    pub fn load_categories_or_seed(&self) -> anyhow::Result<Vec<Category>> {
        let categories = self.load_categories()?;
        if !categories.is_empty() {
            return Ok(categories);
        }
        let seeded = default_categories();
        self.save_categories(&seeded)?;
        info!(count = seeded.len(), "seeded default categories");
        Ok(seeded)
    }
}

pub fn default_categories() -> Vec<Category> {
    [
        ("Personal", "#3B82F6"),
        ("Work", "#8B5CF6"),
        ("Shopping", "#10B981"),
        ("Health", "#EF4444"),
    ]
    .into_iter()
    .zip(1u64..)
    .map(|((name, color), id)| Category {
        id,
        name: name.to_string(),
        color: color.to_string(),
        order: id as u32,
    })
    .collect()
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{TimeZone, Utc};

    use super::DataStore;
    use crate::task::{Task, TaskDraft};

    #[test]
    fn tasks_survive_a_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let store = DataStore::open(temp.path()).unwrap();
        assert!(store.load_tasks().unwrap().is_empty());

        let now = Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap();
        let tasks = vec![
            Task::from_draft(TaskDraft::new("second", 1), 2, now, 20),
            Task::from_draft(TaskDraft::new("first", 1), 1, now, 10),
        ];
        store.save_tasks(&tasks).unwrap();

        let reopened = DataStore::open(temp.path()).unwrap();
        let loaded = reopened.load_tasks().unwrap();
        assert_eq!(loaded.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(loaded[1].title, "second");
    }

    #[test]
    fn empty_category_file_is_seeded_once() {
        let temp = tempfile::tempdir().unwrap();
        let store = DataStore::open(temp.path()).unwrap();

        let seeded = store.load_categories_or_seed().unwrap();
        let names: Vec<&str> = seeded.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Personal", "Work", "Shopping", "Health"]);
        assert_eq!(store.load_categories().unwrap(), seeded);
    }

    #[test]
    fn bad_line_reports_its_number() {
        let temp = tempfile::tempdir().unwrap();
        let store = DataStore::open(temp.path()).unwrap();
        fs::write(&store.tasks_path, "\nnot json\n").unwrap();

        let err = store.load_tasks().unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
