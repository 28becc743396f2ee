use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{DueStatus, due_date_status, format_due_date, relative_time};
use crate::error::ValidationErrors;
use crate::store::CategoryStore;
use crate::task::{Priority, Task};
use crate::view::{SidebarCounts, ViewContext};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(count = tasks.len()))]
    pub fn print_view(
        &mut self,
        view: &ViewContext,
        tasks: &[Task],
        categories: &CategoryStore,
        empty_message: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let out = io::stdout().lock();
        self.write_view(out, view, tasks, categories, empty_message, now)
    }

    pub fn write_view<W: Write>(
        &self,
        mut out: W,
        view: &ViewContext,
        tasks: &[Task],
        categories: &CategoryStore,
        empty_message: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&view.title, "1"))?;
        writeln!(out, "{}", view.description)?;
        writeln!(out)?;

        if tasks.is_empty() {
            writeln!(out, "{empty_message}")?;
            return Ok(());
        }

        let headers = ["ID", "✓", "Pri", "Due", "Category", "Title"]
            .map(str::to_string)
            .to_vec();

        let rows = tasks
            .iter()
            .map(|task| {
                let done = (if task.completed { "✓" } else { " " }).to_string();
                let due = task
                    .due_date
                    .map(|due| {
                        let label = format_due_date(due, now);
                        match due_date_status(Some(due), now) {
                            DueStatus::Overdue if !task.completed => self.paint(&label, "31"),
                            DueStatus::Today => self.paint(&label, "33"),
                            _ => label,
                        }
                    })
                    .unwrap_or_default();
                let category = categories
                    .name_of(task.category_id)
                    .unwrap_or("-")
                    .to_string();
                vec![
                    self.paint(&task.id.to_string(), "33"),
                    done,
                    self.paint_priority(task.priority),
                    due,
                    category,
                    task.title.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{} task(s)", tasks.len())?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(id = task.id))]
    pub fn print_task_info(
        &mut self,
        task: &Task,
        categories: &CategoryStore,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        writeln!(
            out,
            "category    {}",
            categories.name_of(task.category_id).unwrap_or("-")
        )?;
        writeln!(out, "priority    {}", task.priority.label())?;
        writeln!(
            out,
            "status      {}",
            if task.completed { "completed" } else { "active" }
        )?;
        if let Some(due) = task.due_date {
            writeln!(
                out,
                "due         {} ({}, {})",
                format_due_date(due, now),
                relative_time(due, now),
                due_date_status(Some(due), now).as_str()
            )?;
        }
        writeln!(
            out,
            "created     {} ({})",
            task.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
            relative_time(task.created_at, now)
        )?;
        writeln!(out, "order       {}", task.order)?;

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_categories(&mut self, counts: &SidebarCounts) -> anyhow::Result<()> {
        let headers = ["ID", "Name", "Color", "Tasks"].map(str::to_string).to_vec();
        let rows = counts
            .by_category
            .iter()
            .map(|cat| {
                vec![
                    cat.id.to_string(),
                    cat.name.clone(),
                    cat.color.clone(),
                    cat.count.to_string(),
                ]
            })
            .collect();
        write_table(io::stdout().lock(), headers, rows)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_summary(&mut self, counts: &SidebarCounts) -> anyhow::Result<()> {
        self.write_summary(io::stdout().lock(), counts)
    }

    pub fn write_summary<W: Write>(&self, mut out: W, counts: &SidebarCounts) -> anyhow::Result<()> {
        writeln!(out, "{:<16}{}", "All Tasks", counts.all)?;
        writeln!(out, "{:<16}{}", "Completed", counts.completed)?;
        writeln!(out, "{:<16}{}", "Overdue", counts.overdue)?;
        writeln!(out)?;
        for (priority, count) in &counts.by_priority {
            writeln!(out, "{:<16}{count}", format!("{} Priority", priority.label()))?;
        }
        writeln!(out)?;
        for cat in &counts.by_category {
            writeln!(out, "{:<16}{}", cat.name, cat.count)?;
        }
        Ok(())
    }

    pub fn print_validation(&mut self, errors: &ValidationErrors) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        for (field, message) in errors.iter() {
            writeln!(err, "{}: {message}", field.as_str())?;
        }
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::High => "31",
            Priority::Medium => "33",
            Priority::Low => "32",
        };
        self.paint(priority.label(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        let padding = widths[idx].saturating_sub(UnicodeWidthStr::width(header.as_str()));
        write!(writer, "{header}{} ", " ".repeat(padding))?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
