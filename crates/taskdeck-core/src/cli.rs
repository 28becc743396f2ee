use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::StatusFilter;
use crate::sort::SortKey;
use crate::task::Priority;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskdeck",
    version,
    about = "Taskdeck: categorized tasks with filtered views",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the tasks of a view, filtered and sorted.
    List(ListArgs),
    /// Create a task.
    Add(AddArgs),
    /// Change fields of an existing task.
    Edit(EditArgs),
    /// Flip a task between open and completed.
    Toggle { id: u64 },
    Delete { id: u64 },
    Info { id: u64 },
    /// List categories with their task counts.
    Categories,
    /// Counts per view, as a navigation sidebar shows them.
    Summary,
}

impl Default for Command {
    fn default() -> Self {
        Command::List(ListArgs::default())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Route to render: /, /completed, /overdue, /category/ID, /priority/LEVEL.
    #[arg(long)]
    pub view: Option<String>,

    #[arg(long, short = 's')]
    pub search: Option<String>,

    #[arg(long, short = 'c')]
    pub category: Option<u64>,

    #[arg(long, short = 'p', value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
    pub priority: Option<Priority>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<StatusFilter>()))]
    pub status: Option<StatusFilter>,

    #[arg(long, value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<SortKey>()))]
    pub sort: Option<SortKey>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long, short = 'c')]
    pub category: Option<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    #[arg(long, short = 'p', value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
    pub priority: Option<Priority>,

    /// Due date: today, tomorrow, friday, +3d, 2026-03-04, 2026-03-04T15:00 ...
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: u64,

    #[arg(long, short = 't')]
    pub title: Option<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    #[arg(long, short = 'c')]
    pub category: Option<String>,

    #[arg(long, short = 'p', value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<Priority>()))]
    pub priority: Option<Priority>,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    #[arg(long)]
    pub clear_due: bool,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
