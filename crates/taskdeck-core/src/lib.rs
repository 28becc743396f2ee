pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod form;
pub mod gateway;
pub mod render;
pub mod sort;
pub mod store;
pub mod task;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::commands::Effect;
use crate::config::Backend;
use crate::gateway::{
  MemoryCategoryGateway,
  MemoryGateway,
  RemoteCategoryGateway,
  RemoteGateway
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskdeck CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let command =
    cli.command.unwrap_or_default();

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  match cfg.backend()? {
    | Backend::Memory => {
      let data_dir =
        config::resolve_data_dir(
          &cfg,
          cli.data.as_deref()
        )
        .context(
          "failed to resolve data \
           directory"
        )?;
      let store =
        datastore::DataStore::open(
          &data_dir
        )
        .with_context(|| {
          format!(
            "failed to open datastore \
             at {}",
            data_dir.display()
          )
        })?;

      let latency = cfg.memory_latency()?;
      let tasks = MemoryGateway::new(
        store.load_tasks()?
      )
      .with_latency(latency);
      let categories =
        MemoryCategoryGateway::new(
          store.load_categories_or_seed()?
        )
        .with_latency(latency);

      let effect = runtime.block_on(
        commands::dispatch(
          &tasks,
          &categories,
          &cfg,
          &mut renderer,
          command
        )
      )?;

      if effect == Effect::Mutated {
        store
          .save_tasks(&tasks.snapshot())?;
        store.save_categories(
          &categories.snapshot()
        )?;
      }
    }
    | Backend::Remote => {
      let settings =
        cfg.remote_settings()?;
      info!(url = %settings.base_url, "using remote backend");
      let tasks =
        RemoteGateway::new(&settings)
          .context(
            "failed to build remote \
             client"
          )?;
      let categories =
        RemoteCategoryGateway::new(
          &settings
        )
        .context(
          "failed to build remote \
           client"
        )?;

      runtime.block_on(
        commands::dispatch(
          &tasks,
          &categories,
          &cfg,
          &mut renderer,
          command
        )
      )?;
    }
  }

  info!("done");
  Ok(())
}
