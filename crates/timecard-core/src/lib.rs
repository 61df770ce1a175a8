pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod duration;
pub mod error;
pub mod filter;
pub mod quantity;
pub mod record;
pub mod render;
pub mod summary;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting timecard CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;

  let tz = datetime::resolve_timezone(
    cfg.timezone.as_deref()
  );
  let today = datetime::today(tz);
  debug!(%today, ?tz, "resolved today");

  let data_dir = cfg
    .data_dir()
    .context(
      "failed to resolve data \
       directory"
    )?;
  let store =
    datastore::DataStore::open(
      &data_dir,
      cfg.type_table(),
      cfg.non_business_days.clone()
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let cache_dir = cfg
    .cache_dir()
    .context(
      "failed to resolve cache \
       directory"
    )?;
  let cache =
    datastore::Cache::open(&cache_dir)?;

  let renderer =
    render::Renderer::new(&cfg);
  let session = commands::Session {
    store:    &store,
    cache:    &cache,
    renderer: &renderer,
    profile:  cli.profile.as_deref(),
    today
  };

  commands::dispatch(
    &session,
    &mut cfg,
    cli.command
  )?;

  info!("done");
  Ok(())
}
