mod app;
mod config;
mod event;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use pnv::bridge::{ClientBridge, SessionStorage, SqliteClientState};
use pnv::cache::SqliteStore;
use pnv::lifecycle::{Controller, ControllerSettings};
use pnv::network::HttpNetwork;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pnv")]
#[command(about = "Offline cache and update controller for the Pera nai Vai tool site")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pnv/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Site origin, e.g. https://peranaivai.com
  #[arg(short, long)]
  origin: Option<String>,

  /// Keep the cache in memory only
  #[arg(long)]
  ephemeral: bool,
}

/// Log to a daily file next to the cache; the terminal belongs to the UI.
fn init_logging(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "pnv.log"));
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pnv=info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref(), args.origin.is_some())?;

  // Command line wins over the file
  if let Some(origin) = args.origin {
    config.origin = Some(origin);
  }
  if args.ephemeral {
    config.cache.ephemeral = true;
  }

  let cache_path = match &config.cache.path {
    Some(path) => path.clone(),
    None => SqliteStore::default_path()?,
  };
  let data_dir = cache_path
    .parent()
    .map(Path::to_path_buf)
    .unwrap_or_else(|| PathBuf::from("."));
  let _log_guard = init_logging(&data_dir.join("logs"))?;

  let origin = config.origin_url()?;
  tracing::info!(origin = %origin, ephemeral = config.cache.ephemeral, "Starting");

  let (store, local_state) = if config.cache.ephemeral {
    (SqliteStore::in_memory()?, SqliteClientState::in_memory()?)
  } else {
    (
      SqliteStore::open_at(&cache_path)?,
      SqliteClientState::open_at(&data_dir.join("state.db"))?,
    )
  };

  let settings = ControllerSettings::new(origin).with_descriptor_path(config.descriptor_path.clone());
  let controller = Controller::new(Arc::new(store), Arc::new(HttpNetwork::new()?), settings);
  if let Some(version) = controller.restore()? {
    tracing::info!(version = %version, "Serving from cache");
  }

  let bridge = ClientBridge::new(
    config.pwa.bridge_settings(),
    Arc::new(local_state),
    Arc::new(SessionStorage::new()),
    config.pwa.standalone,
  )?;

  // Initialize and run the app
  let mut app = app::App::new(controller, bridge)?;
  app.run().await?;

  Ok(())
}
