mod authority;
mod blocklist;
mod commands;
mod db;
mod error;
mod events;
mod host;
mod observer;
mod settings;
mod storage;
mod timer;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

pub use authority::{Collaborators, StateAuthority};
pub use blocklist::{compile_rules, normalize_site, CompiledRule, RuleSink, RuleUpdate};
pub use commands::{CommandRouter, Request, Response};
pub use db::Database;
pub use error::CommandError;
pub use events::{Event, EventHub, ExpiryNotifier};
pub use host::run_host;
pub use observer::{parse_custom_minutes, ObserverSession, TimerDisplay};
pub use settings::Settings;
pub use storage::{MemoryStore, RecordKey, RecordStore};
pub use timer::TimerState;

pub fn run() -> Result<()> {
    // Logs go to stderr; stdout is reserved for protocol frames.
    let default_level = if settings::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    info!("BlockFocus host starting up...");

    // One thread is enough: the authority handles a single command or tick at a time.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(serve())
}

async fn serve() -> Result<()> {
    let data_dir = settings::data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings_path = data_dir.join(settings::SETTINGS_FILE);
    let settings = Settings::load(&settings_path)?;
    if !settings_path.exists() {
        if let Err(err) = settings.persist(&settings_path) {
            warn!("Could not write default settings: {err:#}");
        }
    }

    let database = Database::new(data_dir.join(settings::DATABASE_FILE))?;
    let events = EventHub::new(settings.event_capacity);
    // Subscribed before init so the startup rule replacement and the resumed
    // timer state reach the extension.
    let host_events = events.subscribe();
    let authority =
        StateAuthority::init(Collaborators::over_hub(Arc::new(database), events), settings).await;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_host(
        CommandRouter::new(authority),
        host_events,
        stdin,
        tokio::io::stdout(),
        shutdown,
    )
    .await?;

    info!("BlockFocus host stopped");
    Ok(())
}
