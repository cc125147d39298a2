pub mod blocking;
pub mod bridge;
pub mod config;
pub mod db;
pub mod focus;
pub mod screen_time;
pub mod settings;
pub mod signals;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::{io::BufReader, sync::mpsc};

use bridge::Bridge;
use config::RuntimeConfig;
use db::Database;
use focus::{FocusConfig, FocusController, StateBroadcaster};
use screen_time::{ScreenTimeContext, ScreenTimeController};
use settings::SettingsStore;
use signals::{SignalAdapter, TabRegistry};

/// Long-lived services shared by the bridge and the background loops.
pub struct AppState {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub tabs: Arc<TabRegistry>,
    pub focus: FocusController,
}

impl AppState {
    pub fn open(config: &RuntimeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data directory {}", config.data_dir.display())
        })?;

        let settings = Arc::new(SettingsStore::new(config.settings_path())?);
        let db = Database::new(config.database_path())?;
        let tabs = Arc::new(TabRegistry::new());
        let focus = FocusController::new(
            FocusConfig::default(),
            settings.clone(),
            StateBroadcaster::new(Some(db.clone())),
            tabs.clone(),
        );

        Ok(Self {
            db,
            settings,
            tabs,
            focus,
        })
    }
}

pub fn run() -> Result<()> {
    let config = RuntimeConfig::from_env();

    // stdout carries the protocol, so logs stay on stderr. RUST_LOG wins.
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    info!("Kendra Bindu starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("kendra-bindu")
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: RuntimeConfig) -> Result<()> {
    let state = AppState::open(&config)?;
    info!("Using local storage at {}", state.db.path().display());

    state.focus.start_tickers().await;

    let (reminder_tx, reminder_rx) = mpsc::unbounded_channel();
    let mut screen_time = ScreenTimeController::new();
    screen_time
        .start(ScreenTimeContext {
            db: state.db.clone(),
            focus: state.focus.clone(),
            settings: state.settings.clone(),
            reminders: reminder_tx,
        })
        .await?;

    let result = {
        let bridge = Bridge::new(
            state.focus.clone(),
            SignalAdapter::new(state.tabs.clone(), state.settings.clone()),
            state.settings.clone(),
            &screen_time,
        );
        bridge
            .run(
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                reminder_rx,
            )
            .await
    };

    state.focus.stop_tickers().await;
    if let Err(err) = screen_time.stop().await {
        warn!("screen time shutdown failed: {err:#}");
    }

    info!("Kendra Bindu stopped");
    result
}
