mod app;

use std::{
    fs::{self, OpenOptions},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use tycoon_core::{
    config::{self, AppConfig},
    BackgroundSaver, GameSession, ProfileStore, SaveManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    let catalog = Arc::new(config.catalog()?);

    let manager = SaveManager::new(config.save_root());
    let other_profiles = other_profiles(&manager, &config.profile);
    let store = ProfileStore::new(manager, config.profile.clone());
    let saver = BackgroundSaver::spawn(store);
    let (session, report) =
        GameSession::start(catalog, config.session_options(), saver, Utc::now())?;

    let mut app = app::TycoonApp::new(session, report, config.tick_rate(), &other_profiles);
    let result = app.run().await;

    let session = app.into_session();
    session.persist_now();
    session.into_persistence().shutdown().await;
    result
}

/// Profiles with a save on disk other than `current`, most recent first.
fn other_profiles(manager: &SaveManager, current: &str) -> Vec<String> {
    match manager.entries() {
        Ok(entries) => {
            info!(saves = entries.len(), "Found saved games");
            entries
                .into_iter()
                .map(|entry| entry.profile)
                .filter(|profile| profile != current)
                .collect()
        }
        Err(err) => {
            warn!(?err, "Failed to list saved games");
            Vec::new()
        }
    }
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("typing-tycoon.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::from_default_env();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
