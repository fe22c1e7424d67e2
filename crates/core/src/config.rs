//! Application configuration backed by a TOML file and `TYCOON_*` variables.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{BuildableItem, Catalog},
    matcher::MismatchPolicy,
    save::SaveManager,
    session::SessionOptions,
};

/// Directory under the user's config directory holding `config.toml`.
pub const CONFIG_DIR: &str = "typing-tycoon";

const DEFAULT_CONFIG: &str = r#"# Typing Tycoon configuration.
# Every key may also be set through TYCOON_<KEY> environment variables.

# Save profile to play.
profile = "default"

# Directory for save files. Defaults to <config dir>/typing-tycoon/saves.
# save_root = "/path/to/saves"

# Balance of a brand new game.
starting_currency = 100

# What a wrong letter does: "keep_attempt" or "abort_attempt".
mismatch_policy = "keep_attempt"

# Credit income for the time spent away since the last save.
offline_earnings = true

# Milliseconds between income ticks.
tick_rate_ms = 100

# Override the buildings on offer. Order matters when words share a first letter.
# [[catalog]]
# id = "cage"
# word = "CAGE"
# cost = 100
# income_per_tick = 1
"#;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Save profile name.
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Directory for save files.
    #[serde(default)]
    pub save_root: Option<PathBuf>,
    /// Balance of a new game.
    #[serde(default = "default_starting_currency")]
    pub starting_currency: f64,
    /// Behaviour on a wrong letter.
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
    /// Whether time away from the game earns income.
    #[serde(default = "default_true")]
    pub offline_earnings: bool,
    /// Milliseconds between income ticks.
    #[serde(default = "default_tick_rate_ms")]
    pub tick_rate_ms: u64,
    /// Catalog override; empty means the built-in catalog.
    #[serde(default)]
    pub catalog: Vec<BuildableItem>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            save_root: None,
            starting_currency: default_starting_currency(),
            mismatch_policy: MismatchPolicy::default(),
            offline_earnings: true,
            tick_rate_ms: default_tick_rate_ms(),
            catalog: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from the default config file and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (optional) layered with the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("TYCOON").try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    /// Validated catalog, falling back to the built-in one.
    pub fn catalog(&self) -> Result<Catalog> {
        if self.catalog.is_empty() {
            return Ok(Catalog::default_catalog());
        }
        Catalog::new(self.catalog.clone()).context("invalid catalog in configuration")
    }

    /// Save directory, falling back to the default location.
    pub fn save_root(&self) -> PathBuf {
        self.save_root
            .clone()
            .unwrap_or_else(SaveManager::default_root)
    }

    /// Interval between income ticks, at least one millisecond.
    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.tick_rate_ms.max(1))
    }

    /// Gameplay options for a new session.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            starting_currency: self.starting_currency,
            mismatch_policy: self.mismatch_policy,
            offline_earnings: self.offline_earnings,
        }
    }
}

/// Location of the user's `config.toml`.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join("config.toml")
}

/// Write a commented default configuration if none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_starting_currency() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

fn default_tick_rate_ms() -> u64 {
    100
}
