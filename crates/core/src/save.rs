//! Save-game persistence.
//!
//! The session talks to a [`Persistence`] implementation. `persist` is
//! best-effort: the in-memory ledger stays authoritative and a failed write is
//! only logged.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::ledger::EconomySnapshot;

/// Directory under the user's config directory used for save files.
pub const DEFAULT_SAVE_DIR: &str = "typing-tycoon/saves";

/// Economy state handed to and returned from persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    /// Balance at the time of saving.
    pub currency: f64,
    /// Owned buildings keyed by item id.
    #[serde(default)]
    pub owned: BTreeMap<String, u64>,
    /// When the state was captured.
    pub saved_at: DateTime<Utc>,
}

impl SaveState {
    /// Capture `snapshot` at `saved_at`.
    pub fn from_snapshot(snapshot: EconomySnapshot, saved_at: DateTime<Utc>) -> Self {
        Self {
            currency: snapshot.currency,
            owned: snapshot.owned_counts,
            saved_at,
        }
    }

    /// Economy part of the state.
    pub fn snapshot(&self) -> EconomySnapshot {
        EconomySnapshot {
            currency: self.currency,
            owned_counts: self.owned.clone(),
        }
    }
}

/// Storage collaborator used by a game session.
pub trait Persistence {
    /// State to resume from, or `None` for a fresh game.
    fn load_initial_state(&self) -> Result<Option<SaveState>>;

    /// Store `state`. Must not block gameplay and must not fail loudly.
    fn persist(&self, state: SaveState);
}

/// Metadata describing a save file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEntry {
    /// Absolute path to the save file.
    pub path: PathBuf,
    /// Profile the save belongs to.
    pub profile: String,
    /// Timestamp of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Serialized representation of a save file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePayload {
    profile: String,
    #[serde(flatten)]
    state: SaveState,
}

impl SavePayload {
    /// Profile name stored in the file.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Borrow the stored state.
    pub fn state(&self) -> &SaveState {
        &self.state
    }

    /// Consume the payload and return the stored state.
    pub fn into_state(self) -> SaveState {
        self.state
    }
}

/// Reads and writes one JSON file per profile.
#[derive(Debug, Clone)]
pub struct SaveManager {
    root: PathBuf,
}

impl SaveManager {
    /// Create a manager rooted at the provided directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location under the user's config directory.
    pub fn default_root() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_SAVE_DIR)
    }

    /// Path of the save file for `profile`.
    pub fn path_for(&self, profile: &str) -> PathBuf {
        self.root
            .join(format!("{}.json", sanitize_component(profile)))
    }

    /// Return all known saves sorted by timestamp (most recent first).
    pub fn entries(&self) -> Result<Vec<SaveEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root).context("failed to read save directory")? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.path().extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match read_payload(entry.path()) {
                Ok(payload) => entries.push(SaveEntry {
                    path: entry.path(),
                    profile: payload.profile,
                    updated_at: payload.state.saved_at,
                }),
                Err(err) => {
                    warn!("Failed to read save {:?}: {err}", entry.path());
                }
            }
        }

        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(entries)
    }

    /// Load the save for `profile`, returning `None` when it does not exist.
    pub fn load(&self, profile: &str) -> Result<Option<SavePayload>> {
        let path = self.path_for(profile);
        if !path.exists() {
            return Ok(None);
        }
        read_payload(&path).map(Some)
    }

    /// Rename the save for `profile` out of the way so it is neither loaded
    /// nor overwritten. Returns the new path.
    pub fn quarantine(&self, profile: &str) -> Result<PathBuf> {
        let path = self.path_for(profile);
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let aside = path.with_extension(format!("json.corrupt-{stamp}"));
        fs::rename(&path, &aside)
            .with_context(|| format!("failed to move {} aside", path.display()))?;
        Ok(aside)
    }

    /// Write `state` for `profile`, replacing any previous save.
    pub fn write(&self, profile: &str, state: &SaveState) -> Result<SaveEntry> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;

        let payload = SavePayload {
            profile: profile.to_string(),
            state: state.clone(),
        };
        let path = self.path_for(profile);
        let serialised = serde_json::to_vec_pretty(&payload)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serialised)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;

        Ok(SaveEntry {
            path,
            profile: payload.profile,
            updated_at: payload.state.saved_at,
        })
    }
}

fn read_payload(path: impl AsRef<Path>) -> Result<SavePayload> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let payload = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(payload)
}

fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_') {
            result.push(ch);
        }
    }
    if result.is_empty() {
        "save".to_string()
    } else {
        result
    }
}

/// Synchronous file persistence for a single profile.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    manager: SaveManager,
    profile: String,
}

impl ProfileStore {
    /// Store saves for `profile` through `manager`.
    pub fn new(manager: SaveManager, profile: impl Into<String>) -> Self {
        Self {
            manager,
            profile: profile.into(),
        }
    }

    /// Profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Write `state`, surfacing any error.
    pub fn write(&self, state: &SaveState) -> Result<SaveEntry> {
        self.manager.write(&self.profile, state)
    }
}

impl Persistence for ProfileStore {
    /// A save that cannot be read is moved aside and the game starts fresh.
    fn load_initial_state(&self) -> Result<Option<SaveState>> {
        match self.manager.load(&self.profile) {
            Ok(payload) => Ok(payload.map(SavePayload::into_state)),
            Err(err) => {
                let aside = self.manager.quarantine(&self.profile)?;
                warn!(
                    profile = %self.profile,
                    moved_to = %aside.display(),
                    "Unreadable save set aside, starting fresh: {err:#}"
                );
                Ok(None)
            }
        }
    }

    fn persist(&self, state: SaveState) {
        match self.write(&state) {
            Ok(entry) => debug!(path = %entry.path.display(), "Progress saved"),
            Err(err) => warn!(profile = %self.profile, ?err, "Failed to persist progress"),
        }
    }
}

/// In-process store, used when saving is disabled and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    initial: Option<SaveState>,
    writes: Arc<Mutex<Vec<SaveState>>>,
}

impl MemoryStore {
    /// Empty store; the session starts fresh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that resumes from `state`.
    pub fn with_state(state: SaveState) -> Self {
        Self {
            initial: Some(state),
            writes: Arc::default(),
        }
    }

    /// Every state persisted so far, oldest first.
    pub fn writes(&self) -> Vec<SaveState> {
        self.writes.lock().clone()
    }

    /// Most recently persisted state.
    pub fn last_write(&self) -> Option<SaveState> {
        self.writes.lock().last().cloned()
    }
}

impl Persistence for MemoryStore {
    fn load_initial_state(&self) -> Result<Option<SaveState>> {
        Ok(self.initial.clone())
    }

    fn persist(&self, state: SaveState) {
        self.writes.lock().push(state);
    }
}

/// Non-blocking wrapper that hands states to a background writer task.
///
/// States queued while a write is in flight are coalesced so only the newest
/// one reaches `store`. Must be created from within a tokio runtime.
#[derive(Debug)]
pub struct BackgroundSaver<S> {
    store: S,
    sender: mpsc::UnboundedSender<SaveState>,
    worker: JoinHandle<()>,
}

impl<S> BackgroundSaver<S>
where
    S: Persistence + Clone + Send + 'static,
{
    /// Spawn the writer task for `store`.
    pub fn spawn(store: S) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(write_loop(store.clone(), receiver));
        Self {
            store,
            sender,
            worker,
        }
    }

    /// Stop accepting states and wait for pending writes to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(err) = self.worker.await {
            warn!(?err, "Save writer task ended abnormally");
        }
    }
}

impl<S: Persistence> Persistence for BackgroundSaver<S> {
    fn load_initial_state(&self) -> Result<Option<SaveState>> {
        self.store.load_initial_state()
    }

    fn persist(&self, state: SaveState) {
        if self.sender.send(state).is_err() {
            warn!("Save writer is gone; progress not persisted");
        }
    }
}

async fn write_loop<S>(store: S, mut receiver: mpsc::UnboundedReceiver<SaveState>)
where
    S: Persistence + Clone + Send + 'static,
{
    while let Some(mut state) = receiver.recv().await {
        let mut skipped = 0usize;
        while let Ok(newer) = receiver.try_recv() {
            state = newer;
            skipped += 1;
        }
        if skipped > 0 {
            debug!(skipped, "Coalesced queued saves");
        }
        let store = store.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || store.persist(state)).await {
            warn!(?err, "Save write task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn sample_state(currency: f64, cages: u64) -> SaveState {
        SaveState {
            currency,
            owned: BTreeMap::from([("cage".to_string(), cages)]),
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn save_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let manager = SaveManager::new(dir.path());
        assert!(manager.load("default")?.is_none());

        let state = sample_state(12.5, 2);
        let entry = manager.write("default", &state)?;
        assert!(entry.path.exists());
        assert!(!entry.path.with_extension("json.tmp").exists());

        let payload = manager.load("default")?.expect("expected save");
        assert_eq!(payload.profile(), "default");
        assert_eq!(payload.state(), &state);

        let mut later = sample_state(40.0, 3);
        later.saved_at = state.saved_at + Duration::seconds(5);
        manager.write("default", &later)?;
        assert_eq!(manager.load("default")?.map(SavePayload::into_state), Some(later));
        assert_eq!(manager.entries()?.len(), 1);

        Ok(())
    }

    #[test]
    fn entries_sorted_newest_first_and_skip_garbage() -> Result<()> {
        let dir = tempdir()?;
        let manager = SaveManager::new(dir.path());

        let older = sample_state(1.0, 0);
        let mut newer = sample_state(2.0, 1);
        newer.saved_at = older.saved_at + Duration::minutes(1);
        manager.write("alice", &older)?;
        manager.write("bob", &newer)?;
        fs::write(dir.path().join("broken.json"), "{ not json")?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;

        let entries = manager.entries()?;
        let profiles: Vec<_> = entries.iter().map(|entry| entry.profile.as_str()).collect();
        assert_eq!(profiles, ["bob", "alice"]);
        Ok(())
    }

    #[test]
    fn missing_root_has_no_entries() -> Result<()> {
        let dir = tempdir()?;
        let manager = SaveManager::new(dir.path().join("absent"));
        assert!(manager.entries()?.is_empty());
        Ok(())
    }

    #[test]
    fn sanitize_creates_safe_filenames() {
        assert_eq!(sanitize_component("Hello World!* zoo??"), "HelloWorldzoo");
        assert_eq!(sanitize_component("../"), "save");
    }

    #[test]
    fn profile_store_logs_instead_of_failing() -> Result<()> {
        let dir = tempdir()?;
        let blocker = dir.path().join("file");
        fs::write(&blocker, "")?;
        let store = ProfileStore::new(SaveManager::new(blocker.join("saves")), "default");

        store.persist(sample_state(1.0, 1));
        assert!(store.load_initial_state()?.is_none());
        Ok(())
    }

    #[test]
    fn memory_store_records_writes() -> Result<()> {
        let initial = sample_state(5.0, 1);
        let store = MemoryStore::with_state(initial.clone());
        assert_eq!(store.load_initial_state()?, Some(initial));

        store.persist(sample_state(6.0, 2));
        store.persist(sample_state(7.0, 3));
        assert_eq!(store.writes().len(), 2);
        assert_eq!(store.last_write().map(|state| state.currency), Some(7.0));
        Ok(())
    }

    #[test]
    fn unreadable_save_is_set_aside() -> Result<()> {
        let dir = tempdir()?;
        let manager = SaveManager::new(dir.path());
        let path = manager.path_for("default");
        fs::write(&path, "{ not json")?;
        let store = ProfileStore::new(manager.clone(), "default");

        assert!(store.load_initial_state()?.is_none());
        assert!(!path.exists());
        let aside: Vec<_> = fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("default.json.corrupt-"))
            .collect();
        assert_eq!(aside.len(), 1);
        assert_eq!(fs::read_to_string(dir.path().join(&aside[0]))?, "{ not json");

        store.persist(sample_state(3.0, 1));
        assert_eq!(store.load_initial_state()?.map(|state| state.currency), Some(3.0));
        Ok(())
    }

    #[tokio::test]
    async fn background_saver_coalesces_queued_states() {
        let store = MemoryStore::new();
        let saver = BackgroundSaver::spawn(store.clone());

        // The writer task cannot run before this test yields, so all three
        // states are queued together.
        saver.persist(sample_state(1.0, 1));
        saver.persist(sample_state(2.0, 2));
        saver.persist(sample_state(3.0, 3));
        saver.shutdown().await;

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].currency, 3.0);
        assert_eq!(writes[0].owned.get("cage"), Some(&3));
    }

    #[tokio::test]
    async fn background_saver_writes_each_state_it_is_given_time_for() {
        let store = MemoryStore::new();
        let saver = BackgroundSaver::spawn(store.clone());

        saver.persist(sample_state(1.0, 1));
        while store.writes().is_empty() {
            tokio::task::yield_now().await;
        }
        saver.persist(sample_state(2.0, 2));
        saver.shutdown().await;

        let currencies: Vec<_> = store.writes().iter().map(|state| state.currency).collect();
        assert_eq!(currencies, [1.0, 2.0]);
    }

    #[tokio::test]
    async fn background_saver_flushes_on_shutdown() -> Result<()> {
        let dir = tempdir()?;
        let manager = SaveManager::new(dir.path());
        let saver = BackgroundSaver::spawn(ProfileStore::new(manager.clone(), "default"));

        saver.persist(sample_state(1.0, 1));
        saver.persist(sample_state(2.0, 2));
        saver.shutdown().await;

        let state = manager.load("default")?.expect("expected save").into_state();
        assert_eq!(state.currency, 2.0);
        assert_eq!(state.owned.get("cage"), Some(&2));
        Ok(())
    }
}
