//! State persistence backends
//!
//! The file store writes a temp file, syncs it, then renames it over the
//! previous state so a crash mid-write leaves the last good record in place.

use super::{AlertState, PersistedState};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Errors from loading or saving alert state
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home for [`AlertState`], written by a single owner
pub trait StateStore: Send + Sync {
    /// Read the stored state; a store with nothing saved yields the default
    fn load(&self) -> Result<AlertState, StoreError>;

    /// Replace the stored state
    fn save(&self, state: &AlertState) -> Result<(), StoreError>;
}

/// JSON file store with atomic replace
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<AlertState, StoreError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet, starting empty");
                return Ok(AlertState::default());
            }
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        let persisted: PersistedState =
            serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        Ok(AlertState::from_persisted(persisted))
    }

    fn save(&self, state: &AlertState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
            }
        }

        let json = serde_json::to_vec_pretty(&state.to_persisted())?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| self.io_error(&temp_path, e))?;

        file.write_all(&json)
            .map_err(|e| self.io_error(&temp_path, e))?;
        file.sync_all().map_err(|e| self.io_error(&temp_path, e))?;

        std::fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            accounts = state.last_alert_at.len(),
            hour_alert_count = state.hour_alert_count,
            "State persisted"
        );
        Ok(())
    }
}

/// In-memory store, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<AlertState>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `state`
    pub fn with_state(state: AlertState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Default::default()
        }
    }

    /// Make subsequent saves fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Last saved state, if any
    pub fn snapshot(&self) -> Option<AlertState> {
        self.state.lock().ok().and_then(|guard| guard.clone())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<AlertState, StoreError> {
        let guard = self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, state: &AlertState) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("saves disabled".to_string()));
        }
        let mut guard = self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        *guard = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample_state() -> AlertState {
        let mut state = AlertState::new();
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 15, 42, 23).unwrap();
        state.roll_window(now);
        state.record_alert("alice", now);
        state
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), AlertState::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("sub").join("state.json"));

        let state = sample_state();
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
        assert!(!dir.path().join("sub").join("state.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous_record() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));

        let mut state = sample_state();
        store.save(&state).unwrap();

        state.record_alert("bob", Utc.with_ymd_and_hms(2025, 11, 10, 15, 50, 0).unwrap());
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.hour_alert_count, 2);
        assert!(loaded.last_alert("bob").is_some());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_reads_legacy_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"last_alerts": {"johndoe": "2025-11-10T15:42:23.512345"}, "alert_count_hour": 2, "alert_hour_start": "2025-11-10T15:30:00.000001"}"#,
        )
        .unwrap();

        let state = JsonFileStore::new(&path).load().unwrap();
        assert!(state.last_alert("johndoe").is_some());
        assert_eq!(state.hour_alert_count, 2);
    }

    #[test]
    fn test_memory_store_failure_toggle() {
        let store = MemoryStateStore::new();
        store.save(&sample_state()).unwrap();
        assert_eq!(store.save_count(), 1);

        store.set_fail_saves(true);
        assert!(store.save(&AlertState::new()).is_err());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().unwrap(), sample_state());
    }
}
