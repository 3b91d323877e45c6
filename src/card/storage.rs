//! Card state storage
//!
//! The card record lives behind [`Persistence`]. [`JsonFileStore`] keeps it
//! as one JSON document, replaced atomically on every commit;
//! [`MemoryStore`] keeps it in memory for tests and ephemeral cards.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use super::state::CardState;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Durable home of the card record.
///
/// `commit` either stores the whole record or leaves the previous one in
/// place.
pub trait Persistence {
    /// The stored record, or `None` when nothing (usable) is stored yet
    fn load(&mut self) -> Result<Option<CardState>, StorageError>;

    fn commit(&mut self, state: &CardState) -> Result<(), StorageError>;
}

/// Card record as a JSON file in a storage directory
#[derive(Debug)]
pub struct JsonFileStore {
    storage_dir: PathBuf,
    state_file: PathBuf,
}

impl JsonFileStore {
    const STATE_FILE: &'static str = "card_state.json";

    /// Default storage directory: `GPGCARD_STORAGE_DIR`, else `~/.gpgcard`
    pub fn default_storage_dir() -> PathBuf {
        if let Ok(path) = std::env::var("GPGCARD_STORAGE_DIR") {
            return PathBuf::from(path);
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".gpgcard");
        }
        PathBuf::from("/var/lib/gpgcard")
    }

    pub fn new(storage_dir: Option<PathBuf>) -> Self {
        let storage_dir = storage_dir.unwrap_or_else(Self::default_storage_dir);
        let state_file = storage_dir.join(Self::STATE_FILE);
        Self {
            storage_dir,
            state_file,
        }
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    fn ensure_storage_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.storage_dir)
            .map_err(|e| StorageError::io(&self.storage_dir, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.storage_dir, fs::Permissions::from_mode(0o700));
        }
        Ok(())
    }

    // Keep an unreadable record aside instead of overwriting it
    fn quarantine(&self) {
        let aside = self.state_file.with_extension("json.corrupt");
        match fs::rename(&self.state_file, &aside) {
            Ok(()) => warn!("Moved unreadable card state to {:?}", aside),
            Err(e) => warn!("Failed to move unreadable card state aside: {}", e),
        }
    }
}

impl Persistence for JsonFileStore {
    fn load(&mut self) -> Result<Option<CardState>, StorageError> {
        if !self.state_file.exists() {
            info!("No existing card state in {:?}", self.storage_dir);
            return Ok(None);
        }

        let content = fs::read_to_string(&self.state_file)
            .map_err(|e| StorageError::io(&self.state_file, e))?;
        match serde_json::from_str::<CardState>(&content) {
            Ok(state) => {
                info!("Loaded card state from {:?}", self.state_file);
                Ok(Some(state))
            }
            Err(e) => {
                warn!("Failed to parse card state: {}", e);
                self.quarantine();
                Ok(None)
            }
        }
    }

    fn commit(&mut self, state: &CardState) -> Result<(), StorageError> {
        self.ensure_storage_dir()?;
        let json = serde_json::to_string_pretty(state)?;

        let tmp = self.state_file.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
            }
            file.write_all(json.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|e| StorageError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.state_file).map_err(|e| StorageError::io(&self.state_file, e))?;
        debug!("Saved card state to {:?}", self.state_file);
        Ok(())
    }
}

/// In-memory record, lost with the process
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Option<CardState>,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: CardState) -> Self {
        Self {
            state: Some(state),
            commits: 0,
        }
    }

    pub fn state(&self) -> Option<&CardState> {
        self.state.as_ref()
    }

    /// Number of commits so far
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl Persistence for MemoryStore {
    fn load(&mut self) -> Result<Option<CardState>, StorageError> {
        Ok(self.state.clone())
    }

    fn commit(&mut self, state: &CardState) -> Result<(), StorageError> {
        self.state = Some(state.clone());
        self.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::LIFECYCLE_ACTIVATED;
    use crate::crypto::SoftwareProvider;
    use tempfile::TempDir;

    fn fresh_state() -> CardState {
        CardState::install(&SoftwareProvider::new(vec![1; 32]), LIFECYCLE_ACTIVATED).unwrap()
    }

    #[test]
    fn test_empty_directory_loads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(Some(temp_dir.path().to_path_buf()));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_commit_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(Some(temp_dir.path().join("card")));

        let mut state = fresh_state();
        state.slots[0].sig_count = 42;
        state.cardholder.name = b"User<<Test".to_vec();
        store.commit(&state).unwrap();
        assert!(!store.state_file().with_extension("json.tmp").exists());

        let mut store2 = JsonFileStore::new(Some(temp_dir.path().join("card")));
        let loaded = store2.load().unwrap().unwrap();
        assert_eq!(loaded.slots[0].sig_count, 42);
        assert_eq!(loaded.cardholder.name, b"User<<Test".to_vec());
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_corrupt_file_is_set_aside() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonFileStore::new(Some(temp_dir.path().to_path_buf()));
        fs::write(store.state_file(), "{ not json").unwrap();

        assert!(store.load().unwrap().is_none());
        assert!(!store.state_file().exists());
        assert!(temp_dir.path().join("card_state.json.corrupt").exists());
    }

    #[test]
    fn test_memory_store_counts_commits() {
        let mut store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        let state = fresh_state();
        store.commit(&state).unwrap();
        store.commit(&state).unwrap();
        assert_eq!(store.commits(), 2);
        assert_eq!(store.load().unwrap(), Some(state));
    }
}
