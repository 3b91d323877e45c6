//! Engine configuration
//!
//! Where the card record lives, which master seed the deterministic
//! derivations hang off, and whether key generation is seeded by default.
//! Values come from the environment:
//!
//! - `GPGCARD_STORAGE_DIR`: storage directory (default `~/.gpgcard`)
//! - `GPGCARD_MASTER_SEED`: master seed as hex; when unset the seed is read
//!   from `master.seed` in the storage directory, created on first use
//! - `GPGCARD_SEED_MODE`: `1`/`true`/`on` to derive generated keys

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::JsonFileStore;
use crate::crypto::{CryptoError, CryptoProvider, SoftwareProvider};
use crate::error::CardError;

const SEED_FILE: &str = "master.seed";
const SEED_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("master seed is not valid hex: {0}")]
    InvalidSeed(#[from] hex::FromHexError),

    #[error("master seed must be 16 to 64 bytes, got {0}")]
    SeedLength(usize),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Card record could not be loaded or installed
    #[error(transparent)]
    Card(#[from] CardError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub storage_dir: PathBuf,
    /// Hex encoded master seed, `None` to use the seed file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_seed: Option<String>,
    #[serde(default)]
    pub seed_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_dir: JsonFileStore::default_storage_dir(),
            master_seed: None,
            seed_mode: false,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_dir = lookup("GPGCARD_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(JsonFileStore::default_storage_dir);
        Self {
            storage_dir,
            master_seed: lookup("GPGCARD_MASTER_SEED").filter(|s| !s.trim().is_empty()),
            seed_mode: lookup("GPGCARD_SEED_MODE").map_or(false, |v| parse_flag(&v)),
        }
    }

    pub fn with_storage_dir(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            ..Self::default()
        }
    }

    pub fn store(&self) -> JsonFileStore {
        JsonFileStore::new(Some(self.storage_dir.clone()))
    }

    /// Resolve the master seed: configured hex, else the seed file.
    pub fn master_seed(&self, crypto_rng: &dyn CryptoProvider) -> Result<Vec<u8>, ConfigError> {
        if let Some(hex_seed) = &self.master_seed {
            return decode_seed(hex_seed);
        }
        let path = self.storage_dir.join(SEED_FILE);
        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            return decode_seed(&content);
        }

        let seed = crypto_rng.random_bytes(SEED_LENGTH)?;
        write_seed_file(&self.storage_dir, &path, &seed)?;
        info!("Created master seed in {:?}", path);
        Ok(seed)
    }

    /// Software provider over the resolved master seed
    pub fn provider(&self) -> Result<SoftwareProvider, ConfigError> {
        let bootstrap = SoftwareProvider::new(Vec::new());
        let seed = self.master_seed(&bootstrap)?;
        Ok(SoftwareProvider::new(seed))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn decode_seed(hex_seed: &str) -> Result<Vec<u8>, ConfigError> {
    let seed = hex::decode(hex_seed.trim())?;
    if !(16..=64).contains(&seed.len()) {
        return Err(ConfigError::SeedLength(seed.len()));
    }
    Ok(seed)
}

fn write_seed_file(dir: &Path, path: &Path, seed: &[u8]) -> Result<(), ConfigError> {
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    fs::write(path, hex::encode(seed)).map_err(|e| io_error(path, e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("Failed to restrict permissions of {:?}: {}", path, e);
        }
    }
    Ok(())
}
