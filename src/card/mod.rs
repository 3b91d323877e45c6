//! Card data structures and storage
//!
//! The persistent card record and the stores that keep it.

pub mod state;
pub mod storage;

pub use state::{
    CardState, CardholderData, EccKey, Key, KeyMaterial, KeyRole, KeySlot, PinId, PinMode,
    PinRecord, RsaKey, AID_PREFIX, DEFAULT_ATTRIBUTES, DEFAULT_PW1, DEFAULT_PW3,
    HISTO_LIFECYCLE, LIFECYCLE_ACTIVATED, LIFECYCLE_TERMINATED, MAGIC, MAX_ATTRIBUTES_LENGTH,
    MAX_CERTIFICATE_LENGTH, MAX_CHALLENGE_LENGTH, MAX_LANG_LENGTH, MAX_NAME_LENGTH,
    MAX_PIN_LENGTH, MAX_PRIVATE_DO_LENGTH, PIN_RETRIES, SLOT_COUNT,
};
pub use storage::{JsonFileStore, MemoryStore, Persistence, StorageError};
