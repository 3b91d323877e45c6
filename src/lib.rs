//! OpenPGP smart-card engine
//!
//! Card-side protocol logic of an OpenPGP card application: an ISO 7816-4
//! APDU processor exposing PIN-gated, per-slot key material through the
//! OpenPGP data-object model.
//!
//! The engine supports:
//! - GET/PUT DATA over the OpenPGP data objects, three key slots
//! - PIN verification with persistent retry counters
//! - RSA and ECC key generation (random or derived from a master seed), import and export
//! - Signature, decryption, encryption, internal authentication and ECDH
//! - Command chaining and response chunking at the transport boundary
//!
//! Cryptography, persistence and the user-facing side are collaborators
//! behind [`crypto::CryptoProvider`], [`card::Persistence`] and
//! [`openpgp::Presentation`].
//!
//! ```no_run
//! use gpgcard::config::EngineConfig;
//! use gpgcard::openpgp::{Exchange, OpenPGPApplet};
//!
//! let mut card = OpenPGPApplet::from_config(&EngineConfig::from_env()).unwrap();
//! let select = [0x00, 0xA4, 0x04, 0x00, 0x06, 0xD2, 0x76, 0x00, 0x01, 0x24, 0x01];
//! if let Exchange::Reply(frame) = card.transmit(&select) {
//!     assert_eq!(&frame[frame.len() - 2..], &[0x90, 0x00]);
//! }
//! ```

pub mod apdu;
pub mod card;
pub mod config;
pub mod crypto;
pub mod error;
pub mod io;
pub mod openpgp;
pub mod tlv;

pub use apdu::{parse_apdu, Response, APDU, SW};
pub use card::{CardState, JsonFileStore, MemoryStore, Persistence};
pub use config::{ConfigError, EngineConfig};
pub use crypto::{CryptoProvider, SoftwareProvider};
pub use error::{CardError, CardResult};
pub use openpgp::{Exchange, NullPresentation, OpenPGPApplet, Outcome, Presentation, Prompt};
