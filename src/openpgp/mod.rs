//! OpenPGP Card Applet
//!
//! Implements the OpenPGP card application (ISO/IEC 7816-4/8) over a
//! multi-slot card record: data objects, PINs, key generation and import,
//! and the security operations.

pub mod access;
pub mod applet;
pub mod challenge;
pub mod data_objects;
pub mod keygen;
pub mod mse;
pub mod pin_manager;
pub mod presentation;
pub mod pso;
pub mod security_state;
pub mod session;

pub use access::AccessCondition;
pub use applet::{Exchange, Flow, OpenPGPApplet, ResumeToken};
pub use pin_manager::PinCheck;
pub use presentation::{NullPresentation, Outcome, Presentation, Prompt};
pub use security_state::{SecurityCondition, SecurityState};
pub use session::SessionState;
