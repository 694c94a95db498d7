//! # licensegate
//!
//! **Offline-first signed license validation and activation.**
//!
//! licensegate decides whether an application instance may run. Trust is
//! anchored in a locally stored, Ed25519-signed license record; a small
//! state ledger tracks check-ins and clock integrity; an optional issuer
//! round trip reconciles with the server when one is due.
//!
//! ## Features
//!
//! - **Signed license records**: canonical JSON encoding, detached Ed25519 signatures
//! - **Machine binding**: licenses can be locked to a hashed machine fingerprint
//! - **Offline grace policy**: check interval, warning threshold and hard limit
//! - **Clock rollback guard**: repeated backward clock jumps eventually block
//! - **Atomic persistence**: records are replaced via temp file + rename
//! - **Best-effort check-ins**: network failures degrade to the cached license
//!
//! ## Quickstart
//!
//! ```no_run
//! use licensegate::{LicenseEngine, LicenseGateConfig};
//!
//! fn main() -> Result<(), licensegate::LicenseGateError> {
//!     let config = LicenseGateConfig::from_file("licensegate.json")?;
//!     let engine = LicenseEngine::new(config)?;
//!
//!     let report = engine.assert_valid()?;
//!     for advisory in &report.advisories {
//!         eprintln!("warning: {}", advisory);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! Every `Err` returned by [`LicenseEngine::assert_valid`] is fatal for the
//! host; [`LicenseGateError::reason_code`] gives a stable code and
//! [`LicenseGateError::kind`] separates trust failures from persistence
//! problems. Non-blocking conditions arrive as [`Advisory`] values.
//!
//! licensegate does **not** prevent binary patching. Client-side licensing
//! can always be bypassed by a determined attacker with the binary.

#![warn(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Local records
pub mod fingerprint;
pub mod storage;

// Policy layer
pub mod policy;
pub mod validator;

// Protocol and client layer
pub mod client;
pub mod protocol;

// Engine (main public API)
pub mod engine;

// Server side
pub mod issuer;

// Re-exports for public API
pub use client::{IssuerClient, Transport};
pub use clock::{Clock, SystemClock};
pub use config::LicenseGateConfig;
pub use engine::{LicenseEngine, ServerCheck, ValidationReport};
pub use errors::{Advisory, CheckOutcome, FailureKind, LicenseGateError};
pub use issuer::{issue_license, IssuedLicense, IssuerService, LicenseStore, MemoryStore};
pub use policy::{OfflineState, Policy};
pub use storage::format::{ClientState, License, LicenseStatus};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
