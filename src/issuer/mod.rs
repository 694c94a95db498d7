//! Issuer service: the server-side counterpart of the engine.

pub mod issue;
pub mod service;
pub mod store;

pub use issue::issue_license;
pub use service::IssuerService;
pub use store::{IssuedLicense, LicenseStore, MemoryStore};
