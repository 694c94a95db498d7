//! Issuer protocol.

pub mod models;

pub use models::{Envelope, ErrorCode, IssuerAction};
