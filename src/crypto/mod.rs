//! Canonical encoding, signing and verification.

pub mod canonical;
pub mod digest;
pub mod pipeline;
pub mod signing;
pub mod verify;
