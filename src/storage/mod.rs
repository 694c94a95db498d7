//! Local persistence: the signed license and the mutable client state.

pub mod file;
pub mod format;
pub mod legacy;
