//! Offline policy, offline posture and clock integrity.

pub mod clock_guard;
pub mod offline;
pub mod resolve;

pub use clock_guard::{ClockGuard, ClockObservation};
pub use offline::{compute_offline_state, OfflineState};
pub use resolve::Policy;
