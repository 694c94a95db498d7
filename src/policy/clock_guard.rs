//! Backward clock movement detection across invocations.

use crate::storage::format::ClockGuardState;
use crate::LicenseGateError;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

/// Backward jumps smaller than this are treated as clock noise.
pub const ROLLBACK_TOLERANCE_SECONDS: i64 = 60;

/// What a single observation saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockObservation {
    /// Time moved forward (or first observation).
    Normal,
    /// A rollback was counted but the ceiling was not exceeded.
    RollbackTolerated {
        /// Rollbacks seen so far.
        count: u32,
    },
}

/// Rollback detector over the persisted [`ClockGuardState`].
#[derive(Debug, Clone, Copy)]
pub struct ClockGuard {
    max_rollback_count: u32,
    tolerance: Duration,
}

impl ClockGuard {
    /// Guard allowing up to `max_rollback_count` rollbacks.
    pub fn new(max_rollback_count: u32) -> Self {
        Self {
            max_rollback_count,
            tolerance: Duration::seconds(ROLLBACK_TOLERANCE_SECONDS),
        }
    }

    /// Configured ceiling.
    pub fn max_rollback_count(&self) -> u32 {
        self.max_rollback_count
    }

    /// Record `now` into `state`.
    ///
    /// `state` is updated even when this returns an error; callers must
    /// persist it before propagating the failure.
    pub fn observe(
        &self,
        state: &mut ClockGuardState,
        now: DateTime<Utc>,
    ) -> Result<ClockObservation, LicenseGateError> {
        let rolled_back = match state.last_seen_time {
            Some(last_seen) => now + self.tolerance < last_seen,
            None => false,
        };

        state.last_seen_time = Some(now);

        if !rolled_back {
            return Ok(ClockObservation::Normal);
        }

        state.rollback_count = state.rollback_count.saturating_add(1);
        warn!(
            rollback_count = state.rollback_count,
            max = self.max_rollback_count,
            "System clock rollback detected"
        );

        if state.rollback_count > self.max_rollback_count {
            return Err(LicenseGateError::ClockRollback {
                count: state.rollback_count,
                max: self.max_rollback_count,
            });
        }

        Ok(ClockObservation::RollbackTolerated {
            count: state.rollback_count,
        })
    }
}
