//! Offline posture: how overdue a client is for issuer reconciliation.

use crate::policy::resolve::Policy;
use crate::storage::format::ClientState;
use chrono::{DateTime, Utc};
use serde::Serialize;

const SECONDS_PER_DAY: i64 = 86_400;

/// Computed offline posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OfflineState {
    /// Whole days since the last successful check-in; `None` before the first.
    pub offline_days: Option<i64>,
    /// Past the warning threshold.
    pub warn: bool,
    /// Past the hard limit; the engine must refuse to run.
    pub hard_block: bool,
    /// A check-in should be attempted.
    pub due: bool,
}

/// Compute the offline posture at `now`.
///
/// With no prior successful check the client is due but neither warned nor
/// blocked (first-run grace).
pub fn compute_offline_state(policy: &Policy, state: &ClientState, now: DateTime<Utc>) -> OfflineState {
    let Some(last_success) = state.last_success_check_at else {
        return OfflineState {
            offline_days: None,
            warn: false,
            hard_block: false,
            due: true,
        };
    };

    let days = (now - last_success)
        .num_seconds()
        .div_euclid(SECONDS_PER_DAY);

    OfflineState {
        offline_days: Some(days),
        warn: days >= policy.warn_after_days(),
        hard_block: days > policy.max_offline_days(),
        due: days >= policy.check_interval_days(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn state_checked_at(at: DateTime<Utc>) -> ClientState {
        ClientState {
            last_success_check_at: Some(at),
            ..Default::default()
        }
    }

    #[test]
    fn first_run_grace() {
        let offline = compute_offline_state(&Policy::default(), &ClientState::default(), now());
        assert_eq!(
            offline,
            OfflineState {
                offline_days: None,
                warn: false,
                hard_block: false,
                due: true
            }
        );
    }

    #[test]
    fn two_hundred_days_offline() {
        let policy = Policy::new(30, 180, 365);
        let state = state_checked_at(now() - Duration::days(200));
        let offline = compute_offline_state(&policy, &state, now());
        assert_eq!(offline.offline_days, Some(200));
        assert!(offline.due);
        assert!(offline.warn);
        assert!(!offline.hard_block);
    }

    #[test]
    fn four_hundred_days_offline() {
        let policy = Policy::new(30, 180, 365);
        let state = state_checked_at(now() - Duration::days(400));
        let offline = compute_offline_state(&policy, &state, now());
        assert!(offline.hard_block);
    }

    #[test]
    fn recent_check_is_quiet() {
        let policy = Policy::new(30, 180, 365);
        let state = state_checked_at(now() - Duration::days(3));
        let offline = compute_offline_state(&policy, &state, now());
        assert_eq!(offline.offline_days, Some(3));
        assert!(!offline.due && !offline.warn && !offline.hard_block);
    }

    #[test]
    fn boundaries() {
        let policy = Policy::new(30, 180, 365);

        let at_interval = state_checked_at(now() - Duration::days(30));
        assert!(compute_offline_state(&policy, &at_interval, now()).due);

        let just_short = state_checked_at(now() - Duration::days(30) + Duration::seconds(1));
        let offline = compute_offline_state(&policy, &just_short, now());
        assert_eq!(offline.offline_days, Some(29));
        assert!(!offline.due);

        let at_max = state_checked_at(now() - Duration::days(365));
        assert!(!compute_offline_state(&policy, &at_max, now()).hard_block);

        let past_max = state_checked_at(now() - Duration::days(366));
        assert!(compute_offline_state(&policy, &past_max, now()).hard_block);
    }

    #[test]
    fn future_check_time_floors_negative() {
        let state = state_checked_at(now() + Duration::hours(1));
        let offline = compute_offline_state(&Policy::default(), &state, now());
        assert_eq!(offline.offline_days, Some(-1));
        assert!(!offline.due);
    }
}
