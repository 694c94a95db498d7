//! Effective offline-tolerance parameters.

use crate::config::PolicyDefaults;
use crate::storage::format::License;
use serde::Serialize;

/// Built-in check interval when neither license nor config sets one.
pub const FALLBACK_CHECK_INTERVAL_DAYS: i64 = 30;
/// Built-in warning threshold.
pub const FALLBACK_WARN_AFTER_DAYS: i64 = 180;
/// Built-in hard limit.
pub const FALLBACK_MAX_OFFLINE_DAYS: i64 = 365;

/// Resolved offline policy. Values are clamped at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Policy {
    check_interval_days: i64,
    warn_after_days: i64,
    max_offline_days: i64,
}

impl Policy {
    /// Build a policy, clamping to `>= 1`, `>= 0`, `>= 1`.
    pub fn new(check_interval_days: i64, warn_after_days: i64, max_offline_days: i64) -> Self {
        Self {
            check_interval_days: check_interval_days.max(1),
            warn_after_days: warn_after_days.max(0),
            max_offline_days: max_offline_days.max(1),
        }
    }

    /// License policy first, then configured defaults, then built-ins.
    pub fn resolve(license: &License, defaults: &PolicyDefaults) -> Self {
        let embedded = license.policy.clone().unwrap_or_default();
        Self::new(
            embedded
                .check_interval_days
                .or(defaults.check_interval_days)
                .unwrap_or(FALLBACK_CHECK_INTERVAL_DAYS),
            embedded
                .warn_after_days
                .or(defaults.warn_after_days)
                .unwrap_or(FALLBACK_WARN_AFTER_DAYS),
            embedded
                .max_offline_days
                .or(defaults.max_offline_days)
                .unwrap_or(FALLBACK_MAX_OFFLINE_DAYS),
        )
    }

    /// Days between scheduled check-ins.
    pub fn check_interval_days(&self) -> i64 {
        self.check_interval_days
    }

    /// Days offline before a warning.
    pub fn warn_after_days(&self) -> i64 {
        self.warn_after_days
    }

    /// Days offline before the engine refuses to run.
    pub fn max_offline_days(&self) -> i64 {
        self.max_offline_days
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(
            FALLBACK_CHECK_INTERVAL_DAYS,
            FALLBACK_WARN_AFTER_DAYS,
            FALLBACK_MAX_OFFLINE_DAYS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn license_with_policy(policy: serde_json::Value) -> License {
        License::from_value(json!({"license_id": "L", "policy": policy})).unwrap()
    }

    #[test]
    fn embedded_policy_wins() {
        let license = license_with_policy(json!({
            "check_interval_days": 7, "warn_after_days": 14, "max_offline_days": 21
        }));
        let defaults = PolicyDefaults {
            check_interval_days: Some(60),
            warn_after_days: Some(90),
            max_offline_days: Some(120),
        };
        assert_eq!(Policy::resolve(&license, &defaults), Policy::new(7, 14, 21));
    }

    #[test]
    fn falls_back_per_field() {
        let license = license_with_policy(json!({"check_interval_days": 7}));
        let defaults = PolicyDefaults {
            warn_after_days: Some(90),
            ..Default::default()
        };
        let policy = Policy::resolve(&license, &defaults);
        assert_eq!(policy.check_interval_days(), 7);
        assert_eq!(policy.warn_after_days(), 90);
        assert_eq!(policy.max_offline_days(), 365);
    }

    #[test]
    fn builtin_fallbacks() {
        let license = License::from_value(json!({"license_id": "L"})).unwrap();
        let policy = Policy::resolve(&license, &PolicyDefaults::default());
        assert_eq!(policy, Policy::new(30, 180, 365));
        assert_eq!(policy, Policy::default());
    }

    #[test]
    fn clamps_to_minimums() {
        let policy = Policy::new(0, -5, -1);
        assert_eq!(policy.check_interval_days(), 1);
        assert_eq!(policy.warn_after_days(), 0);
        assert_eq!(policy.max_offline_days(), 1);
    }
}
