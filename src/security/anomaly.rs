// src/security/anomaly.rs - Login anomaly detection against historical patterns

use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::UserRecord;
use crate::security::authentication::AuthContext;

/// Prior logins at the same hour required before that hour reads as normal
const MIN_HOUR_OCCURRENCES: usize = 2;

/// A way the current login deviates from the user's established patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    UntrustedDevice,
    UnusualLocation,
    UnusualLoginTime,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::UntrustedDevice => "untrusted_device",
            AnomalyKind::UnusualLocation => "unusual_location",
            AnomalyKind::UnusualLoginTime => "unusual_login_time",
        }
    }
}

/// Derived anomaly report. Advisory only: the detector annotates, it
/// never decides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternComparison {
    pub anomalies: Vec<AnomalyKind>,
    pub is_suspicious: bool,
}

/// Compares a login attempt against the user's stored history. Reads the
/// record, never writes it.
pub struct AnomalyDetector;

impl AnomalyDetector {
    /// Evaluate each pattern rule independently and collect the tags that
    /// fire, in rule order. Two or more tags mark the attempt suspicious.
    pub fn compare_with_history(record: &UserRecord, ctx: &AuthContext) -> PatternComparison {
        let mut anomalies = Vec::new();

        // Device: containment against any trusted fingerprint
        let device_trusted = record
            .trusted_devices
            .iter()
            .any(|trusted| trusted.contains(&ctx.device_fingerprint));
        if !device_trusted {
            anomalies.push(AnomalyKind::UntrustedDevice);
        }

        // Location: exact string match against any historical location
        let location_known = record
            .login_history
            .iter()
            .any(|login| login.location == ctx.location);
        if !location_known && !record.login_history.is_empty() {
            anomalies.push(AnomalyKind::UnusualLocation);
        }

        // Time of day: bucket successful logins by hour; an hour seen
        // fewer than twice is unusual. No history, no verdict.
        if !record.login_history.is_empty() {
            use chrono::Timelike;
            let current_hour = ctx.timestamp.time().hour();
            let occurrences = record
                .login_history
                .iter()
                .filter(|login| login.success && login.timestamp.time().hour() == current_hour)
                .count();
            if occurrences < MIN_HOUR_OCCURRENCES {
                anomalies.push(AnomalyKind::UnusualLoginTime);
            }
        }

        if !anomalies.is_empty() {
            debug!(
                "Login anomalies for {}: {}",
                record.username,
                anomalies
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let is_suspicious = anomalies.len() >= 2;
        PatternComparison {
            anomalies,
            is_suspicious,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoricalLoginRecord;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn login_at(hour: u32, location: &str, success: bool) -> HistoricalLoginRecord {
        HistoricalLoginRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 10, hour, 30, 0).unwrap(),
            device_fingerprint: "Windows 11, Chrome 98.0.4758.102".to_string(),
            location: location.to_string(),
            ip_address: "192.168.1.1".to_string(),
            success,
            risk_level: None,
        }
    }

    fn user_with_history(history: Vec<HistoricalLoginRecord>) -> UserRecord {
        let mut record = UserRecord::new("angel_abubakar", "angel@example.com", "hash", dec!(5000));
        record
            .trusted_devices
            .push("Windows 11, Chrome 98.0.4758.102".to_string());
        record.login_history = history;
        record
    }

    fn context(device: &str, location: &str, hour: u32) -> AuthContext {
        let mut ctx = AuthContext::new("angel_abubakar", device, location, "192.168.1.1");
        ctx.timestamp = Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap();
        ctx
    }

    #[test]
    fn test_unknown_location_is_flagged() {
        let record = user_with_history(vec![
            login_at(9, "A", true),
            login_at(9, "B", true),
            login_at(9, "A", true),
        ]);

        let ctx = context("Windows 11, Chrome 98.0.4758.102", "C", 9);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert_eq!(comparison.anomalies, vec![AnomalyKind::UnusualLocation]);
        assert!(!comparison.is_suspicious);

        // Returning to a known location raises nothing
        let ctx = context("Windows 11, Chrome 98.0.4758.102", "A", 9);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert!(comparison.anomalies.is_empty());
    }

    #[test]
    fn test_untrusted_device_is_flagged() {
        let record = user_with_history(vec![login_at(9, "A", true), login_at(9, "A", true)]);

        let ctx = context("Unknown Device", "A", 9);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert_eq!(comparison.anomalies, vec![AnomalyKind::UntrustedDevice]);

        // The probe may be a substring of the stored fingerprint
        let ctx = context("Chrome 98.0.4758.102", "A", 9);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert!(comparison.anomalies.is_empty());
    }

    #[test]
    fn test_rare_hour_is_flagged() {
        let record = user_with_history(vec![
            login_at(9, "A", true),
            login_at(9, "A", true),
            login_at(22, "A", true),
        ]);

        // Two prior 9 o'clock logins make that hour normal
        let ctx = context("Windows 11, Chrome 98.0.4758.102", "A", 9);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert!(comparison.anomalies.is_empty());

        // A single prior login at 22h is not enough
        let ctx = context("Windows 11, Chrome 98.0.4758.102", "A", 22);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert_eq!(comparison.anomalies, vec![AnomalyKind::UnusualLoginTime]);

        // A never-seen hour is unusual too
        let ctx = context("Windows 11, Chrome 98.0.4758.102", "A", 3);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert_eq!(comparison.anomalies, vec![AnomalyKind::UnusualLoginTime]);
    }

    #[test]
    fn test_failed_logins_do_not_count_toward_hours() {
        let record = user_with_history(vec![
            login_at(9, "A", true),
            login_at(9, "A", false),
            login_at(9, "A", false),
        ]);

        let ctx = context("Windows 11, Chrome 98.0.4758.102", "A", 9);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert_eq!(comparison.anomalies, vec![AnomalyKind::UnusualLoginTime]);
    }

    #[test]
    fn test_zero_history_raises_no_location_or_time_anomaly() {
        let record = user_with_history(Vec::new());

        let ctx = context("Windows 11, Chrome 98.0.4758.102", "Anywhere", 3);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert!(comparison.anomalies.is_empty());
        assert!(!comparison.is_suspicious);
    }

    #[test]
    fn test_two_anomalies_are_suspicious() {
        let record = user_with_history(vec![
            login_at(9, "A", true),
            login_at(9, "A", true),
        ]);

        let ctx = context("Unknown Device", "C", 9);
        let comparison = AnomalyDetector::compare_with_history(&record, &ctx);
        assert_eq!(
            comparison.anomalies,
            vec![AnomalyKind::UntrustedDevice, AnomalyKind::UnusualLocation]
        );
        assert!(comparison.is_suspicious);
    }
}
