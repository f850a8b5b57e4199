// src/security/defense.rs - Proactive threat detection and response

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::models::TransactionId;

/// System-wide threat posture, ordered from calm to lockdown.
/// Escalation is event-driven; de-escalation only happens through an
/// explicit administrative reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Response plan is a pure function of the current level.
    pub fn response_plan(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "Standard monitoring",
            ThreatLevel::Medium => "Enhanced monitoring, notify security team",
            ThreatLevel::High => {
                "Block suspicious activity, require additional authentication, alert security team"
            }
            ThreatLevel::Critical => {
                "Lockdown affected systems, block all suspicious IPs, immediate security team response"
            }
        }
    }

    pub fn as_severity(&self) -> Severity {
        match self {
            ThreatLevel::Low => Severity::Low,
            ThreatLevel::Medium => Severity::Medium,
            ThreatLevel::High => Severity::High,
            ThreatLevel::Critical => Severity::Critical,
        }
    }
}

/// Severity attached to threats and alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Kind of detected threat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    BruteForceAttempt,
    UnusualTransaction,
    BlockedIpAccess,
}

impl ThreatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::BruteForceAttempt => "brute_force_attempt",
            ThreatKind::UnusualTransaction => "unusual_transaction",
            ThreatKind::BlockedIpAccess => "blocked_ip_access",
        }
    }
}

/// Transfer details carried by an activity event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub id: TransactionId,
    pub amount: Decimal,
}

/// One unit of observed activity, assembled by the caller
#[derive(Debug, Clone, Default)]
pub struct ActivityEvent {
    pub username: Option<String>,
    pub ip_address: Option<String>,
    pub login_attempts: Option<u32>,
    pub transaction: Option<TransactionSummary>,
    pub risk_score: Option<f64>,
}

impl ActivityEvent {
    pub fn login(username: &str, ip_address: &str, attempts: u32, risk_score: f64) -> Self {
        ActivityEvent {
            username: Some(username.to_string()),
            ip_address: Some(ip_address.to_string()),
            login_attempts: Some(attempts),
            transaction: None,
            risk_score: Some(risk_score),
        }
    }

    pub fn transfer(id: TransactionId, amount: Decimal, risk_score: f64) -> Self {
        ActivityEvent {
            username: None,
            ip_address: None,
            login_attempts: None,
            transaction: Some(TransactionSummary { id, amount }),
            risk_score: Some(risk_score),
        }
    }
}

/// Append-only record of a detected threat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: ThreatKind,
    pub severity: Severity,
    pub evidence: String,
}

/// Lifecycle of a security alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Pending,
    Resolved,
}

/// Append-only alert log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: ThreatLevel,
    pub priority: Severity,
    pub message: String,
    pub status: AlertStatus,
}

/// What a detection pass concluded
#[derive(Debug, Clone)]
pub struct ThreatDetection {
    pub detected: bool,
    pub level: ThreatLevel,
    pub kinds: Vec<ThreatKind>,
    pub response_plan: &'static str,
}

/// Scanner output handed in by the external sweep collaborator
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanReport {
    pub vulnerabilities_found: u32,
    pub suspicious_patterns: u32,
}

/// Scan result with the resulting posture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub scan_time: DateTime<Utc>,
    pub vulnerabilities_found: u32,
    pub suspicious_patterns: u32,
    pub threat_level: ThreatLevel,
    pub response_plan: String,
}

/// Point-in-time security posture summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityStatus {
    pub threat_level: ThreatLevel,
    pub response_plan: String,
    pub active_threats: usize,
    pub blocked_ips: usize,
    pub security_alerts: usize,
    pub last_scan_time: Option<DateTime<Utc>>,
}

// All mutable posture lives behind one lock so level updates, log appends
// and block-list inserts stay consistent under concurrent detections.
struct DefenseState {
    level: ThreatLevel,
    blocked_ips: Vec<String>,
    threats: Vec<ThreatRecord>,
    alerts: Vec<SecurityAlert>,
    last_scan_time: Option<DateTime<Utc>>,
}

/// Process-wide threat detection and response engine. Constructed once at
/// startup and injected into every flow that feeds it events.
pub struct DefenseSystem {
    config: Arc<Config>,
    state: RwLock<DefenseState>,
}

impl DefenseSystem {
    pub fn new(config: Arc<Config>) -> Self {
        DefenseSystem {
            config,
            state: RwLock::new(DefenseState {
                level: ThreatLevel::Low,
                blocked_ips: Vec::new(),
                threats: Vec::new(),
                alerts: Vec::new(),
                last_scan_time: None,
            }),
        }
    }

    /// Run every detection rule against one activity event. Each firing
    /// rule raises the level to at least its floor; the maximum of the
    /// current level and all floors wins. The whole pass happens under a
    /// single write lock so concurrent detections cannot race the level.
    pub fn detect_threat(&self, event: &ActivityEvent) -> ThreatDetection {
        let mut state = self.state.write();
        let mut kinds = Vec::new();
        let now = Utc::now();

        if let Some(attempts) = event.login_attempts {
            if attempts > self.config.max_login_attempts {
                kinds.push(ThreatKind::BruteForceAttempt);
                state.level = state.level.max(ThreatLevel::High);
                state.threats.push(ThreatRecord {
                    timestamp: now,
                    kind: ThreatKind::BruteForceAttempt,
                    severity: Severity::High,
                    evidence: format!("{attempts} login attempts in quick succession"),
                });
            }
        }

        if let Some(transaction) = &event.transaction {
            if transaction.amount > self.config.large_transaction_threshold
                && self.transaction_suspicion(transaction.amount)
                    >= self.config.transaction_suspicion_ratio
            {
                kinds.push(ThreatKind::UnusualTransaction);
                state.level = state.level.max(ThreatLevel::Medium);
                state.threats.push(ThreatRecord {
                    timestamp: now,
                    kind: ThreatKind::UnusualTransaction,
                    severity: Severity::Medium,
                    evidence: format!("Unusually large transaction: ${}", transaction.amount),
                });
            }
        }

        if let Some(ip) = &event.ip_address {
            if state.blocked_ips.iter().any(|blocked| blocked == ip) {
                kinds.push(ThreatKind::BlockedIpAccess);
                state.level = state.level.max(ThreatLevel::Critical);
                state.threats.push(ThreatRecord {
                    timestamp: now,
                    kind: ThreatKind::BlockedIpAccess,
                    severity: Severity::Critical,
                    evidence: format!("Access attempt from blocked IP: {ip}"),
                });
            }
        }

        if !kinds.is_empty() {
            let message = kinds
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                "Threat detected ({message}); level now {:?}, plan: {}",
                state.level,
                state.level.response_plan()
            );
            let alert = SecurityAlert {
                id: Uuid::new_v4(),
                timestamp: now,
                level: state.level,
                priority: state.level.as_severity(),
                message: format!("Threat detected: {message}"),
                status: AlertStatus::New,
            };
            state.alerts.push(alert);
        }

        ThreatDetection {
            detected: !kinds.is_empty(),
            level: state.level,
            kinds,
            response_plan: state.level.response_plan(),
        }
    }

    /// Suspicion for a large transfer: how far the amount overshoots the
    /// screening threshold, as a ratio of the threshold, clamped to [0, 1].
    pub fn transaction_suspicion(&self, amount: Decimal) -> f64 {
        let threshold = self.config.large_transaction_threshold;
        if threshold <= Decimal::ZERO || amount <= threshold {
            return 0.0;
        }
        ((amount - threshold) / threshold)
            .to_f64()
            .unwrap_or(1.0)
            .clamp(0.0, 1.0)
    }

    /// Add an address to the block-list. Duplicate blocks are no-ops
    /// beyond the alert entry recording the request.
    pub fn block_access(&self, ip_address: &str, reason: &str) {
        let mut state = self.state.write();

        if !state.blocked_ips.iter().any(|blocked| blocked == ip_address) {
            state.blocked_ips.push(ip_address.to_string());
            info!("IP address {ip_address} added to blocked list");
        }

        let alert = SecurityAlert {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: state.level,
            priority: state.level.as_severity(),
            message: format!("Blocked access from {ip_address}: {reason}"),
            status: AlertStatus::Resolved,
        };
        state.alerts.push(alert);
    }

    /// Notify the security team. When the caller supplies no priority the
    /// current threat level decides it.
    pub fn alert_security_team(&self, message: &str, priority: Option<Severity>) {
        let mut state = self.state.write();
        let priority = priority.unwrap_or_else(|| state.level.as_severity());

        warn!("Alerting security team ({}): {message}", priority.as_str());

        let alert = SecurityAlert {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: state.level,
            priority,
            message: message.to_string(),
            status: AlertStatus::Pending,
        };
        state.alerts.push(alert);
    }

    /// Fold the results of a periodic sweep into the posture. The counts
    /// come from an external scanner; enough findings escalate to High.
    pub fn run_security_scan(&self, report: ScanReport) -> ScanOutcome {
        let mut state = self.state.write();
        let now = Utc::now();
        state.last_scan_time = Some(now);

        if report.vulnerabilities_found > 2 || report.suspicious_patterns > 1 {
            state.level = state.level.max(ThreatLevel::High);
            warn!(
                "Security scan escalated threat level to {:?} ({} vulnerabilities, {} patterns)",
                state.level, report.vulnerabilities_found, report.suspicious_patterns
            );
        }

        ScanOutcome {
            scan_time: now,
            vulnerabilities_found: report.vulnerabilities_found,
            suspicious_patterns: report.suspicious_patterns,
            threat_level: state.level,
            response_plan: state.level.response_plan().to_string(),
        }
    }

    /// Administrative de-escalation back to the baseline posture. The
    /// block-list and audit logs survive a reset.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.level = ThreatLevel::Low;
        info!("Threat level reset to {:?}", state.level);
    }

    pub fn threat_level(&self) -> ThreatLevel {
        self.state.read().level
    }

    pub fn response_plan(&self) -> &'static str {
        self.state.read().level.response_plan()
    }

    pub fn is_blocked(&self, ip_address: &str) -> bool {
        self.state
            .read()
            .blocked_ips
            .iter()
            .any(|blocked| blocked == ip_address)
    }

    pub fn alerts(&self) -> Vec<SecurityAlert> {
        self.state.read().alerts.clone()
    }

    pub fn threats(&self) -> Vec<ThreatRecord> {
        self.state.read().threats.clone()
    }

    pub fn status(&self) -> SecurityStatus {
        let state = self.state.read();
        SecurityStatus {
            threat_level: state.level,
            response_plan: state.level.response_plan().to_string(),
            active_threats: state.threats.len(),
            blocked_ips: state.blocked_ips.len(),
            security_alerts: state.alerts.len(),
            last_scan_time: state.last_scan_time,
        }
    }
}
