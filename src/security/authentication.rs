// src/security/authentication.rs - Contextual risk evaluation for login attempts

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::security::password::generate_token;

/// Decision for an authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthDecision {
    Allow,
    Challenge,
    Deny,
}

/// Everything the caller collected about one login attempt
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub username: String,
    pub device_fingerprint: String,
    pub location: String,
    pub ip_address: String,
    pub face_sample: Option<String>,
    pub typing_sample: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuthContext {
    pub fn new(
        username: impl Into<String>,
        device_fingerprint: impl Into<String>,
        location: impl Into<String>,
        ip_address: impl Into<String>,
    ) -> Self {
        AuthContext {
            username: username.into(),
            device_fingerprint: device_fingerprint.into(),
            location: location.into(),
            ip_address: ip_address.into(),
            face_sample: None,
            typing_sample: None,
            timestamp: Utc::now(),
        }
    }
}

/// Contextual risk verdict for one attempt. Produced fresh per evaluation,
/// kept only in the audit trail afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk: f64,
    pub risk_factors: Vec<String>,
    pub decision: AuthDecision,
}

/// Short-lived out-of-band verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeToken {
    pub token: String,
    pub method: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ChallengeToken {
    /// Expiry is checked against the clock at use time; nothing sweeps
    /// tokens in the background.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Audit entry appended per evaluation. Advisory telemetry only, never an
/// input to later risk calculations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub device: String,
    pub location: String,
    pub risk: f64,
    pub decision: AuthDecision,
}

/// Turns contextual signals into an allow/challenge/deny decision.
///
/// This risk is independent of factor verification: it judges whether the
/// surrounding conditions look like a normal login, not whether the person
/// is who they claim to be.
pub struct RiskEvaluator {
    config: Arc<Config>,
    history: RwLock<Vec<AuthAuditEntry>>,
    pending_challenges: RwLock<HashMap<String, ChallengeToken>>,
}

impl RiskEvaluator {
    pub fn new(config: Arc<Config>) -> Self {
        RiskEvaluator {
            config,
            history: RwLock::new(Vec::new()),
            pending_challenges: RwLock::new(HashMap::new()),
        }
    }

    /// Evaluate one attempt. Penalties are additive and clamped to 1.0.
    pub fn evaluate(&self, ctx: &AuthContext) -> RiskAssessment {
        let mut risk: f64 = 0.0;
        let mut risk_factors = Vec::new();

        if ctx.face_sample.as_deref().map_or(true, str::is_empty) {
            risk_factors.push("Missing facial biometric data".to_string());
            risk += 0.3;
        }

        if ctx.typing_sample.as_deref().map_or(true, str::is_empty) {
            risk_factors.push("Missing typing pattern data".to_string());
            risk += 0.2;
        }

        let hour = ctx.timestamp.time().hour();
        if hour >= self.config.unusual_hours_start && hour <= self.config.unusual_hours_end {
            risk_factors.push("Unusual login time".to_string());
            risk += 0.2;
        }

        let overall_risk = risk.min(1.0);
        let decision = if overall_risk < 0.5 {
            AuthDecision::Allow
        } else if overall_risk < 0.7 {
            AuthDecision::Challenge
        } else {
            AuthDecision::Deny
        };

        debug!(
            "Contextual risk for {}: {:.2} -> {:?}",
            ctx.username, overall_risk, decision
        );

        self.history.write().push(AuthAuditEntry {
            timestamp: ctx.timestamp,
            username: ctx.username.clone(),
            device: ctx.device_fingerprint.clone(),
            location: ctx.location.clone(),
            risk: overall_risk,
            decision,
        });

        RiskAssessment {
            overall_risk,
            risk_factors,
            decision,
        }
    }

    /// Issue an out-of-band verification request (second factor).
    pub fn request_additional_verification(&self, method: &str) -> ChallengeToken {
        let issued_at = Utc::now();
        let challenge = ChallengeToken {
            token: generate_token(16),
            method: method.to_string(),
            issued_at,
            expires_at: issued_at + Duration::seconds(self.config.challenge_validity_secs),
        };

        info!(
            "Issued {} challenge, valid for {}s",
            method, self.config.challenge_validity_secs
        );
        self.pending_challenges
            .write()
            .insert(challenge.token.clone(), challenge.clone());

        challenge
    }

    /// Redeem a challenge token. A token is single-use; an expired or
    /// unknown token is rejected and dropped.
    pub fn verify_challenge(&self, token: &str) -> bool {
        let mut pending = self.pending_challenges.write();
        match pending.remove(token) {
            Some(challenge) if !challenge.is_expired() => true,
            Some(_) => {
                info!("Rejected expired challenge token");
                false
            }
            None => false,
        }
    }

    pub fn history(&self) -> Vec<AuthAuditEntry> {
        self.history.read().clone()
    }
}
