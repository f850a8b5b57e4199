// src/security/verification.rs - Multi-factor verification and risk aggregation

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Risk reported when no verification evidence is available at all.
/// Missing evidence must never read as safe.
pub const MISSING_EVIDENCE_RISK: f64 = 0.9;

/// Identity factor checked during login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Face,
    Typing,
    Location,
    Device,
}

impl FactorKind {
    /// Weight of this factor in the overall risk average.
    pub fn weight(&self) -> f64 {
        match self {
            FactorKind::Face => 0.35,
            FactorKind::Typing => 0.25,
            FactorKind::Location => 0.20,
            FactorKind::Device => 0.20,
        }
    }

    /// Face and typing scores are confidences (higher is better);
    /// location and device scores are risks (higher is worse).
    pub fn is_confidence(&self) -> bool {
        matches!(self, FactorKind::Face | FactorKind::Typing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FactorKind::Face => "face",
            FactorKind::Typing => "typing",
            FactorKind::Location => "location",
            FactorKind::Device => "device",
        }
    }
}

/// Outcome of a single factor check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSignal {
    pub factor: FactorKind,
    pub passed: bool,
    pub score: f64,
}

/// Deterministic sample-vs-reference comparator. Implementations must
/// return a value in [0, 1] and be stable for identical inputs.
pub trait FactorScorer: Send + Sync {
    fn score(&self, current: &str, reference: &str) -> f64;
}

/// Default comparator: normalized edit-distance similarity between the
/// encoded sample and the stored reference.
pub struct SimilarityScorer;

impl FactorScorer for SimilarityScorer {
    fn score(&self, current: &str, reference: &str) -> f64 {
        strsim::normalized_levenshtein(current, reference).clamp(0.0, 1.0)
    }
}

/// Running verification counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VerificationStats {
    pub attempts: u64,
    pub successes: u64,
    pub flagged: u64,
}

impl VerificationStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64
    }
}

/// Produces per-factor signals and combines them into one weighted risk
pub struct VerificationEngine {
    config: Arc<Config>,
    face_scorer: Box<dyn FactorScorer>,
    typing_scorer: Box<dyn FactorScorer>,
    stats: RwLock<VerificationStats>,
}

impl VerificationEngine {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_scorers(config, Box::new(SimilarityScorer), Box::new(SimilarityScorer))
    }

    /// Swap in alternative face/typing comparators behind the same contract.
    pub fn with_scorers(
        config: Arc<Config>,
        face_scorer: Box<dyn FactorScorer>,
        typing_scorer: Box<dyn FactorScorer>,
    ) -> Self {
        VerificationEngine {
            config,
            face_scorer,
            typing_scorer,
            stats: RwLock::new(VerificationStats::default()),
        }
    }

    /// Compare a facial sample against the stored reference.
    pub fn verify_face(&self, sample: &str, reference: &str) -> VerificationSignal {
        let confidence = self.face_scorer.score(sample, reference);
        let passed = confidence > self.config.face_match_threshold;
        self.record(passed);
        debug!("Face verification: confidence {:.3}, passed {}", confidence, passed);
        VerificationSignal {
            factor: FactorKind::Face,
            passed,
            score: confidence,
        }
    }

    /// Compare a keystroke-dynamics sample against the stored pattern.
    pub fn verify_typing(&self, sample: &str, reference: &str) -> VerificationSignal {
        let confidence = self.typing_scorer.score(sample, reference);
        let passed = confidence > self.config.typing_match_threshold;
        self.record(passed);
        debug!("Typing verification: confidence {:.3}, passed {}", confidence, passed);
        VerificationSignal {
            factor: FactorKind::Typing,
            passed,
            score: confidence,
        }
    }

    /// Check the login location against previously seen locations.
    pub fn verify_location(&self, location: &str, historical: &[String]) -> VerificationSignal {
        let known = historical.iter().any(|past| past == location);
        let risk = if known {
            self.config.known_location_risk
        } else {
            self.config.unknown_location_risk
        };
        let passed = risk < self.config.location_risk_threshold;
        self.record(passed);
        debug!("Location verification: risk {:.3}, passed {}", risk, passed);
        VerificationSignal {
            factor: FactorKind::Location,
            passed,
            score: risk,
        }
    }

    /// Check the device fingerprint against the trusted-device set.
    /// Containment rather than equality: a stored fingerprint may carry
    /// more detail than the probe.
    pub fn verify_device(&self, device: &str, trusted: &[String]) -> VerificationSignal {
        let is_trusted = trusted.iter().any(|entry| entry.contains(device));
        let risk = if is_trusted {
            self.config.trusted_device_risk
        } else {
            self.config.untrusted_device_risk
        };
        let passed = risk < self.config.device_risk_threshold;
        self.record(passed);
        debug!("Device verification: risk {:.3}, passed {}", risk, passed);
        VerificationSignal {
            factor: FactorKind::Device,
            passed,
            score: risk,
        }
    }

    /// Weighted overall risk across the factors that produced a signal.
    /// Confidence-type scores are inverted to risk before weighting.
    /// No signals at all yields the missing-evidence sentinel.
    pub fn aggregate(&self, signals: &HashMap<FactorKind, VerificationSignal>) -> f64 {
        let mut total_risk = 0.0;
        let mut total_weight = 0.0;

        for (factor, signal) in signals {
            let risk = if factor.is_confidence() {
                1.0 - signal.score
            } else {
                signal.score
            };
            total_risk += risk * factor.weight();
            total_weight += factor.weight();
        }

        if total_weight == 0.0 {
            return MISSING_EVIDENCE_RISK;
        }

        total_risk / total_weight
    }

    /// Normalized per-factor contributions to the overall risk.
    pub fn risk_breakdown(
        &self,
        signals: &HashMap<FactorKind, VerificationSignal>,
    ) -> HashMap<FactorKind, f64> {
        let total_weight: f64 = signals.keys().map(FactorKind::weight).sum();
        if total_weight == 0.0 {
            return HashMap::new();
        }

        signals
            .iter()
            .map(|(factor, signal)| {
                let risk = if factor.is_confidence() {
                    1.0 - signal.score
                } else {
                    signal.score
                };
                (*factor, risk * factor.weight() / total_weight)
            })
            .collect()
    }

    pub fn stats(&self) -> VerificationStats {
        *self.stats.read()
    }

    fn record(&self, passed: bool) {
        let mut stats = self.stats.write();
        stats.attempts += 1;
        if passed {
            stats.successes += 1;
        } else {
            stats.flagged += 1;
        }
    }
}
