// src/engine.rs - Login pipeline and transaction risk gate

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Timelike;
use log::{info, warn};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::config::Config;
use crate::error::EngineError;
use crate::models::{
    HistoricalLoginRecord, Transaction, TransactionId, TransactionStatus, UserId, UserRecord,
};
use crate::security::anomaly::{AnomalyDetector, AnomalyKind};
use crate::security::authentication::{
    AuthContext, AuthDecision, ChallengeToken, RiskAssessment, RiskEvaluator,
};
use crate::security::defense::{ActivityEvent, DefenseSystem};
use crate::security::password::PasswordService;
use crate::security::verification::{FactorKind, VerificationEngine, VerificationSignal};
use crate::store::{StoreError, UserStore};

/// Final verdict for a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginDecision {
    Granted,
    Challenged,
    Denied,
}

/// Everything decided about one login attempt
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub decision: LoginDecision,
    pub assessment: RiskAssessment,
    pub factor_risk: f64,
    pub factor_breakdown: HashMap<FactorKind, f64>,
    pub anomalies: Vec<AnomalyKind>,
    pub challenge: Option<ChallengeToken>,
}

/// Outcome of pushing a transfer through the risk gate
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Completed {
        transaction_id: TransactionId,
        risk_score: f64,
    },
    RequiresVerification {
        transaction_id: TransactionId,
        challenge: ChallengeToken,
    },
    FlaggedForReview {
        transaction_id: TransactionId,
        risk_score: f64,
    },
    Failed {
        transaction_id: TransactionId,
        reason: String,
    },
}

/// Wires the verification, evaluation, anomaly and defense components into
/// the two decision flows. One engine serves every concurrent session; the
/// defense system behind it is the single process-wide posture.
pub struct SecurityEngine {
    config: Arc<Config>,
    store: Arc<UserStore>,
    defense: Arc<DefenseSystem>,
    verifier: VerificationEngine,
    evaluator: RiskEvaluator,
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
}

impl SecurityEngine {
    pub fn new(config: Arc<Config>, store: Arc<UserStore>, defense: Arc<DefenseSystem>) -> Self {
        SecurityEngine {
            verifier: VerificationEngine::new(Arc::clone(&config)),
            evaluator: RiskEvaluator::new(Arc::clone(&config)),
            config,
            store,
            defense,
            transactions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a user with a hashed password and opening balance.
    pub fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        balance: Decimal,
    ) -> Result<UserRecord, EngineError> {
        let hash = PasswordService::hash_password(password)?;
        let record = UserRecord::new(username, email, hash, balance);
        self.store.put_user(record.clone())?;
        info!("Registered user {} ({})", record.username, record.user_id);
        Ok(record)
    }

    /// Check a password against the stored hash.
    pub fn verify_credentials(
        &self,
        user_id: &UserId,
        password: &str,
    ) -> Result<bool, EngineError> {
        let user = self
            .store
            .get_user(user_id)
            .ok_or(EngineError::UserNotFound(*user_id))?;
        Ok(PasswordService::verify_password(password, &user.password_hash)?)
    }

    /// Run one login attempt through the full pipeline: contextual risk,
    /// factor verification, anomaly comparison, combined decision.
    pub async fn authenticate(
        &self,
        user_id: &UserId,
        ctx: AuthContext,
    ) -> Result<LoginOutcome, EngineError> {
        let user = self
            .store
            .get_user(user_id)
            .ok_or(EngineError::UserNotFound(*user_id))?;

        // Contextual risk: are these normal conditions for a login?
        let assessment = self.evaluator.evaluate(&ctx);

        // Factor risk: is this the person they claim to be?
        let signals = self.collect_signals(&user, &ctx);
        let factor_risk = self.verifier.aggregate(&signals);
        let factor_breakdown = self.verifier.risk_breakdown(&signals);

        // Advisory pattern comparison
        let comparison = AnomalyDetector::compare_with_history(&user, &ctx);
        if comparison.is_suspicious {
            warn!(
                "Suspicious login pattern for {}: {} anomalies",
                user.username,
                comparison.anomalies.len()
            );
        }

        let decision = if assessment.decision == AuthDecision::Allow && factor_risk < 0.5 {
            LoginDecision::Granted
        } else if assessment.decision != AuthDecision::Deny && factor_risk < 0.7 {
            LoginDecision::Challenged
        } else {
            LoginDecision::Denied
        };

        let mut challenge = None;
        match decision {
            LoginDecision::Granted => {
                info!("Login granted for {}", user.username);
                self.record_login(&user, &ctx, true, factor_risk)?;
                // A device that just cleared verification joins the trusted set
                self.store
                    .add_trusted_device(user_id, &ctx.device_fingerprint)?;
            }
            LoginDecision::Challenged => {
                info!("Login for {} requires additional verification", user.username);
                challenge = Some(self.evaluator.request_additional_verification("sms"));
            }
            LoginDecision::Denied => {
                warn!(
                    "Login denied for {} (contextual {:.2}, factor {:.2})",
                    user.username, assessment.overall_risk, factor_risk
                );
                let attempts = Self::trailing_failures(&user) + 1;
                self.record_login(&user, &ctx, false, factor_risk)?;

                let detection = self.defense.detect_threat(&ActivityEvent::login(
                    &user.username,
                    &ctx.ip_address,
                    attempts,
                    factor_risk,
                ));
                if detection.detected {
                    warn!("Response plan: {}", detection.response_plan);
                }
                if factor_risk > 0.8 {
                    self.defense
                        .block_access(&ctx.ip_address, "High risk login attempt");
                    self.defense.alert_security_team(
                        &format!("Suspicious login attempt for user {}", user.username),
                        None,
                    );
                }
            }
        }

        Ok(LoginOutcome {
            decision,
            assessment,
            factor_risk,
            factor_breakdown,
            anomalies: comparison.anomalies,
            challenge,
        })
    }

    /// Redeem a login challenge token.
    pub fn verify_challenge(&self, token: &str) -> bool {
        self.evaluator.verify_challenge(token)
    }

    /// Risk score for a transfer from configurable rules. Exposed so the
    /// gate's inputs stay testable in isolation.
    pub fn transaction_risk(&self, tx: &Transaction) -> (f64, Vec<String>) {
        let mut risk = 0.0;
        let mut factors = Vec::new();

        if tx.amount > self.config.suspicious_transaction_threshold {
            factors.push("Large transaction amount".to_string());
            risk += 0.3;
        }

        let hour = tx.timestamp.time().hour();
        if hour >= self.config.unusual_hours_start && hour <= self.config.unusual_hours_end {
            factors.push("Unusual transaction time".to_string());
            risk += 0.2;
        }

        (f64::min(risk, 1.0), factors)
    }

    /// Push a transfer through the risk gate. Funds only move on the
    /// direct-completion path, after the state transition succeeds.
    pub async fn process_transfer(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferOutcome, EngineError> {
        let sender = self
            .store
            .get_user(sender_id)
            .ok_or(EngineError::UserNotFound(*sender_id))?;
        if self.store.get_user(receiver_id).is_none() {
            return Err(EngineError::UserNotFound(*receiver_id));
        }

        let mut tx = Transaction::new(*sender_id, *receiver_id, amount, description);

        // Funds are checked up front; the settle step re-checks under its
        // own lock before any balance moves.
        if sender.balance < amount {
            warn!("Transfer {} failed: insufficient balance", tx.id);
            tx.fail("Insufficient balance")?;
            return Ok(self.finish(tx, |id| TransferOutcome::Failed {
                transaction_id: id,
                reason: "Insufficient balance".to_string(),
            }));
        }

        let (risk, factors) = self.transaction_risk(&tx);
        tx.risk_score = risk;
        if !factors.is_empty() {
            info!("Transfer {} risk factors: {}", tx.id, factors.join(", "));
        }

        let detection = self
            .defense
            .detect_threat(&ActivityEvent::transfer(tx.id, amount, risk));

        if risk > 0.7 || detection.detected {
            warn!(
                "High risk transfer {} (score {:.2}); response plan: {}",
                tx.id, risk, detection.response_plan
            );
            tx.flag_for_review(risk)?;
            if risk > 0.8 {
                self.defense.alert_security_team(
                    &format!("High-risk transaction detected: {}", tx.id),
                    None,
                );
            }
            return Ok(self.finish(tx, |id| TransferOutcome::FlaggedForReview {
                transaction_id: id,
                risk_score: risk,
            }));
        }

        if risk > 0.4 {
            info!(
                "Medium risk transfer {} (score {:.2}); second factor required",
                tx.id, risk
            );
            let challenge = self.evaluator.request_additional_verification("sms");
            return Ok(self.finish(tx, |id| TransferOutcome::RequiresVerification {
                transaction_id: id,
                challenge,
            }));
        }

        self.settle_and_finish(tx, risk)
    }

    /// Complete a medium-risk transfer once its challenge is redeemed.
    /// The transaction stays pending when the token is rejected.
    pub async fn complete_with_verification(
        &self,
        transaction_id: &TransactionId,
        token: &str,
    ) -> Result<TransferOutcome, EngineError> {
        if !self.evaluator.verify_challenge(token) {
            return Err(EngineError::ChallengeRejected(
                "expired or unknown challenge token".to_string(),
            ));
        }

        let tx = {
            let transactions = self.transactions.read();
            transactions
                .get(transaction_id)
                .cloned()
                .ok_or(EngineError::TransactionNotFound(*transaction_id))?
        };
        let risk = tx.risk_score;
        self.settle_and_finish(tx, risk)
    }

    /// Resolve a reviewed transfer. Approval settles it; rejection fails it.
    /// The reviewing itself happens outside the engine.
    pub async fn resolve_transaction(
        &self,
        transaction_id: &TransactionId,
        approved: bool,
        note: &str,
    ) -> Result<TransferOutcome, EngineError> {
        let mut tx = {
            let transactions = self.transactions.read();
            transactions
                .get(transaction_id)
                .cloned()
                .ok_or(EngineError::TransactionNotFound(*transaction_id))?
        };

        if !approved {
            tx.resolve_review(false, note)?;
            return Ok(self.finish(tx, |id| TransferOutcome::Failed {
                transaction_id: id,
                reason: note.to_string(),
            }));
        }

        match self.store.settle_reviewed(&mut tx, note) {
            Ok(()) => {
                let risk = tx.risk_score;
                info!("Reviewed transfer {} approved and settled", tx.id);
                Ok(self.finish(tx, |id| TransferOutcome::Completed {
                    transaction_id: id,
                    risk_score: risk,
                }))
            }
            Err(StoreError::InsufficientFunds { .. }) => {
                tx.resolve_review(false, "Insufficient balance at review time")?;
                Ok(self.finish(tx, |id| TransferOutcome::Failed {
                    transaction_id: id,
                    reason: "Insufficient balance at review time".to_string(),
                }))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn transaction(&self, transaction_id: &TransactionId) -> Option<Transaction> {
        self.transactions.read().get(transaction_id).cloned()
    }

    pub fn verification_stats(&self) -> crate::security::verification::VerificationStats {
        self.verifier.stats()
    }

    pub fn auth_history(&self) -> Vec<crate::security::authentication::AuthAuditEntry> {
        self.evaluator.history()
    }

    fn settle_and_finish(
        &self,
        mut tx: Transaction,
        risk: f64,
    ) -> Result<TransferOutcome, EngineError> {
        match self.store.settle(&mut tx) {
            Ok(()) => {
                info!("Transfer {} completed (risk {:.2})", tx.id, risk);
                Ok(self.finish(tx, |id| TransferOutcome::Completed {
                    transaction_id: id,
                    risk_score: risk,
                }))
            }
            Err(StoreError::InsufficientFunds { .. }) => {
                warn!("Transfer {} failed during settlement: insufficient balance", tx.id);
                tx.fail("Insufficient balance")?;
                Ok(self.finish(tx, |id| TransferOutcome::Failed {
                    transaction_id: id,
                    reason: "Insufficient balance".to_string(),
                }))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn finish(
        &self,
        tx: Transaction,
        outcome: impl FnOnce(TransactionId) -> TransferOutcome,
    ) -> TransferOutcome {
        let id = tx.id;
        self.transactions.write().insert(id, tx);
        outcome(id)
    }

    fn collect_signals(
        &self,
        user: &UserRecord,
        ctx: &AuthContext,
    ) -> HashMap<FactorKind, VerificationSignal> {
        let mut signals = HashMap::new();

        if let (Some(sample), Some(reference)) = (&ctx.face_sample, &user.face_reference) {
            signals.insert(FactorKind::Face, self.verifier.verify_face(sample, reference));
        }
        if let (Some(sample), Some(reference)) = (&ctx.typing_sample, &user.typing_reference) {
            signals.insert(
                FactorKind::Typing,
                self.verifier.verify_typing(sample, reference),
            );
        }

        let locations = user.historical_locations();
        signals.insert(
            FactorKind::Location,
            self.verifier.verify_location(&ctx.location, &locations),
        );
        signals.insert(
            FactorKind::Device,
            self.verifier
                .verify_device(&ctx.device_fingerprint, &user.trusted_devices),
        );

        signals
    }

    fn record_login(
        &self,
        user: &UserRecord,
        ctx: &AuthContext,
        success: bool,
        risk: f64,
    ) -> Result<(), EngineError> {
        self.store.append_login_record(
            &user.user_id,
            HistoricalLoginRecord {
                timestamp: ctx.timestamp,
                device_fingerprint: ctx.device_fingerprint.clone(),
                location: ctx.location.clone(),
                ip_address: ctx.ip_address.clone(),
                success,
                risk_level: Some(risk),
            },
        )?;
        Ok(())
    }

    /// Consecutive failed logins at the tail of the user's history.
    fn trailing_failures(user: &UserRecord) -> u32 {
        user.login_history
            .iter()
            .rev()
            .take_while(|record| !record.success)
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::defense::ThreatLevel;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: SecurityEngine,
        defense: Arc<DefenseSystem>,
        store: Arc<UserStore>,
        sender: UserRecord,
        receiver: UserRecord,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(Config::default());
        let store = Arc::new(UserStore::new());
        let defense = Arc::new(DefenseSystem::new(Arc::clone(&config)));
        let engine = SecurityEngine::new(config, Arc::clone(&store), Arc::clone(&defense));

        let sender = engine
            .register_user("angel_abubakar", "angel@example.com", "Password@123", dec!(5000))
            .unwrap();
        let receiver = engine
            .register_user("ahmad_ali", "ahmad@example.com", "Password@456", dec!(7500))
            .unwrap();

        Fixture {
            engine,
            defense,
            store,
            sender,
            receiver,
        }
    }

    fn enroll(fixture: &Fixture) -> UserRecord {
        let mut user = fixture.store.get_user(&fixture.sender.user_id).unwrap();
        user.face_reference = Some("encoded_face_reference_for_angel".to_string());
        user.typing_reference = Some("angel_typing_pattern_data".to_string());
        user.trusted_devices
            .push("Windows 11, Chrome 98.0.4758.102".to_string());
        for _ in 0..3 {
            user.login_history.push(HistoricalLoginRecord {
                timestamp: Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap(),
                device_fingerprint: "Windows 11, Chrome 98.0.4758.102".to_string(),
                location: "33.5102,36.29128".to_string(),
                ip_address: "192.168.1.1".to_string(),
                success: true,
                risk_level: Some(0.1),
            });
        }
        fixture.store.put_user(user.clone()).unwrap();
        user
    }

    fn daytime_context(user: &UserRecord) -> AuthContext {
        let mut ctx = AuthContext::new(
            user.username.clone(),
            "Windows 11, Chrome 98.0.4758.102",
            "33.5102,36.29128",
            "192.168.1.1",
        );
        ctx.timestamp = Utc.with_ymd_and_hms(2026, 3, 14, 14, 0, 0).unwrap();
        ctx.face_sample = Some("encoded_face_reference_for_angel".to_string());
        ctx.typing_sample = Some("angel_typing_pattern_data".to_string());
        ctx
    }

    #[tokio::test]
    async fn test_legitimate_login_is_granted() {
        let fixture = fixture();
        let user = enroll(&fixture);
        let ctx = daytime_context(&user);

        let outcome = fixture
            .engine
            .authenticate(&user.user_id, ctx)
            .await
            .unwrap();

        assert_eq!(outcome.decision, LoginDecision::Granted);
        assert!(outcome.factor_risk < 0.5);
        assert!(outcome.anomalies.is_empty());

        // The successful attempt lands in the login history
        let stored = fixture.store.get_user(&user.user_id).unwrap();
        assert_eq!(stored.login_history.len(), 4);
        assert!(stored.login_history.last().unwrap().success);
    }

    #[tokio::test]
    async fn test_contextual_deny_without_samples_at_night() {
        let fixture = fixture();
        let user = enroll(&fixture);

        let mut ctx = AuthContext::new(
            user.username.clone(),
            "Unknown Device",
            "1.2921,36.8219",
            "203.0.113.42",
        );
        // Odd hour, no biometric samples: contextual risk alone denies
        ctx.timestamp = Utc.with_ymd_and_hms(2026, 3, 14, 3, 0, 0).unwrap();

        let outcome = fixture
            .engine
            .authenticate(&user.user_id, ctx)
            .await
            .unwrap();

        assert_eq!(outcome.decision, LoginDecision::Denied);
        assert_eq!(outcome.assessment.decision, AuthDecision::Deny);
        assert!(outcome.anomalies.contains(&AnomalyKind::UntrustedDevice));
        assert!(outcome.anomalies.contains(&AnomalyKind::UnusualLocation));

        // Location/device factor risk alone stays under the blocking bar
        assert!(outcome.factor_risk < 0.8);
        assert!(!fixture.defense.is_blocked("203.0.113.42"));

        let stored = fixture.store.get_user(&user.user_id).unwrap();
        assert!(!stored.login_history.last().unwrap().success);
    }

    #[tokio::test]
    async fn test_identity_mismatch_blocks_the_source() {
        let fixture = fixture();
        let user = enroll(&fixture);

        let mut ctx = AuthContext::new(
            user.username.clone(),
            "Unknown Device",
            "1.2921,36.8219",
            "203.0.113.42",
        );
        ctx.timestamp = Utc.with_ymd_and_hms(2026, 3, 14, 14, 0, 0).unwrap();
        // Samples present but nothing like the stored references
        ctx.face_sample = Some("xxxxxxxx".to_string());
        ctx.typing_sample = Some("qqqqqqqq".to_string());

        let outcome = fixture
            .engine
            .authenticate(&user.user_id, ctx)
            .await
            .unwrap();

        // Context looks normal, identity does not
        assert_eq!(outcome.assessment.decision, AuthDecision::Allow);
        assert_eq!(outcome.decision, LoginDecision::Denied);
        assert!(outcome.factor_risk > 0.8);

        // High factor risk blocks the source address and raises an alert
        assert!(fixture.defense.is_blocked("203.0.113.42"));
        assert!(!fixture.defense.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let fixture = fixture();
        let ctx = AuthContext::new("ghost", "Device", "0,0", "10.0.0.1");
        let err = fixture
            .engine
            .authenticate(&uuid::Uuid::new_v4(), ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_low_risk_transfer_completes_and_settles() {
        let fixture = fixture();
        let mut tx = Transaction::new(
            fixture.sender.user_id,
            fixture.receiver.user_id,
            dec!(500),
            "coffee fund",
        );
        tx.timestamp = Utc.with_ymd_and_hms(2026, 3, 14, 14, 0, 0).unwrap();
        assert!(fixture.engine.transaction_risk(&tx).0 <= 0.4);

        let outcome = fixture
            .engine
            .process_transfer(
                &fixture.sender.user_id,
                &fixture.receiver.user_id,
                dec!(500),
                "coffee fund",
            )
            .await
            .unwrap();

        let id = match outcome {
            TransferOutcome::Completed { transaction_id, .. } => transaction_id,
            other => panic!("expected completion, got {other:?}"),
        };

        assert_eq!(
            fixture.engine.transaction(&id).unwrap().status,
            TransactionStatus::Completed
        );
        assert_eq!(fixture.store.balance_of(&fixture.sender.user_id).unwrap(), dec!(4500));
        assert_eq!(
            fixture.store.balance_of(&fixture.receiver.user_id).unwrap(),
            dec!(8000)
        );
    }

    #[tokio::test]
    async fn test_insufficient_funds_fails_without_balance_change() {
        let fixture = fixture();

        let outcome = fixture
            .engine
            .process_transfer(
                &fixture.sender.user_id,
                &fixture.receiver.user_id,
                dec!(6000),
                "over budget",
            )
            .await
            .unwrap();

        let id = match outcome {
            TransferOutcome::Failed { transaction_id, reason } => {
                assert_eq!(reason, "Insufficient balance");
                transaction_id
            }
            other => panic!("expected failure, got {other:?}"),
        };

        assert_eq!(
            fixture.engine.transaction(&id).unwrap().status,
            TransactionStatus::Failed
        );
        assert_eq!(fixture.store.balance_of(&fixture.sender.user_id).unwrap(), dec!(5000));
        assert_eq!(
            fixture.store.balance_of(&fixture.receiver.user_id).unwrap(),
            dec!(7500)
        );
    }

    #[tokio::test]
    async fn test_large_transfer_is_flagged_for_review() {
        let fixture = fixture();
        // Bump the balance so only risk policy is in play
        let mut sender = fixture.store.get_user(&fixture.sender.user_id).unwrap();
        sender.balance = dec!(100000);
        fixture.store.put_user(sender).unwrap();

        let outcome = fixture
            .engine
            .process_transfer(
                &fixture.sender.user_id,
                &fixture.receiver.user_id,
                dec!(50000),
                "suspicious amount",
            )
            .await
            .unwrap();

        let id = match outcome {
            TransferOutcome::FlaggedForReview { transaction_id, .. } => transaction_id,
            other => panic!("expected review flag, got {other:?}"),
        };

        // The transfer sits under review and no funds moved
        assert_eq!(
            fixture.engine.transaction(&id).unwrap().status,
            TransactionStatus::UnderReview
        );
        assert_eq!(
            fixture.store.balance_of(&fixture.sender.user_id).unwrap(),
            dec!(100000)
        );
        // The deterministic suspicion rule also raised the global posture
        assert!(fixture.defense.threat_level() >= ThreatLevel::Medium);
    }

    #[tokio::test]
    async fn test_reviewed_transfer_can_be_approved_and_settled() {
        let fixture = fixture();
        let mut sender = fixture.store.get_user(&fixture.sender.user_id).unwrap();
        sender.balance = dec!(100000);
        fixture.store.put_user(sender).unwrap();

        let outcome = fixture
            .engine
            .process_transfer(
                &fixture.sender.user_id,
                &fixture.receiver.user_id,
                dec!(50000),
                "supplier invoice",
            )
            .await
            .unwrap();
        let id = match outcome {
            TransferOutcome::FlaggedForReview { transaction_id, .. } => transaction_id,
            other => panic!("expected review flag, got {other:?}"),
        };

        let resolved = fixture
            .engine
            .resolve_transaction(&id, true, "verified with customer")
            .await
            .unwrap();
        assert!(matches!(resolved, TransferOutcome::Completed { .. }));
        assert_eq!(
            fixture.store.balance_of(&fixture.sender.user_id).unwrap(),
            dec!(50000)
        );

        // A resolved review cannot be resolved again
        let err = fixture
            .engine
            .resolve_transaction(&id, false, "second look")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transition(_)));
    }

    /// Engine whose unusual-hours window covers the whole day, so the
    /// +0.2 time penalty applies no matter when the test runs.
    fn always_odd_hours_engine(
        challenge_validity_secs: i64,
    ) -> (SecurityEngine, Arc<UserStore>, UserRecord, UserRecord) {
        let config = Arc::new(Config {
            unusual_hours_start: 0,
            unusual_hours_end: 23,
            challenge_validity_secs,
            ..Config::default()
        });
        let store = Arc::new(UserStore::new());
        let defense = Arc::new(DefenseSystem::new(Arc::clone(&config)));
        let engine = SecurityEngine::new(config, Arc::clone(&store), defense);

        let sender = engine
            .register_user("angel_abubakar", "angel@example.com", "Password@123", dec!(9000))
            .unwrap();
        let receiver = engine
            .register_user("ahmad_ali", "ahmad@example.com", "Password@456", dec!(0))
            .unwrap();
        (engine, store, sender, receiver)
    }

    #[tokio::test]
    async fn test_medium_risk_transfer_requires_second_factor() {
        let (engine, store, sender, receiver) = always_odd_hours_engine(300);

        // Large amount (+0.3) and odd hour (+0.2) put the risk at 0.5,
        // inside the second-factor band
        let outcome = engine
            .process_transfer(&sender.user_id, &receiver.user_id, dec!(6000), "rent")
            .await
            .unwrap();

        let (transaction_id, challenge) = match outcome {
            TransferOutcome::RequiresVerification {
                transaction_id,
                challenge,
            } => (transaction_id, challenge),
            other => panic!("expected verification request, got {other:?}"),
        };

        // Pending until the challenge is redeemed; no funds moved yet
        assert_eq!(
            engine.transaction(&transaction_id).unwrap().status,
            TransactionStatus::Pending
        );
        assert_eq!(store.balance_of(&sender.user_id).unwrap(), dec!(9000));

        let completed = engine
            .complete_with_verification(&transaction_id, &challenge.token)
            .await
            .unwrap();
        assert!(matches!(completed, TransferOutcome::Completed { .. }));
        assert_eq!(store.balance_of(&sender.user_id).unwrap(), dec!(3000));
        assert_eq!(store.balance_of(&receiver.user_id).unwrap(), dec!(6000));
    }

    #[tokio::test]
    async fn test_stale_challenge_leaves_transfer_pending() {
        let (engine, store, sender, receiver) = always_odd_hours_engine(0);

        let outcome = engine
            .process_transfer(&sender.user_id, &receiver.user_id, dec!(6000), "rent")
            .await
            .unwrap();

        let (transaction_id, challenge) = match outcome {
            TransferOutcome::RequiresVerification {
                transaction_id,
                challenge,
            } => (transaction_id, challenge),
            other => panic!("expected verification request, got {other:?}"),
        };

        std::thread::sleep(std::time::Duration::from_millis(5));
        let err = engine
            .complete_with_verification(&transaction_id, &challenge.token)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ChallengeRejected(_)));
        assert_eq!(
            engine.transaction(&transaction_id).unwrap().status,
            TransactionStatus::Pending
        );
        assert_eq!(store.balance_of(&sender.user_id).unwrap(), dec!(9000));
    }

    #[tokio::test]
    async fn test_credentials_roundtrip() {
        let fixture = fixture();
        assert!(fixture
            .engine
            .verify_credentials(&fixture.sender.user_id, "Password@123")
            .unwrap());
        assert!(!fixture
            .engine
            .verify_credentials(&fixture.sender.user_id, "WrongPassword")
            .unwrap());
    }
}
