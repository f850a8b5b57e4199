// src/demo.rs - Seeded demo data and simulated end-to-end flows

use anyhow::Result;
use chrono::{Duration, Utc};
use log::info;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::engine::{LoginDecision, SecurityEngine, TransferOutcome};
use crate::models::{HistoricalLoginRecord, UserRecord};
use crate::security::authentication::AuthContext;
use crate::security::defense::{DefenseSystem, ScanReport};
use crate::store::UserStore;

const TRUSTED_DEVICE: &str = "Windows 11, Chrome 98.0.4758.102";
const HOME_LOCATION: &str = "33.5102,36.29128";
const HOME_IP: &str = "192.168.1.1";

/// Demo accounts seeded by `setup_demo_data`
pub struct DemoUsers {
    pub angel: UserRecord,
    pub ahmad: UserRecord,
}

/// Seed two demo accounts with hashed passwords, biometric references, a
/// trusted device and a few days of login history.
pub fn setup_demo_data(engine: &SecurityEngine, store: &UserStore) -> Result<DemoUsers> {
    info!("Setting up demo data");

    let angel = seed_user(
        engine,
        store,
        "angel_abubakar",
        "angel_abubakar@gmail.com",
        "Password@123",
        "base64_encoded_face_data_for_angel",
        "angel_typing_pattern_data",
        dec!(5000),
    )?;
    let ahmad = seed_user(
        engine,
        store,
        "ahmad_ali",
        "ahmad.ali@hotmail.com",
        "Password@456",
        "base64_encoded_face_data_for_ahmad",
        "ahmad_typing_pattern_data",
        dec!(7500),
    )?;

    Ok(DemoUsers { angel, ahmad })
}

#[allow(clippy::too_many_arguments)]
fn seed_user(
    engine: &SecurityEngine,
    store: &UserStore,
    username: &str,
    email: &str,
    password: &str,
    face_reference: &str,
    typing_reference: &str,
    balance: Decimal,
) -> Result<UserRecord> {
    let mut user = engine.register_user(username, email, password, balance)?;
    user.face_reference = Some(face_reference.to_string());
    user.typing_reference = Some(typing_reference.to_string());
    store.put_user(user.clone())?;

    store.add_trusted_device(&user.user_id, TRUSTED_DEVICE)?;
    for days_ago in 1..=3 {
        store.append_login_record(
            &user.user_id,
            HistoricalLoginRecord {
                timestamp: Utc::now() - Duration::days(days_ago),
                device_fingerprint: TRUSTED_DEVICE.to_string(),
                location: HOME_LOCATION.to_string(),
                ip_address: HOME_IP.to_string(),
                success: true,
                risk_level: Some(0.1),
            },
        )?;
    }

    info!("Added demo user: {} ({})", username, user.user_id);
    Ok(engine_user(store, &user))
}

fn engine_user(store: &UserStore, user: &UserRecord) -> UserRecord {
    store.get_user(&user.user_id).unwrap_or_else(|| user.clone())
}

/// Simulate one login attempt, legitimate or suspicious.
pub async fn simulate_login(
    engine: &SecurityEngine,
    user: &UserRecord,
    legitimate: bool,
) -> Result<()> {
    info!(
        "Simulating {} login for {}",
        if legitimate { "legitimate" } else { "suspicious" },
        user.username
    );

    let mut ctx = if legitimate {
        let mut ctx = AuthContext::new(
            user.username.clone(),
            TRUSTED_DEVICE,
            HOME_LOCATION,
            HOME_IP,
        );
        ctx.face_sample = user.face_reference.clone();
        ctx.typing_sample = user.typing_reference.clone();
        ctx
    } else {
        AuthContext::new(
            user.username.clone(),
            "Unknown Device",
            "1.2921,36.8219",
            "203.0.113.42",
        )
    };
    ctx.timestamp = Utc::now();

    let outcome = engine.authenticate(&user.user_id, ctx).await?;
    info!(
        "Login decision for {}: {:?} (contextual {:.2}, factor {:.2})",
        user.username, outcome.decision, outcome.assessment.overall_risk, outcome.factor_risk
    );
    if !outcome.anomalies.is_empty() {
        info!(
            "Detected anomalies: {}",
            outcome
                .anomalies
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if outcome.decision == LoginDecision::Challenged {
        if let Some(challenge) = &outcome.challenge {
            info!(
                "Verification requested via {}, expires at {}",
                challenge.method, challenge.expires_at
            );
        }
    }

    Ok(())
}

/// Simulate a transfer between the demo accounts. A suspicious run bumps
/// the amount past the screening threshold.
pub async fn simulate_transfer(
    engine: &SecurityEngine,
    sender: &UserRecord,
    receiver: &UserRecord,
    amount: Decimal,
    legitimate: bool,
) -> Result<()> {
    let amount = if legitimate { amount } else { dec!(50000) };
    info!(
        "Simulating {} transfer of ${} from {} to {}",
        if legitimate { "legitimate" } else { "suspicious" },
        amount,
        sender.username,
        receiver.username
    );

    let outcome = engine
        .process_transfer(
            &sender.user_id,
            &receiver.user_id,
            amount,
            &format!("Payment from {} to {}", sender.username, receiver.username),
        )
        .await?;

    match outcome {
        TransferOutcome::Completed { transaction_id, risk_score } => {
            info!("Transaction {transaction_id} completed (risk {risk_score:.2})");
        }
        TransferOutcome::RequiresVerification { transaction_id, challenge } => {
            info!("Transaction {transaction_id} awaiting {} verification", challenge.method);
            // The demo user always confirms promptly
            let confirmed = engine
                .complete_with_verification(&transaction_id, &challenge.token)
                .await?;
            info!("After verification: {confirmed:?}");
        }
        TransferOutcome::FlaggedForReview { transaction_id, risk_score } => {
            info!("Transaction {transaction_id} flagged for review (risk {risk_score:.2})");
        }
        TransferOutcome::Failed { transaction_id, reason } => {
            info!("Transaction {transaction_id} failed: {reason}");
        }
    }

    Ok(())
}

/// Run a sweep with stub scanner findings standing in for the external
/// scanner collaborator.
pub fn run_scan(defense: &DefenseSystem) {
    let mut rng = rand::thread_rng();
    let report = ScanReport {
        vulnerabilities_found: rng.gen_range(0..=3),
        suspicious_patterns: rng.gen_range(0..=2),
    };

    let outcome = defense.run_security_scan(report);
    info!(
        "Scan completed at {}: {} vulnerabilities, {} suspicious patterns",
        outcome.scan_time, outcome.vulnerabilities_found, outcome.suspicious_patterns
    );
    info!(
        "Threat level: {:?}; response plan: {}",
        outcome.threat_level, outcome.response_plan
    );
}

/// The full demo: seed data, a clean and a suspicious login, a clean and a
/// suspicious transfer, then a sweep.
pub async fn run_demo(
    engine: &SecurityEngine,
    store: &UserStore,
    defense: &DefenseSystem,
) -> Result<()> {
    let users = setup_demo_data(engine, store)?;
    info!("Store now holds {} users", store.user_count());

    simulate_login(engine, &users.angel, true).await?;
    simulate_login(engine, &users.angel, false).await?;

    simulate_transfer(engine, &users.angel, &users.ahmad, dec!(500), true).await?;
    simulate_transfer(engine, &users.angel, &users.ahmad, dec!(500), false).await?;

    run_scan(defense);

    let status = defense.status();
    info!(
        "Final posture: {:?}; {} threats on record, {} alerts, {} blocked addresses",
        status.threat_level, status.active_threats, status.security_alerts, status.blocked_ips
    );

    let stats = engine.verification_stats();
    info!(
        "Factor verifications: {} attempts, {} passed, {} flagged",
        stats.attempts, stats.successes, stats.flagged
    );
    info!("Authentication audit entries: {}", engine.auth_history().len());

    Ok(())
}
