// src/models.rs - Core domain records and the transaction state machine

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// Define core types
pub type UserId = Uuid;
pub type TransactionId = Uuid;
pub type DeviceFingerprint = String;

/// Status of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Blocked,
    UnderReview,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Blocked => "blocked",
            TransactionStatus::UnderReview => "under_review",
        }
    }

    /// Terminal states admit no further transition except review resolution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Failed | TransactionStatus::Blocked
        )
    }
}

/// Transition guard violation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("cannot {action} a transaction in state {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
}

/// A financial transfer between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
    pub description: String,
    pub risk_score: f64,
    pub metadata: HashMap<String, String>,
}

impl Transaction {
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Transaction {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            amount,
            timestamp: Utc::now(),
            status: TransactionStatus::Pending,
            description: description.into(),
            risk_score: 0.0,
            metadata: HashMap::new(),
        }
    }

    /// Mark the transfer completed. Only valid from `Pending`.
    pub fn complete(&mut self) -> Result<(), TransactionError> {
        if self.status != TransactionStatus::Pending {
            return Err(TransactionError::InvalidTransition {
                from: self.status.as_str(),
                action: "complete",
            });
        }
        self.status = TransactionStatus::Completed;
        self.metadata
            .insert("completed_at".to_string(), Utc::now().to_rfc3339());
        Ok(())
    }

    /// Mark the transfer failed. Valid from any state except `Completed`,
    /// so a blocked or reviewed transfer can still be closed out.
    pub fn fail(&mut self, reason: &str) -> Result<(), TransactionError> {
        if self.status == TransactionStatus::Completed {
            return Err(TransactionError::InvalidTransition {
                from: self.status.as_str(),
                action: "fail",
            });
        }
        self.status = TransactionStatus::Failed;
        self.metadata
            .insert("failed_at".to_string(), Utc::now().to_rfc3339());
        self.metadata
            .insert("failure_reason".to_string(), reason.to_string());
        Ok(())
    }

    /// Block the transfer on security grounds. Only valid from `Pending`.
    pub fn block(&mut self, reason: &str) -> Result<(), TransactionError> {
        if self.status != TransactionStatus::Pending {
            return Err(TransactionError::InvalidTransition {
                from: self.status.as_str(),
                action: "block",
            });
        }
        self.status = TransactionStatus::Blocked;
        self.metadata
            .insert("blocked_at".to_string(), Utc::now().to_rfc3339());
        self.metadata
            .insert("block_reason".to_string(), reason.to_string());
        Ok(())
    }

    /// Send the transfer to manual review. Only valid from `Pending`.
    pub fn flag_for_review(&mut self, risk_score: f64) -> Result<(), TransactionError> {
        if self.status != TransactionStatus::Pending {
            return Err(TransactionError::InvalidTransition {
                from: self.status.as_str(),
                action: "flag_for_review",
            });
        }
        self.status = TransactionStatus::UnderReview;
        self.risk_score = risk_score;
        self.metadata
            .insert("flagged_at".to_string(), Utc::now().to_rfc3339());
        self.metadata
            .insert("risk_score".to_string(), format!("{risk_score:.4}"));
        Ok(())
    }

    /// Close out a manual review. Only valid from `UnderReview`.
    pub fn resolve_review(&mut self, approved: bool, note: &str) -> Result<(), TransactionError> {
        if self.status != TransactionStatus::UnderReview {
            return Err(TransactionError::InvalidTransition {
                from: self.status.as_str(),
                action: "resolve_review",
            });
        }
        self.status = if approved {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        self.metadata
            .insert("reviewed_at".to_string(), Utc::now().to_rfc3339());
        self.metadata
            .insert("review_note".to_string(), note.to_string());
        Ok(())
    }
}

/// One historical login, appended per attempt and never rewritten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalLoginRecord {
    pub timestamp: DateTime<Utc>,
    pub device_fingerprint: DeviceFingerprint,
    pub location: String,
    pub ip_address: String,
    pub success: bool,
    pub risk_level: Option<f64>,
}

/// Stored account record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub face_reference: Option<String>,
    pub typing_reference: Option<String>,
    pub trusted_devices: Vec<DeviceFingerprint>,
    pub login_history: Vec<HistoricalLoginRecord>,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        balance: Decimal,
    ) -> Self {
        UserRecord {
            user_id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            phone: None,
            password_hash: password_hash.into(),
            face_reference: None,
            typing_reference: None,
            trusted_devices: Vec::new(),
            login_history: Vec::new(),
            balance,
            created_at: Utc::now(),
        }
    }

    /// Locations seen in past logins, in insertion order.
    pub fn historical_locations(&self) -> Vec<String> {
        self.login_history
            .iter()
            .map(|r| r.location.clone())
            .collect()
    }
}
