// src/error.rs - Engine-level error taxonomy

use thiserror::Error;

use crate::models::{TransactionError, TransactionId, UserId};
use crate::security::password::PasswordError;
use crate::store::StoreError;

/// Failures surfaced by the engine. Every variant is recoverable by the
/// caller; nothing here aborts the process.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("challenge rejected: {0}")]
    ChallengeRejected(String),

    #[error(transparent)]
    Transition(#[from] TransactionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}
