// src/store/mod.rs - User record store with optional JSON snapshot persistence

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::{debug, info};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{
    HistoricalLoginRecord, Transaction, TransactionError, UserId, UserRecord,
};

/// Store failure
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        balance: Decimal,
        requested: Decimal,
    },

    #[error(transparent)]
    Transition(#[from] TransactionError),

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    users: HashMap<UserId, UserRecord>,
}

/// Keyed user-record store. All reads return clones; mutations happen
/// under the write lock and flush the snapshot before releasing it.
pub struct UserStore {
    path: Option<PathBuf>,
    data: RwLock<StoreData>,
}

impl UserStore {
    /// In-memory store with no persistence.
    pub fn new() -> Self {
        UserStore {
            path: None,
            data: RwLock::new(StoreData::default()),
        }
    }

    /// Store backed by a JSON snapshot, loaded if the file exists.
    pub fn with_snapshot(path: PathBuf) -> Result<Self, StoreError> {
        let data = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let data: StoreData = serde_json::from_str(&raw)?;
            info!("Loaded {} user records from {}", data.users.len(), path.display());
            data
        } else {
            debug!("Snapshot {} does not exist, starting empty", path.display());
            StoreData::default()
        };

        Ok(UserStore {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Insert or replace a user record.
    pub fn put_user(&self, record: UserRecord) -> Result<(), StoreError> {
        let mut data = self.data.write();
        data.users.insert(record.user_id, record);
        self.persist(&data)
    }

    pub fn get_user(&self, user_id: &UserId) -> Option<UserRecord> {
        self.data.read().users.get(user_id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.data.read().users.len()
    }

    /// Append one login record to the user's history. Insertion order is
    /// preserved; history entries are never rewritten.
    pub fn append_login_record(
        &self,
        user_id: &UserId,
        record: HistoricalLoginRecord,
    ) -> Result<(), StoreError> {
        let mut data = self.data.write();
        let user = data
            .users
            .get_mut(user_id)
            .ok_or(StoreError::UserNotFound(*user_id))?;
        user.login_history.push(record);
        self.persist(&data)
    }

    /// Add a trusted device fingerprint. Adding the same fingerprint twice
    /// leaves a single entry.
    pub fn add_trusted_device(&self, user_id: &UserId, device: &str) -> Result<(), StoreError> {
        let mut data = self.data.write();
        let user = data
            .users
            .get_mut(user_id)
            .ok_or(StoreError::UserNotFound(*user_id))?;
        if !user.trusted_devices.iter().any(|d| d == device) {
            user.trusted_devices.push(device.to_string());
        }
        self.persist(&data)
    }

    pub fn balance_of(&self, user_id: &UserId) -> Result<Decimal, StoreError> {
        self.data
            .read()
            .users
            .get(user_id)
            .map(|user| user.balance)
            .ok_or(StoreError::UserNotFound(*user_id))
    }

    /// Complete a pending transfer and move the funds, all under one write
    /// lock: the funds check happens first, the state transition second and
    /// the balance mutation last, so a transfer that does not complete
    /// never moves money and a completed transfer always does.
    pub fn settle(&self, tx: &mut Transaction) -> Result<(), StoreError> {
        let mut data = self.data.write();
        self.checked_transfer(&mut data, tx, |tx| tx.complete())
    }

    /// Settle a reviewed transfer that a reviewer approved. Same atomicity
    /// as `settle`, entered from `UnderReview` instead of `Pending`.
    pub fn settle_reviewed(&self, tx: &mut Transaction, note: &str) -> Result<(), StoreError> {
        let mut data = self.data.write();
        self.checked_transfer(&mut data, tx, |tx| tx.resolve_review(true, note))
    }

    fn checked_transfer(
        &self,
        data: &mut StoreData,
        tx: &mut Transaction,
        transition: impl FnOnce(&mut Transaction) -> Result<(), TransactionError>,
    ) -> Result<(), StoreError> {
        if !data.users.contains_key(&tx.receiver_id) {
            return Err(StoreError::UserNotFound(tx.receiver_id));
        }
        let balance = data
            .users
            .get(&tx.sender_id)
            .map(|user| user.balance)
            .ok_or(StoreError::UserNotFound(tx.sender_id))?;
        if balance < tx.amount {
            return Err(StoreError::InsufficientFunds {
                balance,
                requested: tx.amount,
            });
        }

        transition(tx)?;

        if let Some(sender) = data.users.get_mut(&tx.sender_id) {
            sender.balance -= tx.amount;
        }
        if let Some(receiver) = data.users.get_mut(&tx.receiver_id) {
            receiver.balance += tx.amount;
        }
        debug!(
            "Settled transaction {}: {} -> {}, amount {}",
            tx.id, tx.sender_id, tx.receiver_id, tx.amount
        );
        self.persist(data)
    }

    fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string_pretty(data)?;
            fs::write(path, raw)?;
        }
        Ok(())
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seeded_store() -> (UserStore, UserId, UserId) {
        let store = UserStore::new();
        let sender = UserRecord::new("angel_abubakar", "angel@example.com", "hash", dec!(5000));
        let receiver = UserRecord::new("ahmad_ali", "ahmad@example.com", "hash", dec!(7500));
        let sender_id = sender.user_id;
        let receiver_id = receiver.user_id;
        store.put_user(sender).unwrap();
        store.put_user(receiver).unwrap();
        (store, sender_id, receiver_id)
    }

    #[test]
    fn test_get_missing_user_is_absent() {
        let store = UserStore::new();
        assert!(store.get_user(&uuid::Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_add_trusted_device_is_idempotent() {
        let (store, sender_id, _) = seeded_store();

        store
            .add_trusted_device(&sender_id, "Windows 11, Chrome 98.0.4758.102")
            .unwrap();
        store
            .add_trusted_device(&sender_id, "Windows 11, Chrome 98.0.4758.102")
            .unwrap();

        let user = store.get_user(&sender_id).unwrap();
        assert_eq!(user.trusted_devices.len(), 1);
    }

    #[test]
    fn test_login_records_preserve_order() {
        let (store, sender_id, _) = seeded_store();

        for location in ["A", "B", "C"] {
            store
                .append_login_record(
                    &sender_id,
                    HistoricalLoginRecord {
                        timestamp: chrono::Utc::now(),
                        device_fingerprint: "Test Device".to_string(),
                        location: location.to_string(),
                        ip_address: "192.168.1.1".to_string(),
                        success: true,
                        risk_level: Some(0.1),
                    },
                )
                .unwrap();
        }

        let user = store.get_user(&sender_id).unwrap();
        assert_eq!(user.historical_locations(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_settle_moves_funds_atomically() {
        let (store, sender_id, receiver_id) = seeded_store();
        let mut tx = Transaction::new(sender_id, receiver_id, dec!(500), "payment");

        store.settle(&mut tx).unwrap();

        assert_eq!(tx.status, crate::models::TransactionStatus::Completed);
        assert_eq!(store.balance_of(&sender_id).unwrap(), dec!(4500));
        assert_eq!(store.balance_of(&receiver_id).unwrap(), dec!(8000));
    }

    #[test]
    fn test_settle_insufficient_funds_is_all_or_nothing() {
        let (store, sender_id, receiver_id) = seeded_store();
        let mut tx = Transaction::new(sender_id, receiver_id, dec!(50000), "too large");

        let err = store.settle(&mut tx).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { .. }));

        // No transition, no balance movement
        assert_eq!(tx.status, crate::models::TransactionStatus::Pending);
        assert_eq!(store.balance_of(&sender_id).unwrap(), dec!(5000));
        assert_eq!(store.balance_of(&receiver_id).unwrap(), dec!(7500));
    }

    #[test]
    fn test_settle_rejects_non_pending_transfer() {
        let (store, sender_id, receiver_id) = seeded_store();
        let mut tx = Transaction::new(sender_id, receiver_id, dec!(500), "payment");
        tx.block("risk policy").unwrap();

        let err = store.settle(&mut tx).unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));
        assert_eq!(store.balance_of(&sender_id).unwrap(), dec!(5000));
    }

    #[test]
    fn test_settle_reviewed_completes_flagged_transfer() {
        let (store, sender_id, receiver_id) = seeded_store();
        let mut tx = Transaction::new(sender_id, receiver_id, dec!(500), "payment");
        tx.flag_for_review(0.75).unwrap();

        store.settle_reviewed(&mut tx, "verified with customer").unwrap();
        assert_eq!(tx.status, crate::models::TransactionStatus::Completed);
        assert_eq!(store.balance_of(&sender_id).unwrap(), dec!(4500));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let store = UserStore::with_snapshot(path.clone()).unwrap();
        let mut user = UserRecord::new("angel_abubakar", "angel@example.com", "hash", dec!(5000));
        user.trusted_devices.push("Test Device".to_string());
        let user_id = user.user_id;
        store.put_user(user).unwrap();
        drop(store);

        let reloaded = UserStore::with_snapshot(path).unwrap();
        let user = reloaded.get_user(&user_id).unwrap();
        assert_eq!(user.username, "angel_abubakar");
        assert_eq!(user.balance, dec!(5000));
        assert_eq!(user.trusted_devices, vec!["Test Device"]);
    }
}
