//! Balance and history storage used by the ledger.
//!
//! The ledger serializes mutations per user, so implementations only need
//! read-your-writes consistency per key.

use thiserror::Error;

use crate::Amount;
use crate::model::{Balance, HistoryRecord, Timestamp, TransactionType, UserId};

mod memory;
pub use memory::{MemoryBalanceStore, MemoryHistoryStore};

/// Validation failures raised by a store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("invalid user id {0}")]
    InvalidUser(UserId),
    #[error("invalid amount {0}")]
    InvalidAmount(Amount),
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(Timestamp),
}

/// Keyed storage of each user's current balance.
pub trait BalanceStore: Send + Sync {
    /// Current balance, or a zero balance if the user was never written.
    fn read(&self, user: UserId) -> Balance;

    /// Overwrite the user's balance, assigning a fresh `updated_at`.
    fn write(&self, user: UserId, amount: Amount) -> Result<Balance, StoreError>;
}

/// Append-only storage of mutation records.
pub trait HistoryStore: Send + Sync {
    fn append(
        &self,
        user: UserId,
        amount: Amount,
        kind: TransactionType,
        updated_at: Timestamp,
    ) -> Result<HistoryRecord, StoreError>;

    /// All records for `user` in insertion order.
    fn list_by_user(&self, user: UserId) -> Vec<HistoryRecord>;
}
