//! Error types for ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::model::UserId;
use crate::store::StoreError;

/// Error returned by [`Ledger`](super::Ledger) operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid user id {0}")]
    InvalidUser(UserId),

    #[error("invalid amount {0}: must be at least 1 and below the charge ceiling")]
    InvalidAmount(Amount),

    #[error("insufficient balance for user {user}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        user: UserId,
        balance: Amount,
        requested: Amount,
    },

    #[error("balance overflow for user {0}")]
    BalanceOverflow(UserId),

    #[error("store rejected write: {0}")]
    Store(#[from] StoreError),
}
