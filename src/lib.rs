pub mod amount;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod store;

pub use amount::Amount;
pub use config::LedgerConfig;
pub use engine::{Ledger, LedgerError, ReplayOutcome, RetryPolicy};
pub use model::{Balance, HistoryRecord, RetryEntry, Transaction, TransactionType, UserId};
