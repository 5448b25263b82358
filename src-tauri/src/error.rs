//! Ledger error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Every failure a ledger operation can report.
///
/// Mutating operations roll their transaction back before returning any of
/// these, so an `Err` always means nothing was persisted.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed or out-of-range input, rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("payment of {amount_paid} does not cover net amount {net_amount}")]
    Underpayment { net_amount: i64, amount_paid: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The underlying store failed to read, write, commit or roll back.
    #[error("transaction failed: {0}")]
    Transaction(#[from] rusqlite::Error),

    /// Snapshot and movement ledger disagree. Never expected in correct code.
    #[error("inventory item {item_id} does not reconcile: snapshot {snapshot}, ledger {ledger}")]
    Reconciliation {
        item_id: i64,
        snapshot: i64,
        ledger: i64,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// An amount or count whose arithmetic would leave the `i64` range.
    pub fn out_of_range(what: &str) -> Self {
        Self::Validation(format!("{what} is out of range"))
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            LedgerError::Underpayment { .. } => ErrorKind::Underpayment,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Transaction(_) | LedgerError::Io(_) => ErrorKind::Transaction,
            LedgerError::Reconciliation { .. } => ErrorKind::Reconciliation,
            LedgerError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Serializable tag for [`LedgerError`], sent across the command boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InsufficientStock,
    Underpayment,
    NotFound,
    Transaction,
    Reconciliation,
    Config,
}

impl ErrorKind {
    /// Whether the user can fix the request and retry, as opposed to an
    /// internal failure the UI should raise as an alert.
    pub fn is_user_correctable(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::InsufficientStock
                | ErrorKind::Underpayment
                | ErrorKind::NotFound
        )
    }
}
