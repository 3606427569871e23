//! Processing failures surfaced to callers.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::{ClientId, TransactionId};
use crate::store::StoreError;

/// Why an operation was refused. Refused operations leave no trace: no
/// ledger entry, no balance change, no client row.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// A debit or a revert of a credit would take the balance below zero.
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        balance: Decimal,
        requested: Decimal,
    },

    /// The transaction a revert points at does not exist.
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    /// No transaction ever touched this client.
    #[error("client {0} not found")]
    ClientNotFound(ClientId),

    /// Reverts target original movements only.
    #[error("transaction {0} is itself a revert and cannot be reverted")]
    InvalidReversal(TransactionId),

    #[error("{0}")]
    Store(#[from] StoreError),
}
