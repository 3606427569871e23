//! Persistence boundary: the transaction log, client balances, and the
//! coordinator that makes multi-store writes atomic.
//!
//! All access goes through a [`Session`], the request-scoped context that
//! optionally carries an open unit of work. Stores stage writes into the
//! session's unit of work when one is open and autocommit under a momentary
//! lock otherwise, so every participant of a request shares one transaction.

use thiserror::Error;

use crate::model::TransactionId;

mod balance;
mod coordinator;
mod ledger;
mod memory;

pub use balance::BalanceStore;
pub use coordinator::{Coordinator, TxnFuture};
pub use ledger::LedgerStore;
pub use memory::{BankDb, Session};

/// Isolation requested for a unit of work.
///
/// The in-memory backend holds the database's exclusive lock for any open
/// unit of work, so transactions always execute at least as strictly as
/// requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Statements observe only committed data. The momentary-lock reads and
    /// writes stores perform outside a unit of work run at this level.
    ReadCommitted,
    /// Transactions behave as if executed one at a time.
    Serializable,
}

/// Uniqueness violation on append.
///
/// The store is the final arbiter for duplicate submissions: racing writers
/// that lose get one of these back after their unit of work rolls back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("transaction {0} already exists")]
    DuplicateTransaction(TransactionId),

    #[error("transaction {0} has already been reverted")]
    DuplicateRevert(TransactionId),
}
