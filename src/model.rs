//! Core domain types for the ledger engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Client identifier.
pub type ClientId = Uuid;

/// Transaction identifier. Supplied by the caller for credits and debits,
/// generated by the engine for reverts. Doubles as the idempotency key:
/// resubmitting an id that is already recorded replays the recorded outcome.
pub type TransactionId = Uuid;

/// Discriminates the three kinds of committed transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Funds added to a client's balance.
    Credit,
    /// Funds removed from a client's balance.
    Debit,
    /// Cancels the effect of an earlier credit or debit.
    Revert {
        /// The transaction this revert cancels. At most one revert may
        /// reference a given target.
        reverts: TransactionId,
    },
}

/// A committed ledger entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub client_id: ClientId,
    /// Positive magnitude for credits and debits. For reverts, the signed
    /// amount that cancels the original: negative when reverting a credit,
    /// positive when reverting a debit.
    pub amount: Decimal,
    /// Server-side commit time, taken from the engine clock.
    pub recorded_at: DateTime<Utc>,
    pub kind: TransactionKind,
}

impl TransactionRecord {
    /// The balance delta this record contributes. A client's balance is the
    /// sum of `signed_effect` over all its committed records.
    pub fn signed_effect(&self) -> Decimal {
        match self.kind {
            TransactionKind::Credit => self.amount,
            TransactionKind::Debit => -self.amount,
            TransactionKind::Revert { .. } => self.amount,
        }
    }

    /// The target id when this record is a revert.
    pub fn reverts(&self) -> Option<TransactionId> {
        match self.kind {
            TransactionKind::Revert { reverts } => Some(reverts),
            _ => None,
        }
    }
}

/// A client account row: identity plus running balance.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: ClientId,
    pub balance: Decimal,
}

impl Client {
    /// A fresh account with zero balance.
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            balance: Decimal::ZERO,
        }
    }
}

/// Caller input for a credit or debit.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub id: TransactionId,
    pub client_id: ClientId,
    pub amount: Decimal,
    /// Client-reported time. Validated upstream, never stored; committed
    /// records carry the server clock instead.
    pub request_time: DateTime<Utc>,
}

/// An operation representing the possible inputs of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Add funds to a client's balance.
    Credit(TransactionRequest),
    /// Remove funds from a client's balance.
    Debit(TransactionRequest),
    /// Cancel the effect of a committed credit or debit.
    Revert { transaction_id: TransactionId },
    /// Report a client's current balance.
    GetBalance { client_id: ClientId },
}
