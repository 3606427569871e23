//! Transaction processing. Movements, reverts, and balance queries run
//! against the stores through per-request [`Session`]s; every state change
//! happens inside a serializable unit of work, so the ledger entry and the
//! balance adjustment land together or not at all.
//!
//! Requests are idempotent on the client-supplied transaction id: a
//! resubmitted movement, or a second revert of the same target, returns the
//! originally recorded timestamp with the current balance instead of
//! applying twice.

mod error;

pub use error::ProcessorError;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::model::{
    ClientId, Operation, TransactionId, TransactionKind, TransactionRecord, TransactionRequest,
};
use crate::store::{
    BalanceStore, BankDb, Coordinator, IsolationLevel, LedgerStore, Session, StoreError,
};

/// Result of a committed or replayed movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// When the movement was recorded. For a replay this is the original
    /// recording time, not the resubmission time.
    pub inserted_at: DateTime<Utc>,
    /// The client's balance as of this response.
    pub new_balance: Decimal,
}

/// Result of a committed or replayed revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevertOutcome {
    pub reverted_at: DateTime<Utc>,
    pub new_balance: Decimal,
}

/// Result of a balance query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceOutcome {
    /// When the query was evaluated.
    pub as_of: DateTime<Utc>,
    pub balance: Decimal,
}

/// The transaction processor.
///
/// Cheap to clone; clones share the same database, so one processor per
/// task is the expected concurrent setup.
#[derive(Clone)]
pub struct Processor {
    ledger: LedgerStore,
    balances: BalanceStore,
    coordinator: Coordinator,
    clock: Arc<dyn Clock>,
}

/// Public API
impl Processor {
    pub fn new(db: BankDb, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: LedgerStore::new(db.clone()),
            balances: BalanceStore::new(db.clone()),
            coordinator: Coordinator::new(db),
            clock,
        }
    }

    /// Adds funds to the request's client, creating them on first movement.
    pub async fn credit(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionOutcome, ProcessorError> {
        self.record_or_replay(request, TransactionKind::Credit).await
    }

    /// Withdraws funds from the request's client.
    ///
    /// Refused with [`ProcessorError::InsufficientFunds`] when the balance
    /// cannot cover the amount; a client with no history counts as zero.
    pub async fn debit(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionOutcome, ProcessorError> {
        self.record_or_replay(request, TransactionKind::Debit).await
    }

    /// Undoes the effect of a previously committed movement.
    ///
    /// At most one revert ever exists per transaction; asking again replays
    /// the first one. Reverting a revert is refused, as is reverting a
    /// credit the client can no longer cover.
    pub async fn revert(
        &self,
        transaction_id: TransactionId,
    ) -> Result<RevertOutcome, ProcessorError> {
        let mut session = Session::new();
        if let Some(existing) = self.ledger.find_revert_of(&session, transaction_id).await {
            return Ok(self.replay_revert(&session, existing).await);
        }

        match self.record_revert(&mut session, transaction_id).await {
            Err(ProcessorError::Store(StoreError::DuplicateRevert(_))) => {
                // Lost a race on the same target after the pre-check. The
                // winning revert is committed now, so serve it.
                match self.ledger.find_revert_of(&session, transaction_id).await {
                    Some(existing) => Ok(self.replay_revert(&session, existing).await),
                    None => Err(StoreError::DuplicateRevert(transaction_id).into()),
                }
            }
            outcome => outcome,
        }
    }

    /// Reports the client's balance and the query evaluation time.
    pub async fn get_balance(&self, client_id: ClientId) -> Result<BalanceOutcome, ProcessorError> {
        let session = Session::new();
        match self.balances.get(&session, client_id).await {
            Some(client) => Ok(BalanceOutcome {
                as_of: self.clock.now(),
                balance: client.balance,
            }),
            None => {
                warn!(%client_id, "client not found");
                Err(ProcessorError::ClientNotFound(client_id))
            }
        }
    }

    /// Executes one operation, discarding its outcome.
    pub async fn apply(&self, operation: &Operation) -> Result<(), ProcessorError> {
        match operation {
            Operation::Credit(request) => self.credit(request.clone()).await.map(|_| ()),
            Operation::Debit(request) => self.debit(request.clone()).await.map(|_| ()),
            Operation::Revert { transaction_id } => self.revert(*transaction_id).await.map(|_| ()),
            Operation::GetBalance { client_id } => self.get_balance(*client_id).await.map(|_| ()),
        }
    }

    /// Drains a stream of operations, logging each outcome. A refused
    /// operation is logged and skipped; the stream keeps going.
    pub async fn run(&self, mut operations: impl Stream<Item = Operation> + Unpin) {
        while let Some(operation) = operations.next().await {
            let result = self.apply(&operation).await;
            Self::log_outcome(&operation, result);
        }
    }
}

/// Private API
impl Processor {
    /// Records a credit or debit, or replays it when the id is already
    /// committed. When the pre-check and a racing writer disagree, the
    /// store's duplicate rejection settles it and the loser replays.
    async fn record_or_replay(
        &self,
        request: TransactionRequest,
        kind: TransactionKind,
    ) -> Result<TransactionOutcome, ProcessorError> {
        let mut session = Session::new();
        if let Some(existing) = self.ledger.find_by_id(&session, request.id).await {
            return Ok(self.replay_movement(&session, existing).await);
        }

        match self.record_movement(&mut session, request.clone(), kind).await {
            Err(ProcessorError::Store(StoreError::DuplicateTransaction(_))) => {
                match self.ledger.find_by_id(&session, request.id).await {
                    Some(existing) => Ok(self.replay_movement(&session, existing).await),
                    None => Err(StoreError::DuplicateTransaction(request.id).into()),
                }
            }
            outcome => outcome,
        }
    }

    async fn record_movement(
        &self,
        session: &mut Session,
        request: TransactionRequest,
        kind: TransactionKind,
    ) -> Result<TransactionOutcome, ProcessorError> {
        let this = self.clone();
        self.coordinator
            .run_in_transaction(session, IsolationLevel::Serializable, move |session| {
                Box::pin(async move {
                    if kind == TransactionKind::Debit {
                        this.ensure_funds(session, request.client_id, request.amount)
                            .await?;
                    }
                    let record = TransactionRecord {
                        id: request.id,
                        client_id: request.client_id,
                        amount: request.amount,
                        recorded_at: this.clock.now(),
                        kind,
                    };
                    this.ledger.append(session, record.clone()).await?;
                    let new_balance = this
                        .balances
                        .adjust(session, record.client_id, record.signed_effect())
                        .await;
                    Ok(TransactionOutcome {
                        inserted_at: record.recorded_at,
                        new_balance,
                    })
                })
            })
            .await
    }

    async fn record_revert(
        &self,
        session: &mut Session,
        transaction_id: TransactionId,
    ) -> Result<RevertOutcome, ProcessorError> {
        let this = self.clone();
        self.coordinator
            .run_in_transaction(session, IsolationLevel::Serializable, move |session| {
                Box::pin(async move {
                    let original = this
                        .ledger
                        .find_by_id(session, transaction_id)
                        .await
                        .ok_or(ProcessorError::TransactionNotFound(transaction_id))?;
                    match original.kind {
                        TransactionKind::Revert { .. } => {
                            return Err(ProcessorError::InvalidReversal(original.id));
                        }
                        // Undoing a credit withdraws; the balance must cover it.
                        TransactionKind::Credit => {
                            this.ensure_funds(session, original.client_id, original.amount)
                                .await?;
                        }
                        TransactionKind::Debit => {}
                    }

                    let record = TransactionRecord {
                        id: Uuid::new_v4(),
                        client_id: original.client_id,
                        amount: -original.signed_effect(),
                        recorded_at: this.clock.now(),
                        kind: TransactionKind::Revert {
                            reverts: original.id,
                        },
                    };
                    this.ledger.append(session, record.clone()).await?;
                    let new_balance = this
                        .balances
                        .adjust(session, record.client_id, record.signed_effect())
                        .await;
                    Ok(RevertOutcome {
                        reverted_at: record.recorded_at,
                        new_balance,
                    })
                })
            })
            .await
    }

    async fn replay_movement(
        &self,
        session: &Session,
        existing: TransactionRecord,
    ) -> TransactionOutcome {
        info!(
            transaction_id = %existing.id,
            "transaction already recorded, returning existing result"
        );
        TransactionOutcome {
            inserted_at: existing.recorded_at,
            new_balance: self.current_balance(session, existing.client_id).await,
        }
    }

    async fn replay_revert(&self, session: &Session, existing: TransactionRecord) -> RevertOutcome {
        info!(
            revert_id = %existing.id,
            "revert already recorded, returning existing result"
        );
        RevertOutcome {
            reverted_at: existing.recorded_at,
            new_balance: self.current_balance(session, existing.client_id).await,
        }
    }

    async fn ensure_funds(
        &self,
        session: &Session,
        client_id: ClientId,
        requested: Decimal,
    ) -> Result<(), ProcessorError> {
        let balance = self.current_balance(session, client_id).await;
        if balance < requested {
            return Err(ProcessorError::InsufficientFunds { balance, requested });
        }
        Ok(())
    }

    async fn current_balance(&self, session: &Session, client_id: ClientId) -> Decimal {
        self.balances
            .get(session, client_id)
            .await
            .map(|client| client.balance)
            .unwrap_or(Decimal::ZERO)
    }

    fn log_outcome(operation: &Operation, result: Result<(), ProcessorError>) {
        let (kind, client_id, transaction_id) = match operation {
            Operation::Credit(request) => ("credit", Some(request.client_id), Some(request.id)),
            Operation::Debit(request) => ("debit", Some(request.client_id), Some(request.id)),
            Operation::Revert { transaction_id } => ("revert", None, Some(*transaction_id)),
            Operation::GetBalance { client_id } => ("get_balance", Some(*client_id), None),
        };
        match result {
            Ok(()) => info!(kind, ?client_id, ?transaction_id, "operation applied"),
            Err(reason) => {
                info!(kind, ?client_id, ?transaction_id, %reason, "operation skipped")
            }
        }
    }
}
