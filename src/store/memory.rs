//! In-memory bank database with transactional sessions.
//!
//! [`BankDb`] owns the committed state behind one async mutex. A [`Session`]
//! is created per logical request and optionally carries the open unit of
//! work: the database's lock guard plus an overlay of staged writes. Commit
//! merges the overlay into committed state; rollback drops it. Reads consult
//! the overlay first, so a unit of work observes its own pending writes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::{IsolationLevel, StoreError};
use crate::model::{Client, ClientId, TransactionId, TransactionKind, TransactionRecord};

/// Committed database state.
#[derive(Debug, Default)]
struct BankState {
    transactions: HashMap<TransactionId, TransactionRecord>,
    /// Unique index: reverted transaction id to the id of its revert entry.
    reverts: HashMap<TransactionId, TransactionId>,
    clients: HashMap<ClientId, Client>,
}

/// Handle to the shared bank database. Cheap to clone; all clones see the
/// same state.
#[derive(Debug, Clone, Default)]
pub struct BankDb {
    state: Arc<Mutex<BankState>>,
}

impl BankDb {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Writes pending inside an open unit of work.
#[derive(Debug, Default)]
struct StagedWrites {
    transactions: HashMap<TransactionId, TransactionRecord>,
    reverts: HashMap<TransactionId, TransactionId>,
    clients: HashMap<ClientId, Client>,
}

impl StagedWrites {
    fn stage(&mut self, record: TransactionRecord) {
        if let TransactionKind::Revert { reverts } = record.kind {
            self.reverts.insert(reverts, record.id);
        }
        self.transactions.insert(record.id, record);
    }
}

/// An open unit of work: exclusive hold on the database plus the overlay of
/// writes staged since begin.
#[derive(Debug)]
struct OpenTxn {
    guard: OwnedMutexGuard<BankState>,
    staged: StagedWrites,
    isolation: IsolationLevel,
}

/// Request-scoped execution context.
///
/// Carries the open unit of work, if any; store calls route through it so
/// every participant of a request shares one transaction. A session must
/// only be used with the database that opened its unit of work. Dropping a
/// session mid-transaction discards its staged writes and releases the
/// database, so rollback is the default.
#[derive(Debug, Default)]
pub struct Session {
    txn: Option<OpenTxn>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a unit of work is currently open on this session.
    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    /// The isolation level of the open unit of work, if any.
    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.txn.as_ref().map(|txn| txn.isolation)
    }

    /// Opens a unit of work on `db`, waiting until the database lock is
    /// acquired. Must not be called while one is already open.
    pub(crate) async fn begin(&mut self, db: &BankDb, isolation: IsolationLevel) {
        debug_assert!(self.txn.is_none(), "unit of work already open");
        let guard = db.state.clone().lock_owned().await;
        self.txn = Some(OpenTxn {
            guard,
            staged: StagedWrites::default(),
            isolation,
        });
        debug!(?isolation, "unit of work opened");
    }

    /// Merges staged writes into committed state and releases the database.
    /// No-op without an open unit of work.
    pub(crate) fn commit(&mut self) {
        if let Some(OpenTxn {
            mut guard, staged, ..
        }) = self.txn.take()
        {
            let state = &mut *guard;
            for (id, record) in staged.transactions {
                state.transactions.insert(id, record);
            }
            for (target, revert_id) in staged.reverts {
                state.reverts.insert(target, revert_id);
            }
            for (id, client) in staged.clients {
                state.clients.insert(id, client);
            }
            debug!("unit of work committed");
        }
    }

    /// Discards staged writes and releases the database. No-op without an
    /// open unit of work.
    pub(crate) fn rollback(&mut self) {
        if self.txn.take().is_some() {
            debug!("unit of work rolled back");
        }
    }

    /// Runs a read against this session's view of `db`: the open unit of
    /// work when there is one, a momentary lock otherwise.
    pub(crate) async fn read<T>(&self, db: &BankDb, f: impl FnOnce(View<'_>) -> T) -> T {
        match &self.txn {
            Some(txn) => f(View {
                base: &*txn.guard,
                staged: Some(&txn.staged),
            }),
            None => {
                let state = db.state.lock().await;
                f(View {
                    base: &*state,
                    staged: None,
                })
            }
        }
    }

    /// Runs a write against this session's view of `db`. Inside a unit of
    /// work the write lands in the staged overlay; outside one it applies
    /// to committed state directly under a momentary lock (autocommit).
    pub(crate) async fn write<T>(&mut self, db: &BankDb, f: impl FnOnce(Writer<'_>) -> T) -> T {
        match &mut self.txn {
            Some(txn) => {
                let OpenTxn { guard, staged, .. } = txn;
                f(Writer {
                    target: WriteTarget::Staged {
                        base: &**guard,
                        staged,
                    },
                })
            }
            None => {
                let mut state = db.state.lock().await;
                f(Writer {
                    target: WriteTarget::Direct { state: &mut *state },
                })
            }
        }
    }
}

/// Read access over committed state plus any staged overlay.
pub(crate) struct View<'a> {
    base: &'a BankState,
    staged: Option<&'a StagedWrites>,
}

impl View<'_> {
    pub(crate) fn transaction(&self, id: TransactionId) -> Option<TransactionRecord> {
        self.staged
            .and_then(|staged| staged.transactions.get(&id))
            .or_else(|| self.base.transactions.get(&id))
            .cloned()
    }

    pub(crate) fn revert_of(&self, target: TransactionId) -> Option<TransactionRecord> {
        let revert_id = self
            .staged
            .and_then(|staged| staged.reverts.get(&target))
            .or_else(|| self.base.reverts.get(&target))?;
        self.transaction(*revert_id)
    }

    pub(crate) fn client(&self, id: ClientId) -> Option<Client> {
        self.staged
            .and_then(|staged| staged.clients.get(&id))
            .or_else(|| self.base.clients.get(&id))
            .cloned()
    }
}

enum WriteTarget<'a> {
    /// Inside a unit of work: committed state is read-only, writes stage.
    Staged {
        base: &'a BankState,
        staged: &'a mut StagedWrites,
    },
    /// No unit of work: writes apply to committed state directly.
    Direct { state: &'a mut BankState },
}

/// Write access routed through the session's unit of work.
pub(crate) struct Writer<'a> {
    target: WriteTarget<'a>,
}

impl Writer<'_> {
    pub(crate) fn view(&self) -> View<'_> {
        match &self.target {
            WriteTarget::Staged { base, staged } => View {
                base,
                staged: Some(&**staged),
            },
            WriteTarget::Direct { state } => View {
                base: &**state,
                staged: None,
            },
        }
    }

    /// Appends a transaction record, enforcing id uniqueness and the
    /// one-revert-per-target constraint against committed and staged data.
    pub(crate) fn append(&mut self, record: TransactionRecord) -> Result<(), StoreError> {
        let view = self.view();
        if view.transaction(record.id).is_some() {
            return Err(StoreError::DuplicateTransaction(record.id));
        }
        if let TransactionKind::Revert { reverts } = record.kind {
            if view.revert_of(reverts).is_some() {
                return Err(StoreError::DuplicateRevert(reverts));
            }
        }
        match &mut self.target {
            WriteTarget::Staged { staged, .. } => staged.stage(record),
            WriteTarget::Direct { state } => {
                if let TransactionKind::Revert { reverts } = record.kind {
                    state.reverts.insert(reverts, record.id);
                }
                state.transactions.insert(record.id, record);
            }
        }
        Ok(())
    }

    /// Inserts or replaces a client row.
    pub(crate) fn put_client(&mut self, client: Client) {
        match &mut self.target {
            WriteTarget::Staged { staged, .. } => {
                staged.clients.insert(client.id, client);
            }
            WriteTarget::Direct { state } => {
                state.clients.insert(client.id, client);
            }
        }
    }
}
