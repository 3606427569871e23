//! Reuse-or-begin transaction coordination.

use std::future::Future;
use std::pin::Pin;

use super::{BankDb, IsolationLevel, Session};

/// Boxed future returned by transactional closures.
pub type TxnFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Runs operations inside units of work on one database.
///
/// `run_in_transaction` composes: when the session already carries an open
/// unit of work the operation joins it, and commit stays with the outermost
/// caller. Any error rolls the whole unit of work back before propagating.
#[derive(Debug, Clone)]
pub struct Coordinator {
    db: BankDb,
}

impl Coordinator {
    pub fn new(db: BankDb) -> Self {
        Self { db }
    }

    /// Runs `op` transactionally on `session`.
    ///
    /// With a unit of work already open, `op` runs within it: no new begin,
    /// no commit, and its writes stay staged for the owner. Otherwise a unit
    /// of work is opened at `isolation`, committed when `op` succeeds, and
    /// rolled back when it fails.
    pub async fn run_in_transaction<T, E, F>(
        &self,
        session: &mut Session,
        isolation: IsolationLevel,
        op: F,
    ) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut Session) -> TxnFuture<'a, T, E> + Send,
    {
        if session.in_transaction() {
            return op(session).await;
        }

        session.begin(&self.db, isolation).await;
        match op(session).await {
            Ok(value) => {
                session.commit();
                Ok(value)
            }
            Err(error) => {
                session.rollback();
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TransactionKind, TransactionRecord};
    use crate::store::StoreError;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn record(amount: i64) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            amount: Decimal::from(amount),
            recorded_at: Utc::now(),
            kind: TransactionKind::Credit,
        }
    }

    #[tokio::test]
    async fn commits_on_success() {
        let db = BankDb::new();
        let coordinator = Coordinator::new(db.clone());
        let mut session = Session::new();
        let entry = record(100);

        let db2 = db.clone();
        let staged = entry.clone();
        coordinator
            .run_in_transaction(&mut session, IsolationLevel::Serializable, move |session| {
                Box::pin(async move { session.write(&db2, |mut writer| writer.append(staged)).await })
            })
            .await
            .unwrap();

        assert!(!session.in_transaction());
        let committed = session.read(&db, |view| view.transaction(entry.id)).await;
        assert_eq!(committed, Some(entry));
    }

    #[tokio::test]
    async fn rolls_back_on_error() {
        let db = BankDb::new();
        let coordinator = Coordinator::new(db.clone());
        let mut session = Session::new();
        let entry = record(100);

        let db2 = db.clone();
        let staged = entry.clone();
        let result: Result<(), &str> = coordinator
            .run_in_transaction(&mut session, IsolationLevel::Serializable, move |session| {
                Box::pin(async move {
                    session
                        .write(&db2, |mut writer| writer.append(staged))
                        .await
                        .unwrap();
                    Err("operation failed after staging")
                })
            })
            .await;

        assert!(result.is_err());
        assert!(!session.in_transaction());
        let committed = session.read(&db, |view| view.transaction(entry.id)).await;
        assert_eq!(committed, None);
    }

    #[tokio::test]
    async fn joins_an_open_unit_of_work_without_committing() {
        let db = BankDb::new();
        let coordinator = Coordinator::new(db.clone());
        let mut session = Session::new();

        session.begin(&db, IsolationLevel::Serializable).await;

        let db2 = db.clone();
        let entry = record(100);
        let staged = entry.clone();
        let inner: Result<(), StoreError> = coordinator
            .run_in_transaction(&mut session, IsolationLevel::Serializable, move |session| {
                Box::pin(async move { session.write(&db2, |mut writer| writer.append(staged)).await })
            })
            .await;

        inner.unwrap();
        // The inner call joined the outer unit of work, so nothing committed.
        assert!(session.in_transaction());

        session.rollback();
        let committed = session.read(&db, |view| view.transaction(entry.id)).await;
        assert_eq!(committed, None);
    }

    #[tokio::test]
    async fn outer_rollback_discards_joined_writes() {
        let db = BankDb::new();
        let coordinator = Coordinator::new(db.clone());
        let mut session = Session::new();
        let entry = record(100);

        let outer_db = db.clone();
        let outer_coordinator = coordinator.clone();
        let staged = entry.clone();
        let result: Result<(), &str> = coordinator
            .run_in_transaction(&mut session, IsolationLevel::Serializable, move |session| {
                Box::pin(async move {
                    let inner: Result<(), StoreError> = outer_coordinator
                        .run_in_transaction(session, IsolationLevel::Serializable, move |session| {
                            Box::pin(async move {
                                session
                                    .write(&outer_db, |mut writer| writer.append(staged))
                                    .await
                            })
                        })
                        .await;
                    inner.unwrap();
                    Err("outer failure after inner success")
                })
            })
            .await;

        assert!(result.is_err());
        let committed = session.read(&db, |view| view.transaction(entry.id)).await;
        assert_eq!(committed, None);
    }

    #[tokio::test]
    async fn read_committed_unit_of_work_commits() {
        let db = BankDb::new();
        let coordinator = Coordinator::new(db.clone());
        let mut session = Session::new();
        let entry = record(100);

        let db2 = db.clone();
        let staged = entry.clone();
        let seen: Result<Option<IsolationLevel>, StoreError> = coordinator
            .run_in_transaction(&mut session, IsolationLevel::ReadCommitted, move |session| {
                Box::pin(async move {
                    session
                        .write(&db2, |mut writer| writer.append(staged))
                        .await?;
                    Ok(session.isolation())
                })
            })
            .await;

        assert_eq!(seen.unwrap(), Some(IsolationLevel::ReadCommitted));
        let committed = session.read(&db, |view| view.transaction(entry.id)).await;
        assert_eq!(committed, Some(entry));
    }
}
