//! Append-only transaction log.

use crate::model::{TransactionId, TransactionRecord};

use super::{BankDb, Session, StoreError};

/// Committed transaction records, addressable by id and by revert target.
///
/// Records are never updated or deleted. Uniqueness of transaction ids and
/// of reverts per target is enforced at append time, against both committed
/// state and writes staged in the session's open unit of work.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    db: BankDb,
}

impl LedgerStore {
    pub fn new(db: BankDb) -> Self {
        Self { db }
    }

    /// Looks up a record by transaction id.
    pub async fn find_by_id(
        &self,
        session: &Session,
        id: TransactionId,
    ) -> Option<TransactionRecord> {
        session.read(&self.db, |view| view.transaction(id)).await
    }

    /// Looks up the revert entry recorded against `target`, if any.
    pub async fn find_revert_of(
        &self,
        session: &Session,
        target: TransactionId,
    ) -> Option<TransactionRecord> {
        session.read(&self.db, |view| view.revert_of(target)).await
    }

    /// Appends `record` to the log.
    ///
    /// Fails with [`StoreError::DuplicateTransaction`] when the id is taken
    /// and with [`StoreError::DuplicateRevert`] when the record is a revert
    /// whose target already has one.
    pub async fn append(
        &self,
        session: &mut Session,
        record: TransactionRecord,
    ) -> Result<(), StoreError> {
        session
            .write(&self.db, |mut writer| writer.append(record))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionKind;
    use crate::store::IsolationLevel;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn credit(amount: i64) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            amount: Decimal::from(amount),
            recorded_at: Utc::now(),
            kind: TransactionKind::Credit,
        }
    }

    fn revert_of(target: &TransactionRecord) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            client_id: target.client_id,
            amount: -target.signed_effect(),
            recorded_at: Utc::now(),
            kind: TransactionKind::Revert {
                reverts: target.id,
            },
        }
    }

    #[tokio::test]
    async fn append_then_find_by_id() {
        let db = BankDb::new();
        let ledger = LedgerStore::new(db);
        let mut session = Session::new();
        let entry = credit(100);

        ledger.append(&mut session, entry.clone()).await.unwrap();

        assert_eq!(ledger.find_by_id(&session, entry.id).await, Some(entry));
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let db = BankDb::new();
        let ledger = LedgerStore::new(db);
        let session = Session::new();

        assert_eq!(ledger.find_by_id(&session, Uuid::new_v4()).await, None);
        assert_eq!(ledger.find_revert_of(&session, Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn append_rejects_duplicate_id() {
        let db = BankDb::new();
        let ledger = LedgerStore::new(db);
        let mut session = Session::new();
        let entry = credit(100);

        ledger.append(&mut session, entry.clone()).await.unwrap();
        let result = ledger.append(&mut session, entry.clone()).await;

        assert!(matches!(
            result,
            Err(StoreError::DuplicateTransaction(id)) if id == entry.id
        ));
    }

    #[tokio::test]
    async fn find_revert_of_resolves_the_target() {
        let db = BankDb::new();
        let ledger = LedgerStore::new(db);
        let mut session = Session::new();
        let original = credit(100);
        let revert = revert_of(&original);

        ledger.append(&mut session, original.clone()).await.unwrap();
        ledger.append(&mut session, revert.clone()).await.unwrap();

        assert_eq!(
            ledger.find_revert_of(&session, original.id).await,
            Some(revert)
        );
    }

    #[tokio::test]
    async fn append_rejects_second_revert_for_one_target() {
        let db = BankDb::new();
        let ledger = LedgerStore::new(db);
        let mut session = Session::new();
        let original = credit(100);

        ledger.append(&mut session, original.clone()).await.unwrap();
        ledger
            .append(&mut session, revert_of(&original))
            .await
            .unwrap();
        let result = ledger.append(&mut session, revert_of(&original)).await;

        assert!(matches!(
            result,
            Err(StoreError::DuplicateRevert(id)) if id == original.id
        ));
    }

    #[tokio::test]
    async fn staged_append_is_visible_in_session_until_rollback() {
        let db = BankDb::new();
        let ledger = LedgerStore::new(db.clone());
        let mut session = Session::new();
        let entry = credit(100);

        session.begin(&db, IsolationLevel::Serializable).await;
        ledger.append(&mut session, entry.clone()).await.unwrap();
        assert_eq!(
            ledger.find_by_id(&session, entry.id).await,
            Some(entry.clone())
        );

        session.rollback();
        assert_eq!(ledger.find_by_id(&session, entry.id).await, None);
    }
}
