//! Client balance bookkeeping.

use std::convert::Infallible;

use rust_decimal::Decimal;

use crate::model::{Client, ClientId};

use super::{BankDb, Coordinator, IsolationLevel, Session};

/// Client records keyed by id, holding the running balance.
///
/// Balances only move through [`BalanceStore::adjust`], which runs as a
/// serializable unit of work so the read-modify-write cannot interleave.
/// Whether a movement is allowed to go negative is decided by the caller
/// before adjusting.
#[derive(Debug, Clone)]
pub struct BalanceStore {
    db: BankDb,
    coordinator: Coordinator,
}

impl BalanceStore {
    pub fn new(db: BankDb) -> Self {
        Self {
            coordinator: Coordinator::new(db.clone()),
            db,
        }
    }

    /// Looks up a client, `None` when no transaction ever touched them.
    pub async fn get(&self, session: &Session, client_id: ClientId) -> Option<Client> {
        session.read(&self.db, |view| view.client(client_id)).await
    }

    /// Looks up a client, registering them with a zero balance when absent.
    pub async fn get_or_create(&self, session: &mut Session, client_id: ClientId) -> Client {
        session
            .write(&self.db, |mut writer| {
                let existing = writer.view().client(client_id);
                match existing {
                    Some(client) => client,
                    None => {
                        let client = Client::new(client_id);
                        writer.put_client(client.clone());
                        client
                    }
                }
            })
            .await
    }

    /// Applies `delta` to the client's balance and returns the new value.
    ///
    /// Creates the client on first movement. Joins the session's open unit
    /// of work when there is one, otherwise runs in its own serializable
    /// unit of work.
    pub async fn adjust(
        &self,
        session: &mut Session,
        client_id: ClientId,
        delta: Decimal,
    ) -> Decimal {
        let db = self.db.clone();
        let applied: Result<Decimal, Infallible> = self
            .coordinator
            .run_in_transaction(session, IsolationLevel::Serializable, move |session| {
                Box::pin(async move {
                    let balance = session
                        .write(&db, |mut writer| {
                            let mut client = writer
                                .view()
                                .client(client_id)
                                .unwrap_or_else(|| Client::new(client_id));
                            client.balance += delta;
                            let balance = client.balance;
                            writer.put_client(client);
                            balance
                        })
                        .await;
                    Ok(balance)
                })
            })
            .await;
        applied.unwrap_or_else(|never| match never {})
    }
}
