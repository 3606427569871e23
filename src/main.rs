use std::collections::BTreeSet;
use std::env;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ledger_eng::clock::{Clock, SystemClock};
use ledger_eng::csv::{read_operations, write_balances};
use ledger_eng::model::{ClientId, Operation};
use ledger_eng::processor::Processor;
use ledger_eng::store::BankDb;
use ledger_eng::validate::validate_request;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .expect("usage: ledger-eng <operations.csv>");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let db = BankDb::new();
    let processor = Processor::new(db, clock.clone());

    let (op_sender, op_receiver) = tokio::sync::mpsc::channel(16);

    let reader = tokio::spawn(async move {
        let mut clients = BTreeSet::new();
        for result in read_operations(&path) {
            match result {
                Ok(operation) => {
                    if let Operation::Credit(request) | Operation::Debit(request) = &operation {
                        if let Err(e) = validate_request(request, clock.now()) {
                            warn!(transaction_id = %request.id, "{e}");
                            continue;
                        }
                    }
                    track_client(&mut clients, &operation);
                    op_sender.send(operation).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
        clients
    });

    processor.run(ReceiverStream::new(op_receiver)).await;
    let clients = reader.await.expect("reader task panicked");

    // Clients whose every operation was refused never came into existence
    // and are left out of the report.
    let mut balances = Vec::new();
    for client_id in clients {
        if let Ok(outcome) = processor.get_balance(client_id).await {
            balances.push((client_id, outcome.balance));
        }
    }
    write_balances(balances);
}

fn track_client(clients: &mut BTreeSet<ClientId>, operation: &Operation) {
    match operation {
        Operation::Credit(request) | Operation::Debit(request) => {
            clients.insert(request.client_id);
        }
        Operation::GetBalance { client_id } => {
            clients.insert(*client_id);
        }
        Operation::Revert { .. } => {}
    }
}
