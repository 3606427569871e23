use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::model::{ClientId, Operation, TransactionId, TransactionRequest};

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {column}")]
    MissingColumn {
        line: usize,
        op: String,
        column: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    tx: Option<TransactionId>,
    client: Option<ClientId>,
    amount: Option<Decimal>,
    at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    client: ClientId,
    balance: String,
}

/// Read operations from a csv file
pub fn read_operations(
    path: impl AsRef<Path>,
) -> impl Iterator<Item = Result<Operation, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            match row.op.as_str() {
                "credit" => Ok(Operation::Credit(movement_request(line, &row)?)),
                "debit" => Ok(Operation::Debit(movement_request(line, &row)?)),
                "revert" => Ok(Operation::Revert {
                    transaction_id: require(line, &row.op, "tx", row.tx)?,
                }),
                "balance" => Ok(Operation::GetBalance {
                    client_id: require(line, &row.op, "client", row.client)?,
                }),
                other => Err(CsvError::UnrecognizedOp {
                    line,
                    op: other.to_string(),
                }),
            }
        })
}

fn movement_request(line: usize, row: &InputRow) -> Result<TransactionRequest, CsvError> {
    Ok(TransactionRequest {
        id: require(line, &row.op, "tx", row.tx)?,
        client_id: require(line, &row.op, "client", row.client)?,
        amount: require(line, &row.op, "amount", row.amount)?,
        request_time: require(line, &row.op, "at", row.at)?,
    })
}

fn require<T>(
    line: usize,
    op: &str,
    column: &'static str,
    value: Option<T>,
) -> Result<T, CsvError> {
    value.ok_or_else(|| CsvError::MissingColumn {
        line,
        op: op.to_string(),
        column,
    })
}

/// write client balances to stdout in csv format
pub fn write_balances(balances: impl IntoIterator<Item = (ClientId, Decimal)>) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for (client, balance) in balances {
        let row = OutputRow {
            client,
            balance: balance.to_string(),
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}
