use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::{Amount, Transaction, UserId};

/// Errors that can occur when reading or writing csv
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open input: {0}")]
    Open(#[source] csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation type '{op_type}'")]
    UnrecognizedType { line: usize, op_type: String },

    #[error("line {line}: {op_type} missing amount")]
    MissingAmount { line: usize, op_type: String },

    #[error("failed to write output: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    user: UserId,
    amount: Option<i64>,
}

/// One line of the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceRow {
    pub user: UserId,
    pub balance: i64,
    pub charges: usize,
    pub spends: usize,
}

/// Read `type,user,amount` rows from a csv file
pub fn read_operations(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Transaction, CsvError>>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(CsvError::Open)?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let op_type = row.r#type.to_ascii_lowercase();
            let build: fn(UserId, Amount) -> Transaction = match op_type.as_str() {
                "charge" => |user, amount| Transaction::Charge { user, amount },
                "spend" => |user, amount| Transaction::Spend { user, amount },
                _ => {
                    return Err(CsvError::UnrecognizedType {
                        line,
                        op_type: row.r#type,
                    });
                }
            };
            let amount = row
                .amount
                .ok_or(CsvError::MissingAmount { line, op_type })?;
            Ok(build(row.user, Amount::from(amount)))
        }))
}

/// Write balance rows in csv format
pub fn write_balances(
    writer: impl io::Write,
    rows: impl IntoIterator<Item = BalanceRow>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(&row)?;
    }
    writer.flush()?;
    Ok(())
}
