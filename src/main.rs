use std::collections::BTreeSet;
use std::env;
use std::io;
use std::process::ExitCode;
use std::time::Duration;

use point_ledger::csv::{BalanceRow, read_operations, write_balances};
use point_ledger::{Ledger, LedgerConfig, TransactionType};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Long enough for an entry to run through every backoff step.
fn settle_budget(config: &LedgerConfig) -> Duration {
    let backoff: Duration = (0..config.retry.max_attempts)
        .map(|attempt| config.retry.delay_for(attempt))
        .sum();
    let ticks = config.tick_interval * (config.retry.max_attempts + 2);
    backoff + ticks * 2 + Duration::from_secs(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: point-ledger <operations.csv>");
        return ExitCode::FAILURE;
    };

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let config = match LedgerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let operations = match read_operations(path) {
        Ok(operations) => operations,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let ledger = Ledger::new(config);
    let (tx_sender, tx_receiver) = tokio::sync::mpsc::channel(16);

    let reader = tokio::spawn(async move {
        let mut users = BTreeSet::new();
        for result in operations {
            match result {
                Ok(tx) => {
                    users.insert(tx.user());
                    if tx_sender.send(tx).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
        users
    });

    ledger.run(ReceiverStream::new(tx_receiver)).await;

    let users = match reader.await {
        Ok(users) => users,
        Err(e) => {
            error!("input reader failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if !ledger.settle(settle_budget(ledger.config())).await {
        warn!(
            pending = ledger.pending_retries().len(),
            "retry queue did not settle"
        );
    }
    ledger.shutdown().await;

    let rows = users.into_iter().filter_map(|user| {
        let balance = ledger.balance(user).ok()?;
        let history = ledger.history(user).ok()?;
        let charges = history
            .iter()
            .filter(|r| r.kind == TransactionType::Charge)
            .count();
        Some(BalanceRow {
            user,
            balance: balance.amount.points(),
            charges,
            spends: history.len() - charges,
        })
    });

    if let Err(e) = write_balances(io::stdout().lock(), rows) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
