use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use point_ledger::{Amount, Ledger, LedgerConfig, LedgerError, TransactionType};

fn points(value: i64) -> Amount {
    Amount::from_points(value)
}

fn ledger() -> Arc<Ledger> {
    Arc::new(Ledger::new(
        LedgerConfig::default().with_background_retries(false),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_charges_sum_exactly() {
    let ledger = ledger();
    let amounts: Vec<i64> = (1..=100).collect();

    let mut tasks = Vec::new();
    for &amount in &amounts {
        let ledger = Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            ledger.charge(1, points(amount)).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let expected: i64 = amounts.iter().sum();
    assert_eq!(ledger.balance(1).unwrap().amount, points(expected));

    let history = ledger.history(1).unwrap();
    assert_eq!(history.len(), amounts.len());
    assert!(history.iter().all(|r| r.kind == TransactionType::Charge));

    let mut recorded: Vec<i64> = history.iter().map(|r| r.amount.points()).collect();
    recorded.sort_unstable();
    assert_eq!(recorded, amounts);

    for pair in history.windows(2) {
        assert!(pair[0].updated_at < pair[1].updated_at);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn two_users_charged_in_parallel_do_not_interfere() {
    let ledger = ledger();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        for user in [1, 2] {
            let ledger = Arc::clone(&ledger);
            tasks.push(tokio::spawn(async move {
                ledger.charge(user, points(500)).await.unwrap();
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    for user in [1, 2] {
        assert_eq!(ledger.balance(user).unwrap().amount, points(5000));
        let history = ledger.history(user).unwrap();
        assert_eq!(history.len(), 10);
        assert!(history.iter().all(|r| r.user_id == user));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_spends_never_overdraw() {
    let ledger = ledger();
    ledger.charge(1, points(1000)).await.unwrap();

    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let ledger = Arc::clone(&ledger);
        let successes = Arc::clone(&successes);
        let failures = Arc::clone(&failures);
        tasks.push(tokio::spawn(async move {
            match ledger.spend(1, points(500)).await {
                Ok(_) => successes.fetch_add(1, Ordering::SeqCst),
                Err(LedgerError::InsufficientBalance { .. }) => failures.fetch_add(1, Ordering::SeqCst),
                Err(e) => panic!("unexpected error {e}"),
            };
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(successes.load(Ordering::SeqCst), 2);
    assert_eq!(failures.load(Ordering::SeqCst), 8);
    assert_eq!(ledger.balance(1).unwrap().amount, Amount::ZERO);
    assert_eq!(ledger.pending_retries().len(), 8);
    assert!(
        ledger
            .pending_retries()
            .iter()
            .all(|entry| entry.retry_count == 0 && entry.user_id == 1)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn interleaved_charges_and_spends_keep_balance_consistent() {
    let ledger = ledger();
    let charged = Arc::new(AtomicUsize::new(0));
    let spent = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..60 {
        let ledger = Arc::clone(&ledger);
        let charged = Arc::clone(&charged);
        let spent = Arc::clone(&spent);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                ledger.charge(3, points(1000)).await.unwrap();
                charged.fetch_add(1, Ordering::SeqCst);
            } else if ledger.spend(3, points(700)).await.is_ok() {
                spent.fetch_add(1, Ordering::SeqCst);
            }
            let balance = ledger.balance(3).unwrap();
            assert!(balance.amount >= Amount::ZERO);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let charged = charged.load(Ordering::SeqCst) as i64;
    let spent = spent.load(Ordering::SeqCst) as i64;
    let balance = ledger.balance(3).unwrap().amount;
    assert_eq!(balance, points(charged * 1000 - spent * 700));
    assert!(balance >= Amount::ZERO);
    assert_eq!(
        ledger.history(3).unwrap().len() as i64,
        charged + spent
    );

    // replaying the full history reproduces the final balance without dipping below zero
    let mut running = 0;
    for record in ledger.history(3).unwrap() {
        match record.kind {
            TransactionType::Charge => running += record.amount.points(),
            TransactionType::Spend => running -= record.amount.points(),
        }
        assert!(running >= 0);
    }
    assert_eq!(points(running), balance);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn background_retries_drain_under_load() {
    let ledger = Arc::new(Ledger::new(LedgerConfig::default().with_retry_batch(4)));

    let mut tasks = Vec::new();
    for user in 1..=20 {
        let ledger = Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            ledger.spend(user, points(100)).await.unwrap_err();
            ledger.charge(user, points(100)).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(ledger.settle(std::time::Duration::from_secs(5)).await);
    for user in 1..=20 {
        assert_eq!(ledger.balance(user).unwrap().amount, Amount::ZERO);
        assert_eq!(ledger.history(user).unwrap().len(), 2);
    }
    ledger.shutdown().await;
}
