//! End-to-end concurrency tests: a simulated feed writes the shared book
//! while the real compute worker inverts snapshots, then both stop on the
//! shared flag.

use chrono::Utc;
use okxbench::{InversionWorker, OrderBook, RunState};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FRAMES_PER_TICK: u64 = 10;

fn spawn_feeder(
    book: Arc<Mutex<OrderBook>>,
    state: Arc<RunState>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut px = 50_000.0;
        while !state.is_stopped() {
            for _ in 0..FRAMES_PER_TICK {
                state.inc_messages();
            }
            {
                let mut guard = book.lock().unwrap();
                guard.replace(
                    &[(px, 1.5), (px - 1.0, 2.0), (px - 2.0, 0.75)],
                    &[(px + 1.0, 1.0), (px + 2.0, 2.5), (px + 3.0, 0.5)],
                    Utc::now(),
                );
            }
            px += 0.25;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}

#[tokio::test]
async fn simulated_run_counts_progress_and_joins_cleanly() {
    let state = Arc::new(RunState::new());
    let book = Arc::new(Mutex::new(OrderBook::new()));

    let feeder = spawn_feeder(Arc::clone(&book), Arc::clone(&state));

    let worker = InversionWorker::new(Arc::clone(&book), Arc::clone(&state), 24, 1e-6);
    let compute = tokio::task::spawn_blocking(move || worker.run());

    tokio::time::sleep(Duration::from_millis(500)).await;
    state.request_stop();

    tokio::time::timeout(Duration::from_secs(5), compute)
        .await
        .expect("compute worker must observe the stop flag")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), feeder)
        .await
        .expect("feeder must observe the stop flag")
        .unwrap();

    let report = state.report();
    assert!(report.messages_received >= FRAMES_PER_TICK);
    assert!(report.inversions_completed >= 1);

    // counters are frozen once both workers have joined
    let after = state.report();
    assert_eq!(report, after);
}

#[tokio::test]
async fn counters_are_monotonic_while_running() {
    let state = Arc::new(RunState::new());
    let book = Arc::new(Mutex::new(OrderBook::new()));

    let feeder = spawn_feeder(Arc::clone(&book), Arc::clone(&state));
    let worker = InversionWorker::new(Arc::clone(&book), Arc::clone(&state), 16, 1e-6);
    let compute = tokio::task::spawn_blocking(move || worker.run());

    let mut last_messages = 0;
    let mut last_inversions = 0;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let report = state.report();
        assert!(report.messages_received >= last_messages);
        assert!(report.inversions_completed >= last_inversions);
        last_messages = report.messages_received;
        last_inversions = report.inversions_completed;
    }
    assert!(last_messages > 0);

    state.request_stop();
    tokio::time::timeout(Duration::from_secs(5), compute)
        .await
        .expect("compute join")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), feeder)
        .await
        .expect("feeder join")
        .unwrap();
}

#[tokio::test]
async fn reader_never_observes_partial_ladders() {
    // The writer only ever installs books with exactly three levels per
    // side and best_bid < best_ask; a torn read would break one of these.
    let state = Arc::new(RunState::new());
    let book = Arc::new(Mutex::new(OrderBook::new()));

    {
        let mut guard = book.lock().unwrap();
        guard.replace(&[(100.0, 1.0), (99.0, 1.0), (98.0, 1.0)], &[(101.0, 1.0), (102.0, 1.0), (103.0, 1.0)], Utc::now());
    }

    let feeder = spawn_feeder(Arc::clone(&book), Arc::clone(&state));

    let reader = {
        let book = Arc::clone(&book);
        let state = Arc::clone(&state);
        tokio::task::spawn_blocking(move || {
            while !state.is_stopped() {
                let snapshot = book.lock().unwrap().clone();
                assert_eq!(snapshot.bids.len(), 3, "bid ladder torn");
                assert_eq!(snapshot.asks.len(), 3, "ask ladder torn");
                let bid = snapshot.best_bid().unwrap();
                let ask = snapshot.best_ask().unwrap();
                assert!(bid < ask, "crossed snapshot: {bid} >= {ask}");
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    state.request_stop();

    tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("reader join")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), feeder)
        .await
        .expect("feeder join")
        .unwrap();
}
