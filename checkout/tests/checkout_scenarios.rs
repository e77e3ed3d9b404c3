//! End-to-end checkout runs through the public API.
//!
//! # Running with tracing
//!
//! ```bash
//! RUST_LOG=checkout=trace cargo test --features tracing --test checkout_scenarios -- --nocapture
//! ```

use std::collections::HashSet;
use std::sync::Once;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use checkout::event::{EventKind, Journal, Observer, QueueEvent};
use checkout::queue::{BoundedQueue, QueueError};
use checkout::runtime::{RunError, RunReport, SimulationConfig, run};
use checkout::sync::Timeout;

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        checkout::init_tracing();
    });
}

/// Runs `config` on a helper thread and fails the test if it does not
/// finish within `deadline`.
fn run_with_deadline(
    config: SimulationConfig,
    deadline: Duration,
) -> (Result<RunReport, RunError>, Vec<QueueEvent>) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let journal = Journal::new();
        let result = run(&config, &journal);
        let _ = tx.send((result, journal.events()));
    });
    rx.recv_timeout(deadline)
        .expect("checkout run did not finish before the deadline")
}

fn sorted(mut items: Vec<u64>) -> Vec<u64> {
    items.sort_unstable();
    items
}

#[test]
fn two_shoppers_share_a_belt_of_four() {
    init_test_tracing();

    let (result, events) = run_with_deadline(SimulationConfig::default(), Duration::from_secs(10));
    let report = result.unwrap();

    assert_eq!(
        sorted(report.consumed.clone()),
        vec![100, 101, 102, 103, 200, 201, 202, 203]
    );
    assert_eq!(report.total_produced(), 8);
    assert_eq!(events.len(), 16);
    assert!(events.iter().all(|e| e.size <= 4));
    assert!(report.peak_size <= 4);

    // Each shopper's items come out in the order that shopper placed them.
    for base in [100, 200] {
        let mine: Vec<u64> = report
            .consumed
            .iter()
            .copied()
            .filter(|item| item / 100 == base / 100)
            .collect();
        assert_eq!(mine, vec![base, base + 1, base + 2, base + 3]);
    }
}

#[test]
fn capacity_one_serializes_three_shoppers() {
    init_test_tracing();

    let (result, events) =
        run_with_deadline(SimulationConfig::uniform(1, 3, 1), Duration::from_secs(10));
    let report = result.unwrap();

    assert_eq!(sorted(report.consumed.clone()), vec![100, 200, 300]);
    assert_eq!(report.peak_size, 1);
    for event in &events {
        assert!(event.size <= 1, "size {} over capacity 1", event.size);
        match event.kind {
            EventKind::Enqueued => assert_eq!(event.size, 1),
            EventKind::Dequeued => assert_eq!(event.size, 0),
        }
    }
}

#[test]
fn dequeue_order_matches_enqueue_order() {
    init_test_tracing();

    let mut config = SimulationConfig::uniform(3, 4, 6);
    config.cashier_pacing = Some(Duration::from_millis(1));
    let (result, events) = run_with_deadline(config, Duration::from_secs(10));
    let report = result.unwrap();

    let journal = Journal::new();
    for event in &events {
        journal.on_event(event);
    }
    let enqueued = journal.in_buffer_order(EventKind::Enqueued);
    let dequeued = journal.in_buffer_order(EventKind::Dequeued);

    assert_eq!(enqueued, dequeued);
    assert_eq!(dequeued, report.consumed);
}

#[test]
fn slow_cashier_keeps_belt_bounded() {
    init_test_tracing();

    let mut config = SimulationConfig::uniform(2, 3, 3);
    config.cashier_pacing = Some(Duration::from_millis(5));
    let (result, events) = run_with_deadline(config, Duration::from_secs(10));
    let report = result.unwrap();

    assert_eq!(report.total_consumed(), 9);
    assert!(events.iter().all(|e| e.size <= 2));
    assert!(report.peak_size <= 2);
}

#[test]
fn shoppers_park_on_a_full_belt() {
    init_test_tracing();

    let queue = BoundedQueue::<u64>::new(2).unwrap();

    let consumed = thread::scope(|s| {
        let shoppers: Vec<_> = (1..=3u64)
            .map(|id| {
                let queue = &queue;
                s.spawn(move || {
                    for seq in 0..3 {
                        queue.enqueue_blocking(id * 100 + seq).unwrap();
                    }
                })
            })
            .collect();

        // The cashier only starts once the belt is full.
        while !queue.is_full() {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.len(), 2);
        assert!(shoppers.iter().any(|h| !h.is_finished()));

        let consumed: Vec<u64> = (0..9).map(|_| queue.dequeue_blocking().unwrap().0).collect();
        for handle in shoppers {
            handle.join().unwrap();
        }
        consumed
    });

    assert_eq!(
        sorted(consumed),
        vec![100, 101, 102, 200, 201, 202, 300, 301, 302]
    );
    assert_eq!(queue.peak_len(), 2);
    assert!(queue.is_empty());
}

#[test]
fn items_are_unique_per_run() {
    init_test_tracing();

    let (result, _) = run_with_deadline(SimulationConfig::uniform(5, 5, 10), Duration::from_secs(10));
    let report = result.unwrap();

    let unique: HashSet<u64> = report.consumed.iter().copied().collect();
    assert_eq!(unique.len(), 50);
}

#[test]
fn close_unblocks_a_waiting_consumer() {
    init_test_tracing();

    let queue = BoundedQueue::<u64>::new(2).unwrap();

    thread::scope(|s| {
        let consumer = s.spawn(|| queue.dequeue_blocking());
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap().unwrap_err(), QueueError::Closed);
    });

    assert_eq!(
        queue.dequeue_timeout(Timeout::Duration(Duration::ZERO)).unwrap_err(),
        QueueError::Closed
    );
}

#[test]
fn journal_survives_a_file_round_trip() {
    init_test_tracing();

    let journal = Journal::new();
    run(&SimulationConfig::uniform(2, 2, 3), &journal).unwrap();

    let path = std::env::temp_dir().join(format!("checkout-journal-{}.bin", std::process::id()));
    journal.write_to(&path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let decoded = Journal::decode(&bytes).unwrap();
    assert_eq!(decoded, journal.events());
    assert_eq!(decoded.len(), 12);
}
