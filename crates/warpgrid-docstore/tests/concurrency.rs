//! Concurrent writers against one store.
//!
//! Assertion-guarded batches from independent callers race; the store
//! serializes them so that exactly one assert-absent insert wins and the
//! losers observe an aborted attempt.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;
use warpgrid_docstore::*;

#[test]
fn racing_inserts_have_exactly_one_winner() {
    let store = Arc::new(RedbDocStore::open_in_memory().unwrap());
    let runner = TxnRunner::new(store.clone(), RetryConfig::default());
    let winners = Arc::new(AtomicU32::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|writer| {
            let runner = runner.clone();
            let winners = winners.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut inserted = false;
                runner
                    .run(|attempt| {
                        if attempt > 0 {
                            inserted = false;
                            return Err(StoreError::NoOperations);
                        }
                        inserted = true;
                        Ok(vec![Op::insert("locks", "leader", &json!({"writer": writer}))?])
                    })
                    .unwrap();
                if inserted {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(store.fetch_all("locks", &Query::all()).unwrap().len(), 1);
}

#[test]
fn concurrent_counters_converge_with_rebuilt_batches() {
    let store = Arc::new(RedbDocStore::open_in_memory().unwrap());
    store
        .apply(&[Op::insert("counters", "c", &json!({"value": 0})).unwrap()])
        .unwrap();
    let runner = TxnRunner::new(store.clone(), RetryConfig::default().with_max_attempts(64));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let runner = runner.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    runner
                        .run(|_| {
                            // Compare-and-set on the value read in this attempt.
                            let doc = runner.store().fetch_one("counters", "c")?;
                            let value = doc["value"].as_u64().unwrap_or(0);
                            Ok(vec![Op::update_where(
                                "counters",
                                "c",
                                json!({"value": value}),
                                json!({"value": value + 1}),
                            )?])
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.fetch_one("counters", "c").unwrap()["value"], 40);
}
