//! Concurrency Tests
//!
//! A thread-safe container serializes compose calls across threads. A
//! non-thread-safe container refuses a compose that overlaps a running one.

use crate::common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

const THREADS: usize = 4;
const BATCHES_PER_THREAD: usize = 10;

#[test]
fn thread_safe_compose_calls_never_overlap() {
    init_tracing();
    let container = Arc::new(CompositionContainer::with_options(CompositionOptions::thread_safe()).unwrap());
    let active = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));

    {
        let active = Arc::clone(&active);
        let overlapped = Arc::clone(&overlapped);
        container.root().notifier().on_changing(move |event| {
            if event.added.is_empty() {
                return Ok(());
            }
            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                overlapped.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(1));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
    }

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let container = Arc::clone(&container);
            thread::spawn(move || {
                for i in 0..BATCHES_PER_THREAD {
                    let mut batch = CompositionBatch::new();
                    batch.add_exported_value("Value", t * BATCHES_PER_THREAD + i);
                    container.compose(&batch).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(!overlapped.load(Ordering::SeqCst));
    let mut values: Vec<usize> = container
        .get_exported_values::<usize>("Value")
        .unwrap()
        .iter()
        .map(|v| **v)
        .collect();
    values.sort_unstable();
    assert_eq!(values, (0..THREADS * BATCHES_PER_THREAD).collect::<Vec<_>>());
    assert_eq!(container.metrics().batches_committed, (THREADS * BATCHES_PER_THREAD) as u64);
}

#[test]
fn readers_see_monotonic_snapshots() {
    let container = Arc::new(CompositionContainer::with_options(CompositionOptions::thread_safe()).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let container = Arc::clone(&container);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut last = 0;
            while !done.load(Ordering::SeqCst) {
                let seen = container.get_exports_of("Value").unwrap().len();
                assert!(seen >= last, "snapshot went backwards: {seen} < {last}");
                last = seen;
            }
        })
    };

    for i in 0..50i32 {
        let mut batch = CompositionBatch::new();
        batch.add_exported_value("Value", i);
        container.compose(&batch).unwrap();
    }
    done.store(true, Ordering::SeqCst);
    reader.join().unwrap();

    assert_eq!(container.get_exports_of("Value").unwrap().len(), 50);
}

#[test]
fn overlapping_compose_without_thread_safety_is_refused() {
    let container = container();
    assert!(!container.options().thread_safe);

    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let release_rx = Mutex::new(release_rx);
    container.root().notifier().on_changing(move |event| {
        if event.added.iter().any(|d| d.contract_name() == "Slow") {
            let _ = entered_tx.lock().send(());
            let _ = release_rx.lock().recv_timeout(Duration::from_secs(10));
        }
        Ok(())
    });

    let slow = {
        let container = Arc::clone(&container);
        thread::spawn(move || {
            let mut batch = CompositionBatch::new();
            batch.add_exported_value("Slow", 1i32);
            container.compose(&batch)
        })
    };
    entered_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("slow compose reached its listener");

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Fast", 2i32);
    let overlapping = container.compose(&batch);

    release_tx.send(()).unwrap();
    slow.join().unwrap().unwrap();

    assert!(matches!(overlapping, Err(MosaicError::ReentrantCompose)));
    assert!(container.is_present("Slow").unwrap());
    assert!(!container.is_present("Fast").unwrap());
}

#[test]
fn container_is_shareable_across_threads() {
    let container = container_with("Value", vec![String::from("shared")]);
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = Arc::clone(&container);
            thread::spawn(move || container.get_exported_value::<String>("Value").unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().as_str(), "shared");
    }
}
