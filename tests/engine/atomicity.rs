//! Atomicity Tests
//!
//! A rejected batch must leave the part list, the exports and every
//! importer exactly as they were.

use crate::common::*;
use proptest::prelude::*;
use std::sync::Arc;

fn guarded_container(initial: usize) -> (Arc<CompositionContainer>, Arc<Importer>) {
    let container = container_with("Value", (0..initial as i32).collect());
    let importer = Importer::new("Value", Cardinality::ZeroOrMore, false);
    container.compose(&adding(&[importer.part()])).unwrap();
    (container, importer)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rejected_batch_leaves_no_trace(
        initial in 1usize..5,
        offending in 1usize..4,
        unrelated in 0usize..4,
        remove_existing in any::<bool>(),
    ) {
        let (container, importer) = guarded_container(initial);
        let before = container.parts();

        let mut batch = CompositionBatch::new();
        for i in 0..unrelated {
            batch.add_exported_value("Other", i);
        }
        for i in 0..offending {
            batch.add_exported_value("Value", 100 + i as i32);
        }
        if remove_existing {
            batch.remove_part(before[0].clone());
        }

        let err = container.compose(&batch).unwrap_err();

        prop_assert!(err.is_rejection());
        prop_assert!(Arc::ptr_eq(&before, &container.parts()));
        prop_assert_eq!(container.get_exports_of("Value").unwrap().len(), initial);
        prop_assert!(!container.is_present("Other").unwrap());
        prop_assert_eq!(importer.satisfied_count(), 1);
        prop_assert_eq!(importer.values::<i32>(), (0..initial as i32).collect::<Vec<_>>());
        prop_assert_eq!(container.metrics().batches_rejected, 1);
    }
}

#[test]
fn rejected_removal_releases_nothing() {
    let (container, importer) = guarded_container(1);
    let existing = container.parts()[0].clone();

    // the importer goes away with its export, so nothing vetoes
    container
        .compose(&removing(&[existing, importer.part()]))
        .unwrap();
    assert!(importer.was_released());

    let (container, importer) = guarded_container(1);
    let existing = container.parts()[0].clone();
    let err = container.compose(&removing(&[existing])).unwrap_err();
    assert!(err.is_rejection());
    assert!(!importer.was_released());
}

#[test]
fn rejected_batch_does_not_notify_listeners() {
    let (container, _importer) = guarded_container(1);
    let seen = Arc::new(parking_lot::Mutex::new(0usize));
    let counter = Arc::clone(&seen);
    container.root().notifier().on_changed(move |_| {
        *counter.lock() += 1;
        Ok(())
    });

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Value", 7i32);
    assert!(container.compose(&batch).is_err());
    assert_eq!(*seen.lock(), 0);

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Other", 7i32);
    container.compose(&batch).unwrap();
    assert_eq!(*seen.lock(), 1);
}

#[test]
fn rejected_nested_batch_leaves_outer_batch_intact() {
    let (container, _importer) = guarded_container(1);
    let outer = AtomicComposition::new(None);

    let mut first = CompositionBatch::new();
    first.add_exported_value("Other", 1i32);
    container.compose_in(&first, Some(&outer)).unwrap();

    let mut second = CompositionBatch::new();
    second.add_exported_value("Value", 2i32);
    assert!(container.compose_in(&second, Some(&outer)).is_err());

    outer.complete().unwrap();
    assert_eq!(*container.get_exported_value::<i32>("Other").unwrap(), 1);
    assert_eq!(container.get_exports_of("Value").unwrap().len(), 1);
}
