//! Re-entrancy Tests
//!
//! Listeners run while a batch is in flight. A direct compose from there is
//! refused; composing into the event's scope joins the running batch.

use crate::common::*;
use parking_lot::Mutex;
use std::sync::Arc;

fn adds(event: &ExportsChangeEvent<'_>, contract: &str) -> bool {
    event.added.iter().any(|d| d.contract_name() == contract)
}

#[test]
fn direct_compose_from_listener_is_refused() {
    let container = container();
    let outcome: Arc<Mutex<Option<MosaicResult<()>>>> = Arc::new(Mutex::new(None));
    let handle = weak(&container);
    let slot = Arc::clone(&outcome);
    container.root().notifier().on_changing(move |event| {
        if !adds(event, "Trigger") {
            return Ok(());
        }
        if let Some(container) = handle.upgrade() {
            let mut batch = CompositionBatch::new();
            batch.add_exported_value("Extra", 1i32);
            *slot.lock() = Some(container.compose(&batch));
        }
        Ok(())
    });

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Trigger", 0i32);
    container.compose(&batch).unwrap();

    let nested = outcome.lock().take().expect("listener ran");
    assert!(matches!(nested, Err(MosaicError::ReentrantCompose)));
    assert!(container.is_present("Trigger").unwrap());
    assert!(!container.is_present("Extra").unwrap());
}

#[test]
fn compose_into_event_scope_commits_with_outer_batch() {
    let container = container();
    let handle = weak(&container);
    let visible_early = Arc::new(Mutex::new(None));
    let early = Arc::clone(&visible_early);
    container.root().notifier().on_changing(move |event| {
        if !adds(event, "Trigger") {
            return Ok(());
        }
        let Some(container) = handle.upgrade() else {
            return Ok(());
        };
        let mut batch = CompositionBatch::new();
        batch.add_exported_value("Extra", 1i32);
        container.compose_in(&batch, event.atomic)?;
        *early.lock() = Some(container.is_present("Extra")?);
        Ok(())
    });

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Trigger", 0i32);
    container.compose(&batch).unwrap();

    assert_eq!(*visible_early.lock(), Some(false));
    assert!(container.is_present("Trigger").unwrap());
    assert_eq!(*container.get_exported_value::<i32>("Extra").unwrap(), 1);
    assert_eq!(container.parts().len(), 2);
}

#[test]
fn failed_nested_batch_rejects_outer_batch() {
    let container = container_with("Value", vec![1i32]);
    let importer = Importer::new("Value", Cardinality::ZeroOrMore, false);
    container.compose(&adding(&[importer.part()])).unwrap();
    let before = container.parts();

    let handle = weak(&container);
    container.root().notifier().on_changing(move |event| {
        if !adds(event, "Trigger") {
            return Ok(());
        }
        let Some(container) = handle.upgrade() else {
            return Ok(());
        };
        let mut batch = CompositionBatch::new();
        batch.add_exported_value("Value", 2i32);
        container.compose_in(&batch, event.atomic)
    });

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Trigger", 0i32);
    let err = container.compose(&batch).unwrap_err();

    assert!(err.is_rejection());
    assert!(Arc::ptr_eq(&before, &container.parts()));
    assert!(!container.is_present("Trigger").unwrap());
    assert_eq!(importer.satisfied_count(), 1);
}

#[test]
fn nested_batch_importer_is_satisfied_after_commit() {
    let container = container_with("Value", vec![String::from("Value")]);
    let importer = Importer::many("Value");
    let part = importer.part();
    let handle = weak(&container);
    container.root().notifier().on_changing(move |event| {
        if !adds(event, "Trigger") {
            return Ok(());
        }
        let Some(container) = handle.upgrade() else {
            return Ok(());
        };
        container.compose_in(&adding(&[part.clone()]), event.atomic)
    });

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Trigger", 0i32);
    container.compose(&batch).unwrap();

    assert_eq!(importer.satisfied_count(), 1);
    assert_eq!(importer.values::<String>(), vec![String::from("Value")]);
}

#[test]
fn compose_from_satisfied_part_runs_as_new_batch() {
    let container = container();
    let handle = weak(&container);
    let callback = CallbackPart::new(move || {
        if let Some(container) = handle.upgrade() {
            let mut batch = CompositionBatch::new();
            batch.add_exported_value("Late", 1i32);
            container.compose(&batch).expect("compose from satisfy");
        }
    });

    container.compose(&adding(&[callback])).unwrap();

    assert!(container.is_present("Late").unwrap());
    assert_eq!(container.metrics().batches_committed, 2);
}

#[test]
fn nested_removal_of_adapted_source_leaves_no_stale_value() {
    let old = value_part("OldContract", String::from("stale"));
    let importer = Importer::many("NewContract");
    let container = container();
    container
        .compose(&adding(&[old.clone(), importer.part()]))
        .unwrap();

    let handle = weak(&container);
    container.root().notifier().on_changing(move |event| {
        if !adds(event, "Trigger") {
            return Ok(());
        }
        let Some(container) = handle.upgrade() else {
            return Ok(());
        };
        container.compose_in(&removing(&[old.clone()]), event.atomic)
    });

    let mut batch = adding(&[adapter("OldContract", "NewContract")]);
    batch.add_exported_value("Trigger", 0i32);
    container.compose(&batch).unwrap();

    assert!(!container.is_present("OldContract").unwrap());
    assert!(container.get_exports_of("NewContract").unwrap().is_empty());
    assert!(importer.values::<String>().is_empty());
}

#[test]
fn part_from_nested_batch_can_compose_while_satisfied() {
    let container = container();
    let outcome: Arc<Mutex<Option<MosaicResult<()>>>> = Arc::new(Mutex::new(None));
    let handle = weak(&container);
    let slot = Arc::clone(&outcome);
    container.root().notifier().on_changing(move |event| {
        if !adds(event, "Trigger") {
            return Ok(());
        }
        let Some(container) = handle.upgrade() else {
            return Ok(());
        };
        let inner = Arc::downgrade(&container);
        let slot = Arc::clone(&slot);
        let callback = CallbackPart::new(move || {
            if let Some(container) = inner.upgrade() {
                let mut batch = CompositionBatch::new();
                batch.add_exported_value("Late", 1i32);
                *slot.lock() = Some(container.compose(&batch));
            }
        });
        container.compose_in(&adding(&[callback]), event.atomic)
    });

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Trigger", 0i32);
    container.compose(&batch).unwrap();

    let late = outcome.lock().take().expect("callback ran");
    assert!(late.is_ok());
    assert!(container.is_present("Late").unwrap());
    assert_eq!(container.parts().len(), 3);
}
