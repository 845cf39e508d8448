//! Recomposition Tests
//!
//! Recomposable imports are re-injected when the exports they match change;
//! non-recomposable imports veto such changes.

use crate::common::*;
use std::sync::Arc;

#[test]
fn recomposable_import_sees_replacement_in_one_batch() {
    let container = container();
    let first = value_part("Value", String::from("first"));
    let importer = Importer::new("Value", Cardinality::ExactlyOne, true);
    container.compose(&adding(&[first.clone(), importer.part()])).unwrap();
    assert_eq!(importer.value::<String>().as_deref(), Some("first"));
    assert_eq!(importer.satisfied_count(), 1);

    let second = value_part("Value", String::from("second"));
    container
        .compose(&CompositionBatch::from_parts([second], [first]))
        .unwrap();

    assert_eq!(importer.satisfied_count(), 2);
    assert_eq!(importer.value::<String>().as_deref(), Some("second"));
}

#[test]
fn removing_required_export_is_rejected() {
    let container = container();
    let only = value_part("Value", 1i32);
    let importer = Importer::new("Value", Cardinality::ExactlyOne, true);
    container.compose(&adding(&[only.clone(), importer.part()])).unwrap();
    let before = container.parts();

    let err = container.compose(&removing(&[only])).unwrap_err();

    assert!(err.is_rejection());
    assert_eq!(err.errors()[0].kind, CompositionErrorKind::ImportCardinalityMismatch);
    assert!(Arc::ptr_eq(&before, &container.parts()));
    assert_eq!(importer.satisfied_count(), 1);
    assert_eq!(importer.value::<i32>(), Some(1));
}

#[test]
fn non_recomposable_import_vetoes_change() {
    let container = container_with("Value", vec![1i32]);
    let importer = Importer::new("Value", Cardinality::ZeroOrMore, false);
    container.compose(&adding(&[importer.part()])).unwrap();
    assert_eq!(importer.values::<i32>(), vec![1]);

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Value", 2i32);
    let err = container.compose(&batch).unwrap_err();

    assert!(err.is_rejection());
    assert_eq!(err.errors()[0].kind, CompositionErrorKind::PreventedByExistingImport);
    assert_eq!(container.get_exports_of("Value").unwrap().len(), 1);
    assert_eq!(importer.satisfied_count(), 1);
}

#[test]
fn unrelated_change_does_not_recompose() {
    let container = container_with("Value", vec![1i32]);
    let importer = Importer::new("Value", Cardinality::ZeroOrMore, false);
    container.compose(&adding(&[importer.part()])).unwrap();

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Other", 2i32);
    container.compose(&batch).unwrap();

    assert_eq!(importer.satisfied_count(), 1);
}

#[test]
fn many_import_receives_every_export_in_order() {
    let container = container_with("Value", vec![1i32, 2]);
    let importer = Importer::many("Value");
    container.compose(&adding(&[importer.part()])).unwrap();
    assert_eq!(importer.values::<i32>(), vec![1, 2]);

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Value", 3i32);
    container.compose(&batch).unwrap();

    assert_eq!(importer.values::<i32>(), vec![1, 2, 3]);
    assert_eq!(importer.satisfied_count(), 2);
}

#[test]
fn removed_part_is_released_after_commit() {
    let container = container_with("Value", vec![1i32]);
    let importer = Importer::many("Value");
    container.compose(&adding(&[importer.part()])).unwrap();
    assert!(!importer.was_released());

    container.compose(&removing(&[importer.part()])).unwrap();

    assert!(importer.was_released());
    assert!(!container.parts().contains(&importer.part()));
}

#[test]
fn released_part_is_no_longer_recomposed() {
    let container = container_with("Value", vec![1i32]);
    let importer = Importer::many("Value");
    container.compose(&adding(&[importer.part()])).unwrap();
    container.compose(&removing(&[importer.part()])).unwrap();

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Value", 2i32);
    container.compose(&batch).unwrap();

    assert_eq!(importer.satisfied_count(), 1);
    assert_eq!(importer.values::<i32>(), vec![1]);
}

#[test]
fn removing_absent_part_changes_nothing() {
    let container = container_with("Value", vec![1i32]);
    let stranger = value_part("Value", 2i32);
    let before = container.parts();

    container.compose(&removing(&[stranger])).unwrap();

    assert!(Arc::ptr_eq(&before, &container.parts()));
    assert_eq!(container.metrics().batches_started, 1);
}

#[test]
fn adding_present_part_changes_nothing() {
    let container = container();
    let part = value_part("Value", 1i32);
    container.compose(&adding(&[part.clone()])).unwrap();
    let before = container.parts();

    container.compose(&adding(&[part])).unwrap();

    assert!(Arc::ptr_eq(&before, &container.parts()));
    assert_eq!(container.get_exports_of("Value").unwrap().len(), 1);
}

#[test]
fn rejected_batch_can_be_retried_without_offender() {
    let container = container_with("Value", vec![1i32]);
    let importer = Importer::new("Value", Cardinality::ExactlyOne, false);
    container.compose(&adding(&[importer.part()])).unwrap();

    let offender = value_part("Value", 2i32);
    let harmless = value_part("Other", 3i32);
    let err = container
        .compose(&adding(&[offender, harmless.clone()]))
        .unwrap_err();
    assert!(err.errors()[0].part.is_some());

    container.compose(&adding(&[harmless])).unwrap();
    assert_eq!(*container.get_exported_value::<i32>("Other").unwrap(), 3);
}
