//! Catalog Tests
//!
//! Parts described by a catalog are created on first use, share one instance
//! across their exports, and import from everything else in the container.

use crate::common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Greeter {
    exports: Vec<ExportDefinition>,
    imports: Vec<ImportDefinition>,
    names: Mutex<Vec<String>>,
    injections: Arc<AtomicUsize>,
}

impl ComposablePart for Greeter {
    fn export_definitions(&self) -> &[ExportDefinition] {
        &self.exports
    }

    fn import_definitions(&self) -> &[ImportDefinition] {
        &self.imports
    }

    fn get_exported_value(&self, _: &ExportDefinition) -> Result<ExportedValue, PartError> {
        Ok(Arc::new(format!("Hello, {}", self.names.lock().join(", "))))
    }

    fn set_import(&self, _: &ImportDefinition, exports: &[Export]) -> Result<(), PartError> {
        self.injections.fetch_add(1, Ordering::SeqCst);
        let names = exports
            .iter()
            .map(|e| e.value_as::<String>().map(|v| v.as_ref().clone()))
            .collect::<MosaicResult<Vec<_>>>()
            .map_err(|e| PartError::new(e.to_string()))?;
        *self.names.lock() = names;
        Ok(())
    }
}

struct Fixture {
    container: Arc<CompositionContainer>,
    created: Arc<AtomicUsize>,
    injections: Arc<AtomicUsize>,
}

fn greeter_catalog(import: ImportDefinition) -> Fixture {
    init_tracing();
    let created = Arc::new(AtomicUsize::new(0));
    let injections = Arc::new(AtomicUsize::new(0));
    let exports = vec![ExportDefinition::new("Greeting")];
    let imports = vec![import];

    let catalog = {
        let created = Arc::clone(&created);
        let injections = Arc::clone(&injections);
        let (exports, imports) = (exports.clone(), imports.clone());
        PartCatalog::new().with_part(PartDefinition::of(exports.clone(), imports.clone(), move || {
            created.fetch_add(1, Ordering::SeqCst);
            Greeter {
                exports: exports.clone(),
                imports: imports.clone(),
                names: Mutex::new(Vec::new()),
                injections: Arc::clone(&injections),
            }
        }))
    };
    let container = CompositionContainer::with_catalog(&catalog, CompositionOptions::default()).unwrap();
    Fixture {
        container: Arc::new(container),
        created,
        injections,
    }
}

#[test]
fn catalog_part_imports_composed_export() {
    let fixture = greeter_catalog(ImportDefinition::contract("Name", Cardinality::ExactlyOne));
    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Name", String::from("World"));
    fixture.container.compose(&batch).unwrap();
    assert_eq!(fixture.created.load(Ordering::SeqCst), 0);

    let greeting = fixture.container.get_exported_value::<String>("Greeting").unwrap();

    assert_eq!(greeting.as_str(), "Hello, World");
    assert_eq!(fixture.created.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.container.catalog_parts().len(), 1);
}

#[test]
fn catalog_part_is_created_once() {
    let fixture = greeter_catalog(ImportDefinition::contract("Name", Cardinality::ZeroOrMore));
    for _ in 0..3 {
        fixture.container.get_exported_value::<String>("Greeting").unwrap();
    }
    assert_eq!(fixture.created.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.injections.load(Ordering::SeqCst), 1);
}

#[test]
fn catalog_part_with_recomposable_import_is_recomposed() {
    let fixture = greeter_catalog(
        ImportDefinition::contract("Name", Cardinality::ZeroOrMore).recomposable(true),
    );
    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Name", String::from("World"));
    fixture.container.compose(&batch).unwrap();
    assert_eq!(
        fixture.container.get_exported_value::<String>("Greeting").unwrap().as_str(),
        "Hello, World"
    );

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Name", String::from("Moon"));
    fixture.container.compose(&batch).unwrap();

    assert_eq!(fixture.injections.load(Ordering::SeqCst), 2);
    assert_eq!(
        fixture.container.get_exported_value::<String>("Greeting").unwrap().as_str(),
        "Hello, World, Moon"
    );
}

#[test]
fn catalog_part_with_fixed_import_vetoes_change() {
    let fixture = greeter_catalog(ImportDefinition::contract("Name", Cardinality::ZeroOrMore));
    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Name", String::from("World"));
    fixture.container.compose(&batch).unwrap();
    fixture.container.get_exported_value::<String>("Greeting").unwrap();

    let mut batch = CompositionBatch::new();
    batch.add_exported_value("Name", String::from("Moon"));
    let err = fixture.container.compose(&batch).unwrap_err();

    assert!(err.is_rejection());
    assert_eq!(err.errors()[0].kind, CompositionErrorKind::PreventedByExistingImport);
}

#[test]
fn catalog_part_with_unsatisfied_import_fails_on_use() {
    let fixture = greeter_catalog(ImportDefinition::contract("Name", Cardinality::ExactlyOne));
    assert!(fixture.container.is_present("Greeting").unwrap());
    assert!(fixture.container.get_exported_value::<String>("Greeting").is_err());
}

#[test]
fn composed_importer_pulls_catalog_export() {
    let fixture = greeter_catalog(ImportDefinition::contract("Name", Cardinality::ZeroOrMore));
    let importer = Importer::many("Greeting");
    let mut batch = adding(&[importer.part()]);
    batch.add_exported_value("Name", String::from("Catalog"));

    fixture.container.compose(&batch).unwrap();

    assert_eq!(importer.values::<String>(), vec![String::from("Hello, Catalog")]);
    assert_eq!(fixture.created.load(Ordering::SeqCst), 1);
}

#[test]
fn catalog_exports_are_adapted() {
    let fixture = greeter_catalog(ImportDefinition::contract("Name", Cardinality::ZeroOrMore));
    fixture
        .container
        .compose(&adding(&[adapter("Greeting", "Welcome")]))
        .unwrap();
    assert_eq!(fixture.created.load(Ordering::SeqCst), 0);

    let welcome = fixture.container.get_exported_value::<String>("Welcome").unwrap();
    assert_eq!(welcome.as_str(), "Hello, ");
    assert_eq!(fixture.created.load(Ordering::SeqCst), 1);
}
