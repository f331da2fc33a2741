//! Integration tests for the journal processor driving a full export.

mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::*;
use hcm::autoexport::configuration::{CONFIG_NODE_PATH, ENABLED_PROPERTY, LAST_REVISION_PROPERTY};
use hcm::autoexport::error::Result;
use hcm::autoexport::{ChangeDiff, ChangeLog, ModuleExporter, PollOutcome};
use hcm::model::{DefinitionNode, SourceType};
use hcm::repository::{EventType, MemoryJournal, MemorySession, PropertyValue};
use hcm::{AutoExportConfig, Configuration, ConfigurationModel, EventJournalProcessor, Module};

const APP: &str = "repository-data/application";

/// Turns every added path into a new `nt:unstructured` node.
struct AddedNodes {
    calls: Arc<Mutex<Vec<ChangeLog>>>,
}

impl ChangeDiff for AddedNodes {
    fn diff(&mut self, changes: &ChangeLog, _baseline: &ConfigurationModel) -> Result<Module> {
        self.calls.lock().unwrap().push(changes.clone());
        let mut builder = ChangesBuilder::new();
        for path in changes.added() {
            builder = builder.config(NodeBuilder::typed(path, "nt:unstructured").build());
        }
        for path in changes.deleted() {
            builder = builder.config(DefinitionNode::delete_marker(p(path)));
        }
        Ok(builder.build())
    }
}

fn project() -> TestHarness {
    let harness = TestHarness::new();
    harness.create_module(APP, "application", &[]);
    harness.write_config(
        APP,
        "main.yaml",
        "definitions:\n  config:\n    /content:\n      jcr:primaryType: nt:unstructured\n      /foo:\n        jcr:primaryType: nt:unstructured\n        /section:\n          jcr:primaryType: nt:unstructured\n",
    );
    harness
}

struct Setup {
    session: MemorySession,
    journal: MemoryJournal,
    calls: Arc<Mutex<Vec<ChangeLog>>>,
    processor: EventJournalProcessor,
}

fn setup(harness: &TestHarness) -> Setup {
    let session = MemorySession::new().with_property(
        &format!("{}/{}", CONFIG_NODE_PATH, ENABLED_PROPERTY),
        PropertyValue::Boolean(true),
    );
    let journal = MemoryJournal::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let settings = AutoExportConfig {
        min_change_log_age_ms: 100,
        ..AutoExportConfig::default()
    };
    let exporter = ModuleExporter::new(
        AddedNodes {
            calls: Arc::clone(&calls),
        },
        merge_service(&[(APP, "/")]),
        harness.baseline(),
    );
    let processor = EventJournalProcessor::new(
        &settings,
        Arc::new(Configuration::new(Arc::new(session.clone()))),
        Box::new(journal.clone()),
        Box::new(exporter),
    )
    .unwrap();
    Setup {
        session,
        journal,
        calls,
        processor,
    }
}

fn ms(start: Instant, millis: u64) -> Instant {
    start + Duration::from_millis(millis)
}

#[test]
fn test_module_exporter_selects_directory_modules() {
    let harness = project();
    let exporter = ModuleExporter::new(
        AddedNodes {
            calls: Arc::new(Mutex::new(Vec::new())),
        },
        merge_service(&[(APP, "/")]),
        harness.baseline(),
    );
    assert_eq!(exporter.to_merge().len(), 1);
    assert_eq!(exporter.to_merge()[0].module, "application");
}

#[test]
fn test_added_node_is_exported_to_disk() {
    let harness = project();
    let mut s = setup(&harness);
    let start = Instant::now();

    s.journal.append(EventType::NodeAdded, "/content/foo/section/item");
    s.journal.append(EventType::PropertyAdded, "/content/foo/section/item/jcr:primaryType");

    assert!(matches!(s.processor.poll(start).unwrap(), PollOutcome::Accumulating { .. }));
    assert!(matches!(s.processor.poll(ms(start, 150)).unwrap(), PollOutcome::Exported { revision: 1, .. }));

    let calls = s.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].added().contains("/content/foo/section/item"));

    let model = harness.baseline();
    assert!(model.resolve_id(&p("/content/foo/section/item")).is_some());
    assert_eq!(harness.read_modules()[0].sources().len(), 1);
    assert!(harness
        .read_source(APP, SourceType::Config, "main.yaml")
        .contains("/item"));
    assert_eq!(
        s.session
            .saved_property(&format!("{}/{}", CONFIG_NODE_PATH, LAST_REVISION_PROPERTY)),
        Some(PropertyValue::Long(1))
    );
}

#[test]
fn test_consecutive_exports_build_on_each_other() {
    let harness = project();
    let mut s = setup(&harness);
    let start = Instant::now();

    s.journal.append(EventType::NodeAdded, "/content/newfolder");
    s.processor.poll(start).unwrap();
    assert!(matches!(s.processor.poll(ms(start, 150)).unwrap(), PollOutcome::Exported { .. }));
    assert!(harness.exists(APP, SourceType::Config, "content/newfolder.yaml"));

    s.journal.append(EventType::NodeRemoved, "/content/newfolder");
    s.processor.poll(ms(start, 300)).unwrap();
    assert!(matches!(s.processor.poll(ms(start, 450)).unwrap(), PollOutcome::Exported { .. }));

    assert_eq!(s.calls.lock().unwrap().len(), 2);
    assert!(!harness.exists(APP, SourceType::Config, "content/newfolder.yaml"));
    assert!(harness.baseline().resolve_id(&p("/content/newfolder")).is_none());
}

#[test]
fn test_runtime_paths_are_not_exported() {
    let harness = project();
    let mut s = setup(&harness);
    let start = Instant::now();

    s.journal.append(EventType::NodeAdded, "/hippo:log/entry");
    s.journal.append(EventType::NodeAdded, "/content/attic/old");

    assert_eq!(s.processor.poll(start).unwrap(), PollOutcome::Idle);
    assert_eq!(s.processor.poll(ms(start, 500)).unwrap(), PollOutcome::Idle);
    assert!(s.calls.lock().unwrap().is_empty());
}
