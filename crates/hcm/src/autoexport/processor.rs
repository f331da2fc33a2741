//! Turns the repository's event journal into debounced export passes.
//!
//! Each poll reads a bounded batch of journal events, folds the relevant
//! ones into the current [`ChangeLog`] and, once that log has been quiet
//! long enough, hands it to a [`ChangeExporter`]. Any failure stops the
//! processor until [`EventJournalProcessor::run_once`] is called.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use super::change_log::ChangeLog;
use super::configuration::Configuration;
use super::error::{AutoExportError, MergeError, Result};
use super::merge::DefinitionMergeService;
use super::settings::AutoExportConfig;
use crate::model::{ConfigurationItemCategory, ConfigurationModel, Module, ModuleKey, ModuleLocation};
use crate::path::{NodePath, PathPatterns};
use crate::repository::{EventJournal, EventType, JournalEvent};
use crate::serializer::AutoExportModuleWriter;

const NODE_TYPES_PATH: &str = "/jcr:system/jcr:nodeTypes";

/// Subtrees whose events never lead to an export.
const IGNORED_PREFIXES: &[&str] = &[
    "/jcr:system",
    "/hippo:log",
    "/content/attic",
    "/hippo:configuration/hippo:update/hippo:queue",
    "/hippo:configuration/hippo:update/hippo:history",
    "/hippo:configuration/hippo:temporary",
    "/hcm:hcm",
];

fn is_ignored(path: &str) -> bool {
    IGNORED_PREFIXES.iter().any(|prefix| {
        path == *prefix
            || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
    })
}

fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(i) => Some(&path[..i]),
    }
}

/// Receives a stable change log and brings the modules on disk in line
/// with it.
pub trait ChangeExporter: Send {
    fn export(&mut self, changes: &ChangeLog) -> Result<()>;

    /// The model used to look up item categories, when one is known.
    fn baseline(&self) -> Option<&ConfigurationModel> {
        None
    }
}

impl<F> ChangeExporter for F
where
    F: FnMut(&ChangeLog) -> Result<()> + Send,
{
    fn export(&mut self, changes: &ChangeLog) -> Result<()> {
        self(changes)
    }
}

/// Computes the definitions implied by a change log, as one synthetic
/// module.
pub trait ChangeDiff: Send {
    fn diff(&mut self, changes: &ChangeLog, baseline: &ConfigurationModel) -> Result<Module>;
}

/// Diffs, merges and writes: the full export pipeline for modules read
/// from directories.
pub struct ModuleExporter<D> {
    diff: D,
    merge: DefinitionMergeService,
    writer: AutoExportModuleWriter,
    baseline: ConfigurationModel,
    to_merge: Vec<ModuleKey>,
}

impl<D: ChangeDiff> ModuleExporter<D> {
    /// Every module of `baseline` that lives in a directory is merged into.
    pub fn new(diff: D, merge: DefinitionMergeService, baseline: ConfigurationModel) -> Self {
        let to_merge = baseline
            .modules()
            .iter()
            .filter(|m| matches!(m.location(), ModuleLocation::Directory(_)))
            .map(|m| m.key().clone())
            .collect();
        Self {
            diff,
            merge,
            writer: AutoExportModuleWriter::new(),
            baseline,
            to_merge,
        }
    }

    /// Restricts the merge to the given modules.
    pub fn with_modules(mut self, to_merge: Vec<ModuleKey>) -> Self {
        self.to_merge = to_merge;
        self
    }

    /// Modules whose files may be rewritten.
    pub fn to_merge(&self) -> &[ModuleKey] {
        &self.to_merge
    }
}

impl<D: ChangeDiff> ChangeExporter for ModuleExporter<D> {
    fn export(&mut self, changes: &ChangeLog) -> Result<()> {
        let delta = self.diff.diff(changes, &self.baseline)?;
        let to_merge = self
            .baseline
            .modules()
            .iter()
            .filter(|m| self.to_merge.contains(m.key()))
            .map(|m| m.as_ref());
        let mut merged = self
            .merge
            .merge_changes_to_modules(&delta, to_merge, &self.baseline)?;

        for module in merged.iter_mut().filter(|m| m.has_changes()) {
            self.writer.write_in_place(module)?;
            info!("Exported changes to module {}", module.key());
        }
        self.baseline = self
            .baseline
            .rebuild(merged.iter())
            .map_err(MergeError::from)?;
        Ok(())
    }

    fn baseline(&self) -> Option<&ConfigurationModel> {
        Some(&self.baseline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorState {
    /// Nothing recorded.
    Idle,
    /// Recording events into a change log that is not stable yet.
    Accumulating,
    /// A stable change log waits for the journal to be drained.
    Pending,
    /// Stopped by an error; needs a manual run.
    Failed,
}

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Disabled,
    Idle,
    Accumulating { paths: usize },
    Pending { paths: usize },
    Exported { revision: i64, paths: usize },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStatus {
    pub enabled: bool,
    pub state: ProcessorState,
    pub failed: bool,
    pub last_revision: i64,
    pub last_export: Option<DateTime<Utc>>,
    pub exports: u64,
    pub pending_paths: usize,
}

pub struct EventJournalProcessor {
    journal: Box<dyn EventJournal>,
    exporter: Box<dyn ChangeExporter>,
    configuration: Arc<Configuration>,
    exclusions: PathPatterns,
    min_age: Duration,
    max_age: Duration,
    batch_size: usize,
    /// Newest revision read from the journal.
    cursor: Option<i64>,
    /// Newest revision persisted as exported.
    persisted: i64,
    skip_to_head: bool,
    current: Option<ChangeLog>,
    pending: Option<ChangeLog>,
    failed: bool,
    last_export: Option<DateTime<Utc>>,
    exports: u64,
}

impl EventJournalProcessor {
    /// Creates a processor reading `journal` and handing change logs to `exporter`.
    pub fn new(
        settings: &AutoExportConfig,
        configuration: Arc<Configuration>,
        journal: Box<dyn EventJournal>,
        exporter: Box<dyn ChangeExporter>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            journal,
            exporter,
            configuration,
            exclusions: settings.exclusion_patterns()?,
            min_age: settings.min_change_log_age(),
            max_age: settings.max_change_log_age(),
            batch_size: settings.batch_size,
            cursor: None,
            persisted: -1,
            skip_to_head: false,
            current: None,
            pending: None,
            failed: false,
            last_export: None,
            exports: 0,
        })
    }

    /// The persisted switch this processor checks on every poll.
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// True once a poll has failed and until `run_once` is called.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Where the processor is in its poll cycle.
    pub fn state(&self) -> ProcessorState {
        if self.failed {
            ProcessorState::Failed
        } else if self.pending.is_some() {
            ProcessorState::Pending
        } else if self.current.is_some() {
            ProcessorState::Accumulating
        } else {
            ProcessorState::Idle
        }
    }

    /// A snapshot for administrative callers.
    pub fn status(&self) -> ProcessorStatus {
        let pending_paths = self.current.as_ref().map_or(0, ChangeLog::len)
            + self.pending.as_ref().map_or(0, ChangeLog::len);
        ProcessorStatus {
            enabled: self.configuration.is_enabled(),
            state: self.state(),
            failed: self.failed,
            last_revision: self.persisted,
            last_export: self.last_export,
            exports: self.exports,
            pending_paths,
        }
    }

    /// One scheduled poll. Refuses to run after a failure.
    pub fn poll(&mut self, now: Instant) -> Result<PollOutcome> {
        if self.failed {
            return Err(AutoExportError::TaskFailed);
        }
        let span = info_span!("poll");
        let _enter = span.enter();
        self.process(now).inspect_err(|e| {
            error!("Auto-export stopped: {}", e);
            self.failed = true;
        })
    }

    /// Clears a failure and polls once.
    pub fn run_once(&mut self, now: Instant) -> Result<PollOutcome> {
        if self.failed {
            info!("Restarting auto-export after an earlier failure");
            self.failed = false;
        }
        self.poll(now)
    }

    fn process(&mut self, now: Instant) -> Result<PollOutcome> {
        if !self.configuration.is_enabled() {
            if self.current.is_some() || self.pending.is_some() {
                warn!("Auto-export disabled, dropping unexported changes");
            }
            self.current = None;
            self.pending = None;
            self.skip_to_head = true;
            return Ok(PollOutcome::Disabled);
        }

        let cursor = self.cursor()?;
        let events = self.journal.read_after(cursor, self.batch_size)?;
        let drained = events.len() < self.batch_size;
        if !events.is_empty() {
            debug!("Read {} journal events after revision {}", events.len(), cursor);
        }
        for event in &events {
            self.apply(event, now);
            self.cursor = Some(event.revision);
            if let Some(log) = self.current.as_mut() {
                log.set_last_revision(event.revision);
            }
        }

        if self.pending.is_none() {
            if let Some(log) = self.current.take() {
                let quiet = log.quiet_for(now) >= self.min_age;
                let too_old = log.age(now) >= self.max_age;
                if quiet || too_old {
                    if too_old && !quiet {
                        info!("Change log is {:?} old, exporting without waiting for quiet", log.age(now));
                    }
                    self.pending = Some(log);
                } else {
                    self.current = Some(log);
                }
            }
        }

        if let Some(log) = &self.pending {
            if !drained && log.age(now) < self.max_age {
                return Ok(PollOutcome::Pending { paths: log.len() });
            }
            return self.export_pending();
        }

        if let Some(log) = &self.current {
            return Ok(PollOutcome::Accumulating { paths: log.len() });
        }
        let cursor = self.cursor.unwrap_or(-1);
        if cursor > self.persisted {
            self.persist(cursor)?;
        }
        Ok(PollOutcome::Idle)
    }

    fn cursor(&mut self) -> Result<i64> {
        if self.skip_to_head {
            let head = self.journal.head_revision()?;
            info!("Auto-export enabled, continuing from journal revision {}", head);
            self.skip_to_head = false;
            self.cursor = Some(head);
            self.persist(head)?;
            return Ok(head);
        }
        match self.cursor {
            Some(cursor) => Ok(cursor),
            None => {
                let revision = self.configuration.last_revision()?;
                self.persisted = revision;
                self.cursor = Some(revision);
                Ok(revision)
            }
        }
    }

    fn persist(&mut self, revision: i64) -> Result<()> {
        self.configuration.set_last_revision(revision)?;
        self.persisted = revision;
        Ok(())
    }

    fn export_pending(&mut self) -> Result<PollOutcome> {
        let Some(log) = self.pending.take() else {
            return Ok(PollOutcome::Idle);
        };
        let paths = log.len();
        let span = info_span!("export", paths, revision = log.last_revision());
        let _enter = span.enter();

        if let Err(e) = self.exporter.export(&log) {
            self.pending = Some(log);
            return Err(e);
        }

        let revision = match &self.current {
            Some(_) => log.last_revision(),
            None => self.cursor.unwrap_or(log.last_revision()),
        };
        self.persist(revision)?;
        self.last_export = Some(Utc::now());
        self.exports += 1;
        info!("Exported {} changed paths up to revision {}", paths, revision);
        Ok(PollOutcome::Exported { revision, paths })
    }

    /// Folds one event into the current change log; events that cannot be
    /// evaluated are dropped.
    fn apply(&mut self, event: &JournalEvent, now: Instant) {
        if event.event_type == EventType::Persist {
            return;
        }

        if event.path == NODE_TYPES_PATH || event.path.starts_with("/jcr:system/jcr:nodeTypes/") {
            if let Some(prefixes) = &event.user_data {
                let log = self.current.get_or_insert_with(|| ChangeLog::new(now));
                for prefix in prefixes.split('|').map(str::trim).filter(|p| !p.is_empty()) {
                    debug!("Node types of namespace '{}' changed", prefix);
                    log.record_namespace(prefix, now);
                }
            }
            return;
        }

        let is_property = event.event_type.is_property_event();
        if !self.is_relevant(&event.path, is_property) {
            return;
        }

        let log = self.current.get_or_insert_with(|| ChangeLog::new(now));
        match event.event_type {
            EventType::NodeAdded => log.record_node_added(&event.path, now),
            EventType::NodeRemoved => log.record_node_removed(&event.path, now),
            EventType::NodeMoved => match event.src_path.as_deref() {
                Some(from) if !is_ignored(from) => log.record_node_moved(from, &event.path, now),
                _ => log.record_node_added(&event.path, now),
            },
            EventType::PropertyAdded | EventType::PropertyChanged | EventType::PropertyRemoved => {
                log.record_property_changed(&event.path, now)
            }
            EventType::Persist => {}
        }
        if log.is_empty() {
            self.current = None;
        }
    }

    fn is_relevant(&self, path: &str, is_property: bool) -> bool {
        if is_ignored(path) {
            return false;
        }
        let node = if is_property { parent_path(path) } else { Some(path) };
        let (Some(node), Ok(item)) = (node, NodePath::parse(path)) else {
            debug!("Dropping event for unparseable path '{}'", path);
            return false;
        };
        match NodePath::parse(node) {
            Ok(node_path) if self.exclusions.matches(&node_path) => return false,
            Ok(_) => {}
            Err(e) => {
                debug!("Dropping event for '{}': {}", path, e);
                return false;
            }
        }
        match self.exporter.baseline() {
            Some(model) => model.category_for_item(&item, is_property) != ConfigurationItemCategory::Runtime,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoexport::configuration::{CONFIG_NODE_PATH, ENABLED_PROPERTY, LAST_REVISION_PROPERTY};
    use crate::repository::{MemoryJournal, MemorySession, PropertyValue};
    use serial_test::serial;
    use std::sync::Mutex;

    type Exported = Arc<Mutex<Vec<ChangeLog>>>;

    fn setup(enabled: bool) -> (MemorySession, MemoryJournal, Exported, EventJournalProcessor) {
        let session = MemorySession::new().with_property(
            &format!("{}/{}", CONFIG_NODE_PATH, ENABLED_PROPERTY),
            PropertyValue::Boolean(enabled),
        );
        let journal = MemoryJournal::new();
        let exported: Exported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&exported);
        let exporter = move |log: &ChangeLog| -> Result<()> {
            sink.lock().unwrap().push(log.clone());
            Ok(())
        };
        let settings = AutoExportConfig {
            exclusions: vec!["/content/excluded".to_string()],
            ..AutoExportConfig::default()
        };
        let processor = EventJournalProcessor::new(
            &settings,
            Arc::new(Configuration::new(Arc::new(session.clone()))),
            Box::new(journal.clone()),
            Box::new(exporter),
        )
        .unwrap();
        (session, journal, exported, processor)
    }

    fn ms(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    #[test]
    #[serial]
    fn test_burst_is_exported_once() {
        let (session, journal, exported, mut processor) = setup(true);
        let start = Instant::now();
        for i in 0..20 {
            journal.append(EventType::PropertyChanged, &format!("/config/node{}/prop", i % 3));
        }

        assert_eq!(processor.poll(start).unwrap(), PollOutcome::Accumulating { paths: 3 });
        assert_eq!(processor.state(), ProcessorState::Accumulating);
        assert!(matches!(processor.poll(ms(start, 100)).unwrap(), PollOutcome::Accumulating { .. }));
        assert_eq!(
            processor.poll(ms(start, 300)).unwrap(),
            PollOutcome::Exported { revision: 19, paths: 3 }
        );
        assert_eq!(processor.poll(ms(start, 600)).unwrap(), PollOutcome::Idle);

        assert_eq!(exported.lock().unwrap().len(), 1);
        assert_eq!(
            session.saved_property(&format!("{}/{}", CONFIG_NODE_PATH, LAST_REVISION_PROPERTY)),
            Some(PropertyValue::Long(19))
        );
    }

    #[test]
    #[serial]
    fn test_new_events_postpone_export() {
        let (_session, journal, exported, mut processor) = setup(true);
        let start = Instant::now();
        journal.append(EventType::NodeAdded, "/config/a");
        processor.poll(start).unwrap();
        journal.append(EventType::NodeAdded, "/config/b");
        processor.poll(ms(start, 200)).unwrap();
        assert!(matches!(processor.poll(ms(start, 300)).unwrap(), PollOutcome::Accumulating { .. }));
        assert!(matches!(processor.poll(ms(start, 450)).unwrap(), PollOutcome::Exported { .. }));
        let exported = exported.lock().unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].added().len(), 2);
    }

    #[test]
    #[serial]
    fn test_max_age_forces_export() {
        let (_session, journal, exported, mut processor) = setup(true);
        let start = Instant::now();
        let mut t = 0;
        while t <= 10_000 {
            journal.append(EventType::PropertyChanged, "/config/busy/prop");
            let _ = processor.poll(ms(start, t)).unwrap();
            t += 100;
        }
        assert_eq!(exported.lock().unwrap().len(), 1);
    }

    #[test]
    #[serial]
    fn test_ignored_and_excluded_paths() {
        let (_session, journal, exported, mut processor) = setup(true);
        let start = Instant::now();
        journal.append(EventType::Persist, "/");
        journal.append(EventType::NodeAdded, "/hippo:log/entry");
        journal.append(EventType::PropertyChanged, "/content/attic/x/prop");
        journal.append(EventType::NodeAdded, "/content/excluded/doc");
        journal.append(EventType::NodeAdded, "/jcr:system/jcr:versionStorage/x");
        assert_eq!(processor.poll(start).unwrap(), PollOutcome::Idle);
        assert_eq!(processor.status().last_revision, 4);
        assert!(exported.lock().unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn test_node_type_events_record_namespaces() {
        let (_session, journal, exported, mut processor) = setup(true);
        let start = Instant::now();
        journal.push(|r| JournalEvent::new(r, EventType::NodeAdded, NODE_TYPES_PATH).with_user_data("myproject|other"));
        processor.poll(start).unwrap();
        processor.poll(ms(start, 300)).unwrap();
        let exported = exported.lock().unwrap();
        assert_eq!(exported.len(), 1);
        assert!(exported[0].namespaces().contains("myproject"));
        assert!(exported[0].namespaces().contains("other"));
        assert!(exported[0].changed().is_empty());
    }

    #[test]
    #[serial]
    fn test_failure_stops_until_run_once() {
        let (_session, journal, _exported, mut processor) = setup(true);
        let start = Instant::now();
        journal.fail_reads(true);
        assert!(processor.poll(start).is_err());
        assert!(processor.is_failed());
        assert!(matches!(processor.poll(start), Err(AutoExportError::TaskFailed)));

        journal.fail_reads(false);
        journal.append(EventType::NodeAdded, "/config/a");
        assert!(matches!(processor.run_once(start).unwrap(), PollOutcome::Accumulating { .. }));
        assert!(!processor.is_failed());
    }

    #[test]
    #[serial]
    fn test_failed_export_keeps_log() {
        let session = MemorySession::new().with_property(
            &format!("{}/{}", CONFIG_NODE_PATH, ENABLED_PROPERTY),
            PropertyValue::Boolean(true),
        );
        let journal = MemoryJournal::new();
        let attempts = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&attempts);
        let exporter = move |_: &ChangeLog| -> Result<()> {
            let mut count = counter.lock().unwrap();
            *count += 1;
            if *count == 1 {
                Err(AutoExportError::Export("disk full".to_string()))
            } else {
                Ok(())
            }
        };
        let mut processor = EventJournalProcessor::new(
            &AutoExportConfig::default(),
            Arc::new(Configuration::new(Arc::new(session))),
            Box::new(journal.clone()),
            Box::new(exporter),
        )
        .unwrap();

        let start = Instant::now();
        journal.append(EventType::NodeAdded, "/config/a");
        processor.poll(start).unwrap();
        assert!(processor.poll(ms(start, 300)).is_err());
        assert_eq!(processor.state(), ProcessorState::Failed);
        assert!(matches!(processor.run_once(ms(start, 400)).unwrap(), PollOutcome::Exported { .. }));
        assert_eq!(*attempts.lock().unwrap(), 2);
    }

    #[test]
    #[serial]
    fn test_disabled_skips_to_head() {
        let (session, journal, exported, mut processor) = setup(false);
        let start = Instant::now();
        journal.append(EventType::NodeAdded, "/config/a");
        journal.append(EventType::NodeAdded, "/config/b");
        assert_eq!(processor.poll(start).unwrap(), PollOutcome::Disabled);

        processor.configuration().set_enabled(true).unwrap();
        assert_eq!(processor.poll(ms(start, 10)).unwrap(), PollOutcome::Idle);
        assert_eq!(
            session.saved_property(&format!("{}/{}", CONFIG_NODE_PATH, LAST_REVISION_PROPERTY)),
            Some(PropertyValue::Long(1))
        );
        assert!(exported.lock().unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn test_status_serializes() {
        let (_session, _journal, _exported, processor) = setup(true);
        let json = serde_json::to_value(processor.status()).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["lastRevision"], -1);
        assert_eq!(json["failed"], false);
    }

    #[test]
    fn test_is_ignored() {
        assert!(is_ignored("/jcr:system"));
        assert!(is_ignored("/hippo:log/x"));
        assert!(!is_ignored("/hippo:logs"));
        assert!(!is_ignored("/content/documents"));
    }
}
