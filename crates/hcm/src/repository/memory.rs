//! In-memory session and journal, for tests and for driving the engine
//! from recorded event streams.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{EventJournal, EventType, JournalEvent, PropertyValue, RepositorySession};
use crate::error::RepositoryError;

#[derive(Debug, Default)]
struct SessionState {
    saved: BTreeMap<String, PropertyValue>,
    pending: BTreeMap<String, PropertyValue>,
}

/// A session over a flat map of property paths.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    state: Arc<Mutex<SessionState>>,
    fail_reads: Arc<AtomicBool>,
}

impl MemorySession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a property as already saved.
    pub fn with_property(self, path: &str, value: PropertyValue) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.saved.insert(path.to_string(), value);
        }
        self
    }

    /// Makes every subsequent read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// The saved value of a property, ignoring pending changes.
    pub fn saved_property(&self, path: &str) -> Option<PropertyValue> {
        self.state.lock().ok()?.saved.get(path).cloned()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SessionState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::Access(format!("session lock poisoned: {}", e)))
    }
}

impl RepositorySession for MemorySession {
    fn property(&self, path: &str) -> Result<Option<PropertyValue>, RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Access(format!("cannot read {}", path)));
        }
        let state = self.lock()?;
        Ok(state
            .pending
            .get(path)
            .or_else(|| state.saved.get(path))
            .cloned())
    }

    fn set_property(&self, path: &str, value: PropertyValue) -> Result<(), RepositoryError> {
        self.lock()?.pending.insert(path.to_string(), value);
        Ok(())
    }

    fn save(&self) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let pending = std::mem::take(&mut state.pending);
        state.saved.extend(pending);
        Ok(())
    }
}

/// An append-only journal. Clones share the same events.
#[derive(Debug, Clone, Default)]
pub struct MemoryJournal {
    events: Arc<Mutex<Vec<JournalEvent>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event with the next revision number.
    pub fn append(&self, event_type: EventType, path: &str) -> i64 {
        self.push(|revision| JournalEvent::new(revision, event_type, path))
    }

    /// Appends an event built from the next revision number.
    pub fn push<F>(&self, build: F) -> i64
    where
        F: FnOnce(i64) -> JournalEvent,
    {
        let Ok(mut events) = self.events.lock() else {
            return -1;
        };
        let revision = events.last().map(|e| e.revision + 1).unwrap_or(0);
        events.push(build(revision));
        revision
    }

    /// Makes every subsequent read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventJournal for MemoryJournal {
    fn read_after(&self, revision: i64, limit: usize) -> Result<Vec<JournalEvent>, RepositoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Journal("journal unavailable".to_string()));
        }
        let events = self
            .events
            .lock()
            .map_err(|e| RepositoryError::Journal(e.to_string()))?;
        Ok(events
            .iter()
            .filter(|e| e.revision > revision)
            .take(limit)
            .cloned()
            .collect())
    }

    fn head_revision(&self) -> Result<i64, RepositoryError> {
        let events = self
            .events
            .lock()
            .map_err(|e| RepositoryError::Journal(e.to_string()))?;
        Ok(events.last().map(|e| e.revision).unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_pending_until_save() {
        let session = MemorySession::new();
        session
            .set_property("/a/b", PropertyValue::Boolean(true))
            .unwrap();
        assert_eq!(
            session.property("/a/b").unwrap(),
            Some(PropertyValue::Boolean(true))
        );
        assert_eq!(session.saved_property("/a/b"), None);
        session.save().unwrap();
        assert_eq!(
            session.saved_property("/a/b"),
            Some(PropertyValue::Boolean(true))
        );
    }

    #[test]
    fn test_journal_read_after() {
        let journal = MemoryJournal::new();
        assert_eq!(journal.head_revision().unwrap(), -1);
        for i in 0..5 {
            journal.append(EventType::PropertyChanged, &format!("/a/p{}", i));
        }
        let events = journal.read_after(1, 2).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].revision, 2);
        assert_eq!(events[1].path, "/a/p3");
        assert_eq!(journal.head_revision().unwrap(), 4);
    }

    #[test]
    fn test_failing_reads() {
        let journal = MemoryJournal::new();
        journal.fail_reads(true);
        assert!(journal.read_after(-1, 10).is_err());

        let session = MemorySession::new();
        session.fail_reads(true);
        assert!(session.property("/x").is_err());
    }
}
