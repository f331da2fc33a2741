//! The slice of the content repository the auto-export engine talks to.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

pub use memory::{MemoryJournal, MemorySession};

/// A stored property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Boolean(bool),
    Long(i64),
    String(String),
    Strings(Vec<String>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(v) => Some(*v),
            PropertyValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// All values as strings; a single value yields one entry.
    pub fn as_strings(&self) -> Vec<String> {
        match self {
            PropertyValue::Strings(values) => values.clone(),
            PropertyValue::String(s) => vec![s.clone()],
            PropertyValue::Long(v) => vec![v.to_string()],
            PropertyValue::Boolean(b) => vec![b.to_string()],
        }
    }
}

/// Property access on a repository session.
pub trait RepositorySession: Send + Sync {
    /// The value of the property at an absolute path, `None` if absent.
    fn property(&self, path: &str) -> Result<Option<PropertyValue>, RepositoryError>;

    /// Sets a property; the change is pending until [`RepositorySession::save`].
    fn set_property(&self, path: &str, value: PropertyValue) -> Result<(), RepositoryError>;

    fn save(&self) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NodeAdded,
    NodeRemoved,
    NodeMoved,
    PropertyAdded,
    PropertyChanged,
    PropertyRemoved,
    /// Marks the end of a save; carries no path of interest.
    Persist,
}

impl EventType {
    pub fn is_node_event(&self) -> bool {
        matches!(
            self,
            EventType::NodeAdded | EventType::NodeRemoved | EventType::NodeMoved
        )
    }

    pub fn is_property_event(&self) -> bool {
        matches!(
            self,
            EventType::PropertyAdded | EventType::PropertyChanged | EventType::PropertyRemoved
        )
    }
}

/// One entry of the revision journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEvent {
    pub revision: i64,
    pub event_type: EventType,
    /// Absolute path of the node or property the event is about.
    pub path: String,
    /// Former path of a moved node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

impl JournalEvent {
    /// Creates an event without a source path or user data.
    pub fn new(revision: i64, event_type: EventType, path: impl Into<String>) -> Self {
        Self {
            revision,
            event_type,
            path: path.into(),
            src_path: None,
            user_data: None,
        }
    }

    /// A node move from `src_path` to `path`.
    pub fn moved(revision: i64, path: impl Into<String>, src_path: impl Into<String>) -> Self {
        Self {
            src_path: Some(src_path.into()),
            ..Self::new(revision, EventType::NodeMoved, path)
        }
    }

    pub fn with_user_data(mut self, user_data: impl Into<String>) -> Self {
        self.user_data = Some(user_data.into());
        self
    }
}

/// The repository's ordered revision journal.
pub trait EventJournal: Send {
    /// Up to `limit` events with a revision greater than `revision`, in
    /// revision order.
    fn read_after(&self, revision: i64, limit: usize) -> Result<Vec<JournalEvent>, RepositoryError>;

    /// The newest revision in the journal, `-1` when empty.
    fn head_revision(&self) -> Result<i64, RepositoryError>;
}
