//! The persisted auto-export switch and last exported revision.

use std::sync::{Arc, Mutex, MutexGuard};

use super::error::{AutoExportError, Result};
use crate::repository::{PropertyValue, RepositorySession};

pub const CONFIG_NODE_PATH: &str = "/hippo:configuration/hippo:modules/autoexport/hippo:moduleconfig";
pub const ENABLED_PROPERTY: &str = "autoexport:enabled";
pub const LAST_REVISION_PROPERTY: &str = "autoexport:lastrevision";

/// Environment variable that can veto auto-export for the whole process.
pub const ALLOWED_ENV: &str = "HCM_AUTOEXPORT_ALLOWED";

#[derive(Debug, Default)]
struct Cache {
    enabled: Option<bool>,
    last_revision: Option<i64>,
}

/// Reads and writes the auto-export switch on the configuration node.
///
/// Values are cached after the first successful read. All access goes
/// through one lock, so the processor thread and administrative callers
/// can share an instance.
pub struct Configuration {
    session: Arc<dyn RepositorySession>,
    config_path: String,
    cache: Mutex<Cache>,
}

impl Configuration {
    /// Creates a configuration stored on the default config node.
    pub fn new(session: Arc<dyn RepositorySession>) -> Self {
        Self::with_path(session, CONFIG_NODE_PATH)
    }

    /// Creates a configuration stored on `config_path`.
    pub fn with_path(session: Arc<dyn RepositorySession>, config_path: impl Into<String>) -> Self {
        Self {
            session,
            config_path: config_path.into(),
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    pub fn session(&self) -> &Arc<dyn RepositorySession> {
        &self.session
    }

    /// False when the process environment forbids auto-export.
    pub fn is_allowed() -> bool {
        match std::env::var(ALLOWED_ENV) {
            Ok(value) => !value.trim().eq_ignore_ascii_case("false"),
            Err(_) => true,
        }
    }

    /// Whether auto-export is on. Any read failure counts as disabled.
    pub fn is_enabled(&self) -> bool {
        if !Self::is_allowed() {
            return false;
        }
        let Ok(mut cache) = self.cache.lock() else {
            return false;
        };
        if let Some(enabled) = cache.enabled {
            return enabled;
        }
        match self.session.property(&self.property_path(ENABLED_PROPERTY)) {
            Ok(value) => {
                let enabled = value.and_then(|v| v.as_bool()).unwrap_or(false);
                cache.enabled = Some(enabled);
                enabled
            }
            Err(e) => {
                tracing::warn!("Cannot read auto-export state, treating it as disabled: {}", e);
                false
            }
        }
    }

    /// Persists the switch and updates the cache.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut cache = self.lock()?;
        self.session
            .set_property(&self.property_path(ENABLED_PROPERTY), PropertyValue::Boolean(enabled))?;
        self.session.save()?;
        cache.enabled = Some(enabled);
        tracing::info!("Auto-export {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// The last exported revision, `-1` when nothing was exported yet.
    pub fn last_revision(&self) -> Result<i64> {
        let mut cache = self.lock()?;
        if let Some(revision) = cache.last_revision {
            return Ok(revision);
        }
        let revision = self
            .session
            .property(&self.property_path(LAST_REVISION_PROPERTY))?
            .and_then(|v| v.as_long())
            .unwrap_or(-1);
        cache.last_revision = Some(revision);
        Ok(revision)
    }

    /// Persists the revision, then updates the cache.
    pub fn set_last_revision(&self, revision: i64) -> Result<()> {
        let mut cache = self.lock()?;
        self.session.set_property(
            &self.property_path(LAST_REVISION_PROPERTY),
            PropertyValue::Long(revision),
        )?;
        self.session.save()?;
        cache.last_revision = Some(revision);
        Ok(())
    }

    /// Drops cached values so the next access reads the repository.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Cache::default();
        }
    }

    fn property_path(&self, name: &str) -> String {
        format!("{}/{}", self.config_path, name)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Cache>> {
        self.cache
            .lock()
            .map_err(|e| AutoExportError::Config(format!("configuration lock poisoned: {}", e)))
    }
}
