//! Auto-export settings: module mappings, exclusions and timing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::{AutoExportError, Result};
use crate::path::PathPatterns;
use crate::repository::RepositorySession;

pub const MODULES_PROPERTY: &str = "autoexport:modules";
pub const EXCLUDED_PROPERTY: &str = "autoexport:excluded";

/// Repository path patterns routed to one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Module directory relative to the project root.
    pub mvn_path: String,
    pub patterns: Vec<String>,
}

/// `{mvnPath: [patterns]}` in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMappings(pub Vec<ModuleConfig>);

impl ModuleMappings {
    pub fn iter(&self) -> impl Iterator<Item = &ModuleConfig> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds a pattern to a module, creating the entry if needed.
    pub fn push(&mut self, mvn_path: &str, pattern: &str) {
        match self.0.iter_mut().find(|m| m.mvn_path == mvn_path) {
            Some(entry) => entry.patterns.push(pattern.to_string()),
            None => self.0.push(ModuleConfig {
                mvn_path: mvn_path.to_string(),
                patterns: vec![pattern.to_string()],
            }),
        }
    }
}

impl Default for ModuleMappings {
    fn default() -> Self {
        Self(vec![ModuleConfig {
            mvn_path: "repository-data/application".to_string(),
            patterns: vec!["/".to_string()],
        }])
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Serialize for ModuleMappings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for module in &self.0 {
            map.serialize_entry(&module.mvn_path, &module.patterns)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ModuleMappings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MappingsVisitor;

        impl<'de> Visitor<'de> for MappingsVisitor {
            type Value = ModuleMappings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of module paths to repository path patterns")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut modules = Vec::new();
                while let Some((mvn_path, patterns)) = access.next_entry::<String, OneOrMany>()? {
                    let patterns = match patterns {
                        OneOrMany::One(p) => vec![p],
                        OneOrMany::Many(ps) => ps,
                    };
                    modules.push(ModuleConfig { mvn_path, patterns });
                }
                Ok(ModuleMappings(modules))
            }
        }

        deserializer.deserialize_map(MappingsVisitor)
    }
}

/// Settings of the auto-export engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoExportConfig {
    /// Directory the module `mvnPath`s are relative to.
    #[serde(default)]
    pub project_root: Option<PathBuf>,

    #[serde(default)]
    pub modules: ModuleMappings,

    /// Repository paths never exported.
    #[serde(default)]
    pub exclusions: Vec<String>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long a change log must stay quiet before it is exported.
    #[serde(default = "default_min_change_log_age")]
    pub min_change_log_age_ms: u64,

    /// A change log older than this is exported even if events keep coming.
    #[serde(default = "default_max_change_log_age")]
    pub max_change_log_age_ms: u64,

    /// Maximum number of journal events read per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_poll_interval() -> u64 {
    250
}

fn default_min_change_log_age() -> u64 {
    250
}

fn default_max_change_log_age() -> u64 {
    10_000
}

fn default_batch_size() -> usize {
    1000
}

impl Default for AutoExportConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            modules: ModuleMappings::default(),
            exclusions: Vec::new(),
            poll_interval_ms: default_poll_interval(),
            min_change_log_age_ms: default_min_change_log_age(),
            max_change_log_age_ms: default_max_change_log_age(),
            batch_size: default_batch_size(),
        }
    }
}

impl AutoExportConfig {
    /// Loads settings from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AutoExportError::ReadConfig {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        if let Some(root) = &config.project_root {
            if root.is_relative() {
                if let Some(dir) = path.parent() {
                    config.project_root = Some(dir.join(root));
                }
            }
        }
        Ok(config)
    }

    /// Parses settings from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| AutoExportError::Config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads settings stored on the auto-export configuration node.
    ///
    /// `autoexport:modules` holds `mvnPath:pattern` strings and
    /// `autoexport:excluded` holds exclusion patterns. Timing keeps its
    /// defaults.
    pub fn from_session(session: &dyn RepositorySession, config_path: &str) -> Result<Self> {
        let mut config = Self {
            modules: ModuleMappings(Vec::new()),
            ..Self::default()
        };

        let modules_path = format!("{}/{}", config_path, MODULES_PROPERTY);
        if let Some(value) = session.property(&modules_path)? {
            for entry in value.as_strings() {
                let Some((mvn_path, pattern)) = entry.split_once(':') else {
                    return Err(AutoExportError::Config(format!(
                        "module mapping '{}' is not of the form 'mvnPath:pattern'",
                        entry
                    )));
                };
                config.modules.push(mvn_path.trim(), pattern.trim());
            }
        }
        if config.modules.is_empty() {
            config.modules = ModuleMappings::default();
        }

        let excluded_path = format!("{}/{}", config_path, EXCLUDED_PROPERTY);
        if let Some(value) = session.property(&excluded_path)? {
            config.exclusions = value.as_strings();
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that every pattern compiles and the timings are usable.
    pub fn validate(&self) -> Result<()> {
        for module in self.modules.iter() {
            if module.mvn_path.trim().is_empty() {
                return Err(AutoExportError::Config("module path must not be empty".to_string()));
            }
            PathPatterns::with_descendants(module.patterns.iter().map(String::as_str))?;
        }
        self.exclusion_patterns()?;
        if self.poll_interval_ms == 0 {
            return Err(AutoExportError::Config("pollIntervalMs must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(AutoExportError::Config("batchSize must be positive".to_string()));
        }
        if self.max_change_log_age_ms < self.min_change_log_age_ms {
            return Err(AutoExportError::Config(
                "maxChangeLogAgeMs must not be smaller than minChangeLogAgeMs".to_string(),
            ));
        }
        Ok(())
    }

    /// The exclusion patterns, each covering the path and everything below.
    pub fn exclusion_patterns(&self) -> Result<PathPatterns> {
        Ok(PathPatterns::with_descendants(
            self.exclusions.iter().map(String::as_str),
        )?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_change_log_age(&self) -> Duration {
        Duration::from_millis(self.min_change_log_age_ms)
    }

    pub fn max_change_log_age(&self) -> Duration {
        Duration::from_millis(self.max_change_log_age_ms)
    }
}
