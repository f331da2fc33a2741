use serde::{Deserialize, Serialize};

/// Whether an item is managed as configuration, bootstrapped once as
/// content, or left alone at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationItemCategory {
    Config,
    Content,
    Runtime,
}

impl ConfigurationItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigurationItemCategory::Config => "config",
            ConfigurationItemCategory::Content => "content",
            ConfigurationItemCategory::Runtime => "runtime",
        }
    }
}

impl std::fmt::Display for ConfigurationItemCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConfigurationItemCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config" => Ok(ConfigurationItemCategory::Config),
            "content" => Ok(ConfigurationItemCategory::Content),
            "runtime" | "system" => Ok(ConfigurationItemCategory::Runtime),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}
