//! Routing of repository paths to the module new definitions go to.

use super::settings::AutoExportConfig;
use crate::error::PathError;
use crate::path::{NodePath, PathPatterns};

/// The repository paths owned by one module.
#[derive(Debug, Clone)]
pub struct ModuleMapping {
    mvn_path: String,
    patterns: PathPatterns,
}

impl ModuleMapping {
    /// Each pattern matches the path itself and everything below it.
    pub fn new<'a, I>(mvn_path: impl Into<String>, patterns: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Ok(Self {
            mvn_path: mvn_path.into(),
            patterns: PathPatterns::with_descendants(patterns)?,
        })
    }

    /// Module path relative to the project root.
    pub fn mvn_path(&self) -> &str {
        &self.mvn_path
    }

    /// True when one of the patterns covers `path`.
    pub fn matches(&self, path: &NodePath) -> bool {
        self.patterns.matches(path)
    }

    /// True for the catch-all mapping of `/`.
    pub fn is_default(&self) -> bool {
        self.patterns.contains_root()
    }
}

/// Ordered mappings; the first specific match wins and the module mapped
/// to `/` catches the rest.
#[derive(Debug, Clone, Default)]
pub struct ModuleMappingTable {
    mappings: Vec<ModuleMapping>,
}

impl ModuleMappingTable {
    /// Creates a table that tries `mappings` in the given order.
    pub fn new(mappings: Vec<ModuleMapping>) -> Self {
        Self { mappings }
    }

    /// Builds the table from the `modules` section of the settings, keeping
    /// its order.
    pub fn from_config(config: &AutoExportConfig) -> Result<Self, PathError> {
        let mut mappings = Vec::new();
        for module in config.modules.iter() {
            mappings.push(ModuleMapping::new(
                module.mvn_path.as_str(),
                module.patterns.iter().map(String::as_str),
            )?);
        }
        Ok(Self { mappings })
    }

    pub fn mappings(&self) -> &[ModuleMapping] {
        &self.mappings
    }

    /// The first mapping that covers `/`.
    pub fn default_mapping(&self) -> Option<&ModuleMapping> {
        self.mappings.iter().find(|m| m.is_default())
    }

    /// The module path owning `path`.
    pub fn module_for_path(&self, path: &NodePath) -> Option<&str> {
        self.mappings
            .iter()
            .filter(|m| !m.is_default())
            .find(|m| m.matches(path))
            .or_else(|| self.default_mapping())
            .map(ModuleMapping::mvn_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn table() -> ModuleMappingTable {
        ModuleMappingTable::new(vec![
            ModuleMapping::new("app", ["/"]).unwrap(),
            ModuleMapping::new("site", ["/hst:hst", "/content/site"]).unwrap(),
            ModuleMapping::new("other", ["/hst:hst/hst:hosts"]).unwrap(),
        ])
    }

    #[test]
    fn test_first_specific_match_wins() {
        let table = table();
        assert_eq!(table.module_for_path(&p("/hst:hst")), Some("site"));
        assert_eq!(table.module_for_path(&p("/hst:hst/hst:hosts/dev")), Some("site"));
        assert_eq!(table.module_for_path(&p("/content/site/x")), Some("site"));
    }

    #[test]
    fn test_default_module() {
        let table = table();
        assert_eq!(table.module_for_path(&p("/content/other")), Some("app"));
        assert_eq!(table.module_for_path(&p("/")), Some("app"));
        assert_eq!(table.default_mapping().map(|m| m.mvn_path()), Some("app"));
    }

    #[test]
    fn test_no_default() {
        let table = ModuleMappingTable::new(vec![ModuleMapping::new("site", ["/hst:hst"]).unwrap()]);
        assert_eq!(table.module_for_path(&p("/content")), None);
    }

    #[test]
    fn test_prefix_is_not_descendant() {
        let table = ModuleMappingTable::new(vec![ModuleMapping::new("site", ["/content/site"]).unwrap()]);
        assert_eq!(table.module_for_path(&p("/content/sitemap")), None);
    }
}
