//! Groups, projects and modules.

use std::fmt;
use std::path::PathBuf;

use super::definition::{Definition, DefinitionId, DefinitionNode};
use super::source::{Source, SourceType};
use super::value::Value;
use crate::path::NodePath;

/// Identifies a module by its place in the group/project/module hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub group: String,
    pub project: String,
    pub module: String,
}

impl ModuleKey {
    /// Creates a key from group, project and module names.
    pub fn new(group: impl Into<String>, project: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            project: project.into(),
            module: module.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.project, self.module)
    }
}

/// Where a module was read from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleLocation {
    /// Directory holding `hcm-module.yaml`.
    Directory(PathBuf),
    /// Directory inside a zip or jar archive, `/` separated, may be empty.
    Archive { archive: PathBuf, prefix: String },
    /// Built in memory.
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Reload,
    Append,
    Delete,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Reload => "reload",
            ActionType::Append => "append",
            ActionType::Delete => "delete",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reload" => Ok(ActionType::Reload),
            "append" => Ok(ActionType::Append),
            "delete" => Ok(ActionType::Delete),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionItem {
    pub path: NodePath,
    pub action: ActionType,
}

/// Content actions to run when a module reaches a given version.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionList {
    pub version: String,
    pub items: Vec<ActionItem>,
}

/// A resource file that must be deleted when the module is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemovedResource {
    pub source_type: SourceType,
    /// Path relative to the config or content root.
    pub path: String,
}

/// Resolves a resource path as written in a source to a path relative to
/// the config or content root.
pub fn resource_root_path(source_path: &str, resource_path: &str) -> String {
    if let Some(stripped) = resource_path.strip_prefix('/') {
        return stripped.to_string();
    }
    let mut segments: Vec<&str> = source_path.split('/').collect();
    segments.pop();
    for part in resource_path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// The smallest unit of deployment: a set of sources plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    key: ModuleKey,
    after: Vec<String>,
    project_after: Vec<String>,
    group_after: Vec<String>,
    mvn_path: Option<String>,
    location: ModuleLocation,
    sources: Vec<Source>,
    action_lists: Vec<ActionList>,
    removed_sources: Vec<(SourceType, String)>,
    removed_resources: Vec<RemovedResource>,
}

impl Module {
    /// Creates an empty module identified by `key`.
    pub fn new(key: ModuleKey) -> Self {
        Self {
            key,
            after: Vec::new(),
            project_after: Vec::new(),
            group_after: Vec::new(),
            mvn_path: None,
            location: ModuleLocation::Detached,
            sources: Vec::new(),
            action_lists: Vec::new(),
            removed_sources: Vec::new(),
            removed_resources: Vec::new(),
        }
    }

    pub fn key(&self) -> &ModuleKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.module
    }

    pub fn after(&self) -> &[String] {
        &self.after
    }

    pub fn project_after(&self) -> &[String] {
        &self.project_after
    }

    pub fn group_after(&self) -> &[String] {
        &self.group_after
    }

    pub fn set_after(&mut self, group_after: Vec<String>, project_after: Vec<String>, after: Vec<String>) {
        self.group_after = group_after;
        self.project_after = project_after;
        self.after = after;
    }

    /// Module directory relative to the project root, without `src/main/resources`.
    pub fn mvn_path(&self) -> Option<&str> {
        self.mvn_path.as_deref()
    }

    pub fn set_mvn_path(&mut self, mvn_path: Option<String>) {
        self.mvn_path = mvn_path;
    }

    pub fn location(&self) -> &ModuleLocation {
        &self.location
    }

    pub fn set_location(&mut self, location: ModuleLocation) {
        self.location = location;
    }

    pub fn action_lists(&self) -> &[ActionList] {
        &self.action_lists
    }

    pub fn set_action_lists(&mut self, action_lists: Vec<ActionList>) {
        self.action_lists = action_lists;
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut [Source] {
        &mut self.sources
    }

    pub fn config_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources
            .iter()
            .filter(|s| s.source_type() == SourceType::Config)
    }

    pub fn content_sources(&self) -> impl Iterator<Item = &Source> {
        self.sources
            .iter()
            .filter(|s| s.source_type() == SourceType::Content)
    }

    pub fn source(&self, source_type: SourceType, path: &str) -> Option<&Source> {
        self.sources
            .iter()
            .find(|s| s.source_type() == source_type && s.path() == path)
    }

    pub fn source_mut(&mut self, source_type: SourceType, path: &str) -> Option<&mut Source> {
        self.sources
            .iter_mut()
            .find(|s| s.source_type() == source_type && s.path() == path)
    }

    /// Adds a source. A removal recorded for the same path is dropped.
    pub fn add_source(&mut self, source: Source) -> &mut Source {
        self.removed_sources
            .retain(|(t, p)| !(*t == source.source_type() && p == source.path()));
        self.sources.push(source);
        let last = self.sources.len() - 1;
        &mut self.sources[last]
    }

    /// The source at `path`, created as a new changed source when absent.
    pub fn get_or_create_source(&mut self, source_type: SourceType, path: &str) -> &mut Source {
        match self
            .sources
            .iter()
            .position(|s| s.source_type() == source_type && s.path() == path)
        {
            Some(index) => &mut self.sources[index],
            None => self.add_source(Source::new_changed(path, source_type)),
        }
    }

    /// Sources deleted since the module was read.
    pub fn removed_sources(&self) -> &[(SourceType, String)] {
        &self.removed_sources
    }

    pub fn removed_resources(&self) -> &[RemovedResource] {
        &self.removed_resources
    }

    /// Index of the source holding `id`, and the definition itself.
    pub fn find_definition(&self, id: DefinitionId) -> Option<(usize, &Definition)> {
        self.sources
            .iter()
            .enumerate()
            .find_map(|(i, s)| s.definition(id).map(|d| (i, d)))
    }

    /// Mutable access to a definition; marks its source changed.
    pub fn definition_mut(&mut self, id: DefinitionId) -> Option<&mut Definition> {
        let (index, _) = self.find_definition(id)?;
        self.sources[index].definition_mut(id)
    }

    /// The source holding `id`.
    pub fn source_of(&self, id: DefinitionId) -> Option<&Source> {
        self.find_definition(id).map(|(i, _)| &self.sources[i])
    }

    /// Removes a definition. A source left without definitions is removed
    /// from the module and scheduled for deletion; resources referenced by
    /// the definition are scheduled for deletion too.
    pub fn remove_definition(&mut self, id: DefinitionId) -> Option<Definition> {
        let (index, _) = self.find_definition(id)?;
        let definition = self.sources[index].remove_definition(id)?;
        let source_type = self.sources[index].source_type();
        let source_path = self.sources[index].path().to_string();

        let mut values = Vec::new();
        definition.visit_values(&mut |v| values.push(v.clone()));
        self.note_removed_values(source_type, &source_path, &values);

        if self.sources[index].is_empty() {
            let source = self.sources.remove(index);
            log::debug!("Removing empty source '{}' from module {}", source.path(), self.key);
            self.removed_sources
                .push((source.source_type(), source.path().to_string()));
        }
        Some(definition)
    }

    /// Records the resources of a subtree removed from one of the sources.
    pub fn note_removed_node(&mut self, source_type: SourceType, source_path: &str, node: &DefinitionNode) {
        let mut values = Vec::new();
        node.visit_values(&mut |v| values.push(v.clone()));
        self.note_removed_values(source_type, source_path, &values);
    }

    pub fn note_removed_values(&mut self, source_type: SourceType, source_path: &str, values: &[Value]) {
        for value in values {
            if let Some(resource) = value.resource_ref() {
                if resource.is_new {
                    continue;
                }
                let removed = RemovedResource {
                    source_type,
                    path: resource_root_path(source_path, &resource.path),
                };
                if !self.removed_resources.contains(&removed) {
                    self.removed_resources.push(removed);
                }
            }
        }
    }

    /// True when some remaining value still points at the resource.
    pub fn references_resource(&self, removed: &RemovedResource) -> bool {
        let mut found = false;
        for source in self
            .sources
            .iter()
            .filter(|s| s.source_type() == removed.source_type)
        {
            for definition in source.definitions() {
                definition.visit_values(&mut |v| {
                    if let Some(r) = v.resource_ref() {
                        if resource_root_path(source.path(), &r.path) == removed.path {
                            found = true;
                        }
                    }
                });
            }
        }
        found
    }

    /// Forgets pending removals once they are written.
    pub fn clear_removals(&mut self) {
        self.removed_sources.clear();
        self.removed_resources.clear();
    }

    /// All definitions, in source order.
    pub fn definitions(&self) -> impl Iterator<Item = (&Source, &Definition)> {
        self.sources
            .iter()
            .flat_map(|s| s.definitions().iter().map(move |d| (s, d)))
    }

    /// True when any source changed or anything is scheduled for deletion.
    pub fn has_changes(&self) -> bool {
        self.sources.iter().any(|s| s.has_changed())
            || !self.removed_sources.is_empty()
            || !self.removed_resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definition::{DefinitionProperty, JCR_PRIMARY_TYPE};
    use crate::model::value::{ResourceOrigin, ResourceRef, ValueType};

    fn module() -> Module {
        Module::new(ModuleKey::new("g", "p", "m"))
    }

    #[test]
    fn test_resource_root_path() {
        assert_eq!(resource_root_path("a/b.yaml", "c.txt"), "a/c.txt");
        assert_eq!(resource_root_path("a/b.yaml", "/c.txt"), "c.txt");
        assert_eq!(resource_root_path("b.yaml", "x/c.txt"), "x/c.txt");
        assert_eq!(resource_root_path("a/b/c.yaml", "../d.txt"), "a/d.txt");
    }

    #[test]
    fn test_remove_last_definition_removes_source() {
        let mut m = module();
        let source = m.add_source(Source::new("main.yaml", SourceType::Config));
        let mut node = DefinitionNode::new(NodePath::parse("/a").unwrap());
        node.add_property(DefinitionProperty::single(
            JCR_PRIMARY_TYPE,
            Value::text(ValueType::Name, "nt:unstructured"),
        ));
        node.add_property(DefinitionProperty::single(
            "data",
            Value::resource(
                ValueType::Binary,
                ResourceRef::existing("data.bin", ResourceOrigin::File(PathBuf::from("/x/data.bin"))),
            ),
        ));
        let id = source.add_config_definition(node);

        assert!(m.remove_definition(id).is_some());
        assert!(m.sources().is_empty());
        assert_eq!(
            m.removed_sources(),
            &[(SourceType::Config, "main.yaml".to_string())]
        );
        assert_eq!(m.removed_resources()[0].path, "data.bin");
        assert!(m.has_changes());
    }

    #[test]
    fn test_get_or_create_source_reuses_existing() {
        let mut m = module();
        m.get_or_create_source(SourceType::Config, "a.yaml");
        m.get_or_create_source(SourceType::Config, "a.yaml");
        m.get_or_create_source(SourceType::Content, "a.yaml");
        assert_eq!(m.sources().len(), 2);
        assert!(m.sources()[0].has_changed());
    }

    #[test]
    fn test_module_key_display() {
        assert_eq!(ModuleKey::new("g", "p", "m").to_string(), "g/p/m");
    }
}
