//! Source files of a module.

use super::definition::{Definition, DefinitionId, DefinitionNode, DefinitionType, NamespaceDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceType {
    Config,
    Content,
}

impl SourceType {
    /// Directory below the module root holding sources of this type.
    pub fn root_dir(&self) -> &'static str {
        match self {
            SourceType::Config => "hcm-config",
            SourceType::Content => "hcm-content",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Config => write!(f, "config"),
            SourceType::Content => write!(f, "content"),
        }
    }
}

/// One YAML file of a module.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    /// Path relative to the config or content root, `/` separated.
    path: String,
    source_type: SourceType,
    definitions: Vec<Definition>,
    changed: bool,
}

impl Source {
    /// A source as read from disk.
    pub fn new(path: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            path: path.into(),
            source_type,
            definitions: Vec::new(),
            changed: false,
        }
    }

    /// A source that does not exist on disk yet.
    pub fn new_changed(path: impl Into<String>, source_type: SourceType) -> Self {
        let mut source = Self::new(path, source_type);
        source.changed = true;
        source
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    /// Marks the source for writing by the auto-export writer.
    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Clears the changed flag once the source is written.
    pub(crate) fn mark_saved(&mut self) {
        self.changed = false;
    }

    /// Mutable access that leaves the changed flag alone; used by writers
    /// to record where resources ended up.
    pub(crate) fn definitions_mut(&mut self) -> &mut [Definition] {
        &mut self.definitions
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Appends a definition without marking the source changed; used by readers.
    pub(crate) fn push_loaded(&mut self, definition: Definition) {
        self.definitions.push(definition);
    }

    pub fn add_definition(&mut self, definition: Definition) -> DefinitionId {
        let id = definition.id();
        self.definitions.push(definition);
        self.changed = true;
        id
    }

    pub fn add_config_definition(&mut self, root: DefinitionNode) -> DefinitionId {
        self.add_definition(Definition::config(root))
    }

    pub fn add_content_definition(&mut self, root: DefinitionNode) -> DefinitionId {
        self.add_definition(Definition::content(root))
    }

    pub fn add_namespace_definition(&mut self, namespace: NamespaceDefinition) -> DefinitionId {
        self.add_definition(Definition::namespace(namespace))
    }

    pub fn definition(&self, id: DefinitionId) -> Option<&Definition> {
        self.definitions.iter().find(|d| d.id() == id)
    }

    /// Mutable access; marks the source changed.
    pub fn definition_mut(&mut self, id: DefinitionId) -> Option<&mut Definition> {
        let definition = self.definitions.iter_mut().find(|d| d.id() == id)?;
        self.changed = true;
        Some(definition)
    }

    /// Removes a definition and marks the source changed.
    pub fn remove_definition(&mut self, id: DefinitionId) -> Option<Definition> {
        let index = self.definitions.iter().position(|d| d.id() == id)?;
        self.changed = true;
        Some(self.definitions.remove(index))
    }

    pub fn has_definitions_of(&self, definition_type: DefinitionType) -> bool {
        self.definitions
            .iter()
            .any(|d| d.definition_type() == definition_type)
    }
}
