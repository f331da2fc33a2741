//! The merged view over all modules.
//!
//! A [`ConfigurationModel`] is built once from a list of modules and never
//! mutated afterwards. Nodes live in an arena and refer to each other by
//! [`NodeId`]; every node and property records which definitions
//! contributed to it, by module key, source path and definition id.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::builder::ModelBuilder;
use super::category::ConfigurationItemCategory;
use super::definition::{DefinitionId, NamespaceDefinition, PropertyKind};
use super::module::{Module, ModuleKey};
use super::source::SourceType;
use super::value::{Value, ValueType};
use crate::error::ModelError;
use crate::path::{NodeName, NodePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Points at the definition node that contributed to a configuration item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefinitionItemRef {
    pub module: ModuleKey,
    pub source_type: SourceType,
    /// Source path relative to the config or content root.
    pub source: String,
    pub definition: DefinitionId,
    /// Absolute path of the contributing definition node.
    pub path: NodePath,
}

impl DefinitionItemRef {
    pub fn origin(&self) -> String {
        format!("'{}' in module {}", self.source, self.module)
    }
}

impl fmt::Display for DefinitionItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] at {}", self.origin(), self.definition, self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationProperty {
    pub(crate) name: String,
    pub(crate) kind: PropertyKind,
    pub(crate) value_type: ValueType,
    pub(crate) values: Vec<Value>,
    pub(crate) definitions: Vec<DefinitionItemRef>,
}

impl ConfigurationProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Contributing definitions, in the order they were applied.
    pub fn definitions(&self) -> &[DefinitionItemRef] {
        &self.definitions
    }
}

#[derive(Debug, Clone)]
pub struct ConfigurationNode {
    pub(crate) path: NodePath,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) properties: Vec<ConfigurationProperty>,
    pub(crate) definitions: Vec<DefinitionItemRef>,
    pub(crate) residual_child_node_category: Option<ConfigurationItemCategory>,
    pub(crate) child_node_categories: HashMap<NodeName, ConfigurationItemCategory>,
    pub(crate) child_property_categories: HashMap<String, ConfigurationItemCategory>,
    pub(crate) ignore_reordered_children: Option<bool>,
}

impl ConfigurationNode {
    pub(crate) fn new(path: NodePath, parent: Option<NodeId>) -> Self {
        Self {
            path,
            parent,
            children: Vec::new(),
            properties: Vec::new(),
            definitions: Vec::new(),
            residual_child_node_category: None,
            child_node_categories: HashMap::new(),
            child_property_categories: HashMap::new(),
            ignore_reordered_children: None,
        }
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn name(&self) -> Option<&NodeName> {
        self.path.last_segment()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn child_ids(&self) -> &[NodeId] {
        &self.children
    }

    pub fn properties(&self) -> &[ConfigurationProperty] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&ConfigurationProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Contributing definitions, in the order they were applied.
    pub fn definitions(&self) -> &[DefinitionItemRef] {
        &self.definitions
    }

    pub fn residual_child_node_category(&self) -> Option<ConfigurationItemCategory> {
        self.residual_child_node_category
    }

    pub fn ignore_reordered_children(&self) -> Option<bool> {
        self.ignore_reordered_children
    }

    pub fn child_node_category(&self, name: &NodeName) -> Option<ConfigurationItemCategory> {
        self.child_node_categories.get(name).copied()
    }

    pub fn child_property_category(&self, name: &str) -> Option<ConfigurationItemCategory> {
        self.child_property_categories.get(name).copied()
    }
}

/// A namespace together with the definition that registered it.
#[derive(Debug, Clone)]
pub struct NamespaceItem {
    pub namespace: NamespaceDefinition,
    pub definition: DefinitionItemRef,
}

/// A content definition, which is not folded into the node tree.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub path: NodePath,
    pub definition: DefinitionItemRef,
}

#[derive(Debug, Clone)]
pub struct ConfigurationModel {
    pub(crate) modules: Vec<Arc<Module>>,
    pub(crate) nodes: Vec<ConfigurationNode>,
    pub(crate) namespaces: Vec<NamespaceItem>,
    pub(crate) content: Vec<ContentItem>,
}

impl ConfigurationModel {
    /// Orders `modules` and folds their definitions into one tree.
    pub fn build(modules: Vec<Arc<Module>>) -> Result<Self, ModelError> {
        ModelBuilder::new().build(modules)
    }

    /// Builds a model from owned modules.
    pub fn from_modules(modules: Vec<Module>) -> Result<Self, ModelError> {
        Self::build(modules.into_iter().map(Arc::new).collect())
    }

    /// Rebuilds this model with some modules substituted by key. Modules
    /// with an unknown key are added.
    pub fn rebuild<'a, I>(&self, replacements: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = &'a Module>,
    {
        let mut modules = self.modules.clone();
        for replacement in replacements {
            match modules.iter().position(|m| m.key() == replacement.key()) {
                Some(index) => modules[index] = Arc::new(replacement.clone()),
                None => modules.push(Arc::new(replacement.clone())),
            }
        }
        Self::build(modules)
    }

    /// Modules in application order.
    pub fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    /// The module with `key`, if it is part of this model.
    pub fn module(&self, key: &ModuleKey) -> Option<&Arc<Module>> {
        self.modules.iter().find(|m| m.key() == key)
    }

    /// Group names in application order.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for module in &self.modules {
            if !groups.contains(&module.key().group.as_str()) {
                groups.push(&module.key().group);
            }
        }
        groups
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> &ConfigurationNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &ConfigurationNode {
        &self.nodes[id.0]
    }

    /// Children of `id` in their resolved order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &ConfigurationNode> {
        self.nodes[id.0].children.iter().map(move |c| &self.nodes[c.0])
    }

    pub fn child_id(&self, parent: NodeId, name: &NodeName) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].name() == Some(name))
    }

    pub fn resolve_id(&self, path: &NodePath) -> Option<NodeId> {
        let mut current = self.root_id();
        for segment in path.segments() {
            current = self.child_id(current, segment)?;
        }
        Some(current)
    }

    /// The configuration node at an absolute path.
    pub fn resolve_node(&self, path: &NodePath) -> Option<&ConfigurationNode> {
        self.resolve_id(path).map(|id| self.node(id))
    }

    pub fn resolve_property(&self, node_path: &NodePath, name: &str) -> Option<&ConfigurationProperty> {
        self.resolve_node(node_path)?.property(name)
    }

    /// Ids of `id` and all nodes below it, parents first.
    pub fn descendant_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = vec![id];
        let mut index = 0;
        while index < result.len() {
            let current = result[index];
            result.extend(self.nodes[current.0].children.iter().copied());
            index += 1;
        }
        result
    }

    pub fn namespaces(&self) -> &[NamespaceItem] {
        &self.namespaces
    }

    pub fn namespace(&self, prefix: &str) -> Option<&NamespaceItem> {
        self.namespaces.iter().find(|n| n.namespace.prefix == prefix)
    }

    pub fn content_definitions(&self) -> &[ContentItem] {
        &self.content
    }

    /// The category of the node or property at `path`.
    ///
    /// Walks down from the root; the first explicit non-config category on
    /// the way wins. Below a node that is not part of the model the
    /// residual child node category of the deepest known ancestor applies.
    pub fn category_for_item(&self, path: &NodePath, is_property: bool) -> ConfigurationItemCategory {
        let mut current = self.root_id();
        let count = path.segment_count();
        for (i, segment) in path.segments().iter().enumerate() {
            let node = self.node(current);
            let last = i + 1 == count;
            if last && is_property {
                return node
                    .child_property_category(segment.name())
                    .unwrap_or(ConfigurationItemCategory::Config);
            }
            if let Some(category) = node.child_node_category(segment) {
                if category != ConfigurationItemCategory::Config {
                    return category;
                }
            }
            match self.child_id(current, segment) {
                Some(child) => current = child,
                None => {
                    return node
                        .residual_child_node_category
                        .unwrap_or(ConfigurationItemCategory::Config)
                }
            }
        }
        ConfigurationItemCategory::Config
    }
}
