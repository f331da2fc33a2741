//! Folds module definitions into a [`ConfigurationModel`].

use std::sync::Arc;

use tracing::debug;

use super::category::ConfigurationItemCategory;
use super::configuration::{
    ConfigurationModel, ConfigurationNode, ConfigurationProperty, ContentItem, DefinitionItemRef,
    NamespaceItem, NodeId,
};
use super::definition::{
    DefinitionBody, DefinitionId, DefinitionNode, DefinitionProperty, PropertyKind,
    PropertyOperation, JCR_PRIMARY_TYPE,
};
use super::module::Module;
use super::ordering::sort_modules;
use super::source::Source;
use super::value::{Value, ValueType};
use crate::error::ModelError;
use crate::path::{NodeName, NodePath};

pub(crate) struct ModelBuilder {
    nodes: Vec<ConfigurationNode>,
    namespaces: Vec<NamespaceItem>,
    content: Vec<ContentItem>,
}

impl ModelBuilder {
    pub(crate) fn new() -> Self {
        let mut root = ConfigurationNode::new(NodePath::root(), None);
        root.properties.push(ConfigurationProperty {
            name: JCR_PRIMARY_TYPE.to_string(),
            kind: PropertyKind::Single,
            value_type: ValueType::Name,
            values: vec![Value::text(ValueType::Name, "rep:root")],
            definitions: Vec::new(),
        });
        Self {
            nodes: vec![root],
            namespaces: Vec::new(),
            content: Vec::new(),
        }
    }

    pub(crate) fn build(mut self, modules: Vec<Arc<Module>>) -> Result<ConfigurationModel, ModelError> {
        let modules = sort_modules(&modules)?;

        for module in &modules {
            self.add_namespaces(module)?;
        }
        for module in &modules {
            self.add_config(module)?;
        }
        for module in &modules {
            self.add_content(module);
        }

        debug!(
            modules = modules.len(),
            nodes = self.nodes.len(),
            "Built configuration model"
        );

        Ok(ConfigurationModel {
            modules,
            nodes: self.nodes,
            namespaces: self.namespaces,
            content: self.content,
        })
    }

    fn item_ref(module: &Module, source: &Source, id: DefinitionId, path: &NodePath) -> DefinitionItemRef {
        DefinitionItemRef {
            module: module.key().clone(),
            source_type: source.source_type(),
            source: source.path().to_string(),
            definition: id,
            path: path.clone(),
        }
    }

    fn add_namespaces(&mut self, module: &Module) -> Result<(), ModelError> {
        for (source, definition) in module.definitions() {
            if let DefinitionBody::Namespace(namespace) = definition.body() {
                let item = Self::item_ref(module, source, definition.id(), &NodePath::root());
                if let Some(existing) = self
                    .namespaces
                    .iter()
                    .find(|n| n.namespace.prefix == namespace.prefix)
                {
                    return Err(ModelError::DuplicateNamespace {
                        prefix: namespace.prefix.clone(),
                        origin: item.origin(),
                        existing: existing.definition.origin(),
                    });
                }
                self.namespaces.push(NamespaceItem {
                    namespace: namespace.clone(),
                    definition: item,
                });
            }
        }
        Ok(())
    }

    fn add_config(&mut self, module: &Module) -> Result<(), ModelError> {
        let mut roots: Vec<(&Source, DefinitionId, &DefinitionNode)> = module
            .definitions()
            .filter_map(|(source, definition)| match definition.body() {
                DefinitionBody::Config(node) => Some((source, definition.id(), node)),
                _ => None,
            })
            .collect();
        // Stable: definitions with equal roots keep their file order.
        roots.sort_by(|a, b| a.2.path().cmp(b.2.path()));

        for (source, id, node) in roots {
            self.apply_root(module, source, id, node)?;
        }
        Ok(())
    }

    fn add_content(&mut self, module: &Module) {
        for (source, definition) in module.definitions() {
            if let DefinitionBody::Content(node) = definition.body() {
                self.content.push(ContentItem {
                    path: node.path().clone(),
                    definition: Self::item_ref(module, source, definition.id(), node.path()),
                });
            }
        }
    }

    fn child_id(&self, parent: NodeId, name: &NodeName) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].name() == Some(name))
    }

    fn resolve_id(&self, path: &NodePath) -> Option<NodeId> {
        let mut current = NodeId(0);
        for segment in path.segments() {
            current = self.child_id(current, segment)?;
        }
        Some(current)
    }

    fn apply_root(
        &mut self,
        module: &Module,
        source: &Source,
        id: DefinitionId,
        node: &DefinitionNode,
    ) -> Result<(), ModelError> {
        let item = Self::item_ref(module, source, id, node.path());
        if node.is_root() {
            return self.apply_to_node(NodeId(0), module, source, id, node, &item);
        }

        let parent_path = node.path().parent().unwrap_or_else(NodePath::root);
        match self.resolve_id(&parent_path) {
            Some(parent) => self.apply_child(parent, module, source, id, node),
            None if node.is_delete() => {
                log::warn!(
                    "Trying to delete node '{}' defined in {}, but its parent does not exist",
                    node.path(),
                    item.origin()
                );
                Ok(())
            }
            None => Err(ModelError::MissingParent {
                path: node.path().to_string(),
                origin: item.origin(),
            }),
        }
    }

    fn apply_child(
        &mut self,
        parent: NodeId,
        module: &Module,
        source: &Source,
        id: DefinitionId,
        node: &DefinitionNode,
    ) -> Result<(), ModelError> {
        let item = Self::item_ref(module, source, id, node.path());
        let name = node.name();
        let existing = self.child_id(parent, &name);

        if node.is_delete() {
            match existing {
                Some(child) => self.detach(parent, child),
                None => log::warn!(
                    "Trying to delete node '{}' defined in {}, but it does not exist",
                    node.path(),
                    item.origin()
                ),
            }
            return Ok(());
        }

        match node.category() {
            Some(ConfigurationItemCategory::Config) => {
                self.nodes[parent.0].child_node_categories.remove(&name);
            }
            Some(category) => {
                self.nodes[parent.0]
                    .child_node_categories
                    .insert(name.clone(), category);
                if let Some(child) = existing {
                    self.detach(parent, child);
                }
                return Ok(());
            }
            None => {}
        }

        let child = match existing {
            Some(child) => {
                if let Some(target) = node.order_before() {
                    self.order_before(parent, child, target, &item)?;
                }
                child
            }
            None => {
                if !node.creates_node() {
                    return Err(ModelError::MissingPrimaryType {
                        path: node.path().to_string(),
                        origin: item.origin(),
                    });
                }
                let child = NodeId(self.nodes.len());
                self.nodes
                    .push(ConfigurationNode::new(node.path().clone(), Some(parent)));
                self.nodes[parent.0].children.push(child);
                if let Some(target) = node.order_before() {
                    self.order_before(parent, child, target, &item)?;
                }
                child
            }
        };

        self.apply_to_node(child, module, source, id, node, &item)
    }

    fn apply_to_node(
        &mut self,
        target: NodeId,
        module: &Module,
        source: &Source,
        id: DefinitionId,
        node: &DefinitionNode,
        item: &DefinitionItemRef,
    ) -> Result<(), ModelError> {
        {
            let config_node = &mut self.nodes[target.0];
            config_node.definitions.push(item.clone());
            if let Some(category) = node.residual_child_node_category() {
                config_node.residual_child_node_category = Some(category);
            }
            if let Some(ignore) = node.ignore_reordered_children() {
                config_node.ignore_reordered_children = Some(ignore);
            }
        }

        for property in node.properties() {
            self.apply_property(target, property, item)?;
        }
        for child in node.nodes() {
            self.apply_child(target, module, source, id, child)?;
        }
        Ok(())
    }

    fn apply_property(
        &mut self,
        target: NodeId,
        property: &DefinitionProperty,
        item: &DefinitionItemRef,
    ) -> Result<(), ModelError> {
        let node = &mut self.nodes[target.0];
        let property_path = format!("{}/{}", node.path, property.name());
        let property_path = property_path.replacen("//", "/", 1);

        match property.category() {
            Some(ConfigurationItemCategory::Config) => {
                node.child_property_categories.remove(property.name());
                if property.values().is_empty()
                    && property.operation() != PropertyOperation::Delete
                {
                    return Ok(());
                }
            }
            Some(category) => {
                node.child_property_categories
                    .insert(property.name().to_string(), category);
                node.properties.retain(|p| p.name != property.name());
                return Ok(());
            }
            None => {}
        }

        let existing = node.properties.iter().position(|p| p.name == property.name());

        if property.operation() == PropertyOperation::Delete {
            match existing {
                Some(index) => {
                    node.properties.remove(index);
                }
                None => log::warn!(
                    "Trying to delete property '{}' defined in {}, but it does not exist",
                    property_path,
                    item.origin()
                ),
            }
            return Ok(());
        }

        let Some(index) = existing else {
            if property.operation() == PropertyOperation::Add && !property.is_multiple() {
                return Err(ModelError::InvalidAdd {
                    path: property_path,
                    origin: item.origin(),
                });
            }
            node.properties.push(ConfigurationProperty {
                name: property.name().to_string(),
                kind: property.kind(),
                value_type: property.value_type(),
                values: property.values().to_vec(),
                definitions: vec![item.clone()],
            });
            return Ok(());
        };

        let current = &mut node.properties[index];
        match property.operation() {
            PropertyOperation::Override => {
                current.kind = property.kind();
                current.value_type = property.value_type();
                current.values = property.values().to_vec();
            }
            PropertyOperation::Add => {
                if !current.kind.is_multiple() || !property.is_multiple() {
                    return Err(ModelError::InvalidAdd {
                        path: property_path,
                        origin: item.origin(),
                    });
                }
                if current.value_type != property.value_type() {
                    return Err(ModelError::PropertyTypeChange {
                        path: property_path,
                        origin: item.origin(),
                    });
                }
                current.values.extend(property.values().iter().cloned());
            }
            PropertyOperation::Replace | PropertyOperation::Delete => {
                if property.name() == JCR_PRIMARY_TYPE {
                    if current.values != property.values() {
                        return Err(ModelError::PrimaryTypeChange {
                            path: node_path_of(&property_path),
                            origin: item.origin(),
                        });
                    }
                } else if current.kind.is_multiple() != property.is_multiple()
                    || current.value_type != property.value_type()
                {
                    return Err(ModelError::PropertyTypeChange {
                        path: property_path,
                        origin: item.origin(),
                    });
                }
                current.kind = property.kind();
                current.values = property.values().to_vec();
            }
        }
        current.definitions.push(item.clone());
        Ok(())
    }

    fn order_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        target: &str,
        item: &DefinitionItemRef,
    ) -> Result<(), ModelError> {
        let target_name = NodeName::parse(target)?;
        if self.nodes[child.0].name() == Some(&target_name) {
            return Ok(());
        }
        let Some(target_id) = self.child_id(parent, &target_name) else {
            return Err(ModelError::OrderBeforeTargetMissing {
                path: item.path.to_string(),
                target: target.to_string(),
                origin: item.origin(),
            });
        };
        let children = &mut self.nodes[parent.0].children;
        children.retain(|c| *c != child);
        let index = children
            .iter()
            .position(|c| *c == target_id)
            .unwrap_or(children.len());
        children.insert(index, child);
        Ok(())
    }

    /// Unlinks a node from its parent. Its arena slot stays but is unreachable.
    fn detach(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.retain(|c| *c != child);
        self.nodes[child.0].parent = None;
    }
}

fn node_path_of(property_path: &str) -> String {
    match property_path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(index) => property_path[..index].to_string(),
        None => property_path.to_string(),
    }
}
