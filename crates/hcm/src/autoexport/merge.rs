//! Folds a module of changed definitions into the modules being exported.
//!
//! The modules to merge into are cloned first; only the clones are ever
//! mutated. After every top-level change the working model is rebuilt from
//! the clones layered over the baseline, so the definition references used
//! by the next change are accurate.

use tracing::{debug, error, info, info_span, warn};

use super::error::MergeError;
use super::location_mapper;
use super::module_mapping::ModuleMappingTable;
use super::settings::AutoExportConfig;
use crate::model::{
    ConfigurationModel, ConfigurationProperty, Definition, DefinitionBody, DefinitionId,
    DefinitionItemRef, DefinitionNode, DefinitionProperty, DefinitionType, Module, ModuleKey,
    NamespaceDefinition, PropertyOperation, Source, SourceType, Value, JCR_PRIMARY_TYPE,
};
use crate::path::{NodeName, NodePath};

type Result<T> = std::result::Result<T, MergeError>;

/// Decides where changed definitions are written.
#[derive(Debug, Clone)]
pub struct DefinitionMergeService {
    mappings: ModuleMappingTable,
}

impl DefinitionMergeService {
    /// Creates a merge service routing by the module mappings of `config`.
    pub fn new(config: &AutoExportConfig) -> Result<Self> {
        Ok(Self {
            mappings: ModuleMappingTable::from_config(config)?,
        })
    }

    /// Creates a merge service from an already built mapping table.
    pub fn with_mappings(mappings: ModuleMappingTable) -> Self {
        Self { mappings }
    }

    /// The table new definitions are routed with.
    pub fn mappings(&self) -> &ModuleMappingTable {
        &self.mappings
    }

    /// Merges `changes` into copies of `to_merge` and returns the copies.
    ///
    /// Namespaces are merged first, then config definitions in path order,
    /// then content definitions. Modules outside `to_merge` are never
    /// touched; a change that would require it fails the whole merge.
    pub fn merge_changes_to_modules<'a, I>(
        &self,
        changes: &Module,
        to_merge: I,
        baseline: &ConfigurationModel,
    ) -> Result<Vec<Module>>
    where
        I: IntoIterator<Item = &'a Module>,
    {
        let span = info_span!("merge", changes = %changes.key());
        let _enter = span.enter();

        let to_export: Vec<Module> = to_merge.into_iter().cloned().collect();
        let model = baseline.rebuild(to_export.iter())?;
        let mut run = MergeRun {
            mappings: &self.mappings,
            baseline,
            model,
            to_export,
        };

        let mut namespaces = Vec::new();
        let mut config = Vec::new();
        let mut content = Vec::new();
        for (_, definition) in changes.definitions() {
            match definition.body() {
                DefinitionBody::Namespace(ns) => namespaces.push(ns),
                DefinitionBody::Config(root) => config.push(root),
                DefinitionBody::Content(root) => content.push(root),
            }
        }
        config.sort_by(|a, b| a.path().cmp(b.path()));

        for namespace in &namespaces {
            run.merge_namespace(namespace)?;
        }
        if !namespaces.is_empty() {
            run.rebuild()?;
        }
        for root in &config {
            run.merge_config_definition(root)
                .inspect_err(|e| error!(path = %root.path(), "Merging config change failed: {}", e))?;
        }
        for root in &content {
            run.merge_content_definition(root)
                .inspect_err(|e| error!(path = %root.path(), "Merging content change failed: {}", e))?;
        }

        info!(
            "Merged {} namespace, {} config and {} content definitions",
            namespaces.len(),
            config.len(),
            content.len()
        );
        Ok(run.to_export)
    }
}

struct MergeRun<'s> {
    mappings: &'s ModuleMappingTable,
    baseline: &'s ConfigurationModel,
    model: ConfigurationModel,
    to_export: Vec<Module>,
}

fn not_found(item: &DefinitionItemRef) -> MergeError {
    MergeError::DefinitionNotFound {
        definition: item.definition.to_string(),
        module: item.module.to_string(),
        path: item.path.to_string(),
    }
}

fn node_in_definition<'d>(definition: &'d Definition, path: &NodePath) -> Option<&'d DefinitionNode> {
    let root = definition.root()?;
    let relative = root.path().relativize(path).ok()?;
    root.descendant(&relative)
}

fn node_in_definition_mut<'d>(definition: &'d mut Definition, path: &NodePath) -> Option<&'d mut DefinitionNode> {
    let root = definition.root_mut()?;
    let relative = root.path().relativize(path).ok()?;
    root.descendant_mut(&relative)
}

fn source_info(module: &Module, id: DefinitionId) -> Option<(SourceType, String)> {
    module
        .source_of(id)
        .map(|s| (s.source_type(), s.path().to_string()))
}

/// Keeps the file of an existing resource when a new value replaces it.
fn reuse_resource_path(old: &Value, new: &mut Value) {
    if let (Some(old_ref), Some(new_ref)) = (old.resource_ref(), new.resource_ref_mut()) {
        if new_ref.is_new {
            new_ref.path = old_ref.path.clone();
            new_ref.is_new = false;
        }
    }
}

fn reuse_resource_paths(old: &[Value], new: &mut [Value]) {
    for (o, n) in old.iter().zip(new.iter_mut()) {
        reuse_resource_path(o, n);
    }
}

fn reuse_resource_paths_in(old: &DefinitionNode, new: &mut DefinitionNode) {
    let names: Vec<String> = new.properties().iter().map(|p| p.name().to_string()).collect();
    for name in names {
        if let (Some(old_property), Some(new_property)) = (old.property(&name), new.property_mut(&name)) {
            reuse_resource_paths(old_property.values(), new_property.values_mut());
        }
    }
    let children: Vec<NodeName> = new.nodes().iter().map(|n| n.name()).collect();
    for name in children {
        if let (Some(old_child), Some(new_child)) = (old.node(&name), new.node_mut(&name)) {
            reuse_resource_paths_in(old_child, new_child);
        }
    }
}

/// Removes the node at `relative` when it is empty, then each ancestor
/// left empty, stopping below the definition root. Returns the absolute
/// paths of the removed nodes, deepest first.
fn prune(root: &mut DefinitionNode, relative: &NodePath) -> Vec<NodePath> {
    let root_path = root.path().clone();
    let mut pruned = Vec::new();
    let mut current = relative.clone();
    while let Some(parent) = current.parent() {
        let Some(name) = current.last_segment().cloned() else {
            break;
        };
        let Some(parent_node) = root.descendant_mut(&parent) else {
            break;
        };
        match parent_node.node(&name) {
            Some(node) if node.is_empty() => {
                parent_node.remove_node(&name);
                pruned.push(root_path.resolve(&current));
            }
            _ => break,
        }
        current = parent;
    }
    pruned
}

/// Prunes empty nodes from `path` upwards and drops the definition when
/// its root is left empty.
fn prune_empty_nodes(module: &mut Module, id: DefinitionId, path: &NodePath) {
    let (pruned, root_empty) = {
        let Some(root) = module.definition_mut(id).and_then(Definition::root_mut) else {
            return;
        };
        let pruned = match root.path().relativize(path) {
            Ok(relative) => prune(root, &relative),
            Err(_) => Vec::new(),
        };
        (pruned, root.is_empty())
    };
    for node in &pruned {
        warn!(
            "Pruned empty node {} of definition {} in module {}",
            node,
            id,
            module.key()
        );
    }
    if root_empty {
        debug!("Removing emptied definition {} from module {}", id, module.key());
        module.remove_definition(id);
    }
}

/// `base` if the module has no such source yet, otherwise `{stem}_{n}.yaml`.
fn unique_source_path(module: &Module, source_type: SourceType, base: &str) -> String {
    if module.source(source_type, base).is_none() {
        return base.to_string();
    }
    let stem = base.strip_suffix(".yaml").unwrap_or(base);
    (2..)
        .map(|n| format!("{}_{}.yaml", stem, n))
        .find(|candidate| module.source(source_type, candidate).is_none())
        .unwrap_or_else(|| base.to_string())
}

impl MergeRun<'_> {
    fn rebuild(&mut self) -> Result<()> {
        self.model = self.baseline.rebuild(self.to_export.iter())?;
        Ok(())
    }

    fn is_local(&self, key: &ModuleKey) -> bool {
        self.to_export.iter().any(|m| m.key() == key)
    }

    fn module(&self, key: &ModuleKey) -> Option<&Module> {
        self.to_export.iter().find(|m| m.key() == key)
    }

    fn module_mut(&mut self, key: &ModuleKey, path: &NodePath) -> Result<&mut Module> {
        match self.to_export.iter_mut().find(|m| m.key() == key) {
            Some(module) => Ok(module),
            None => {
                error!(module = %key, path = %path, "Refusing to modify a module outside the merge");
                Err(MergeError::ModuleNotInMerge {
                    module: key.to_string(),
                    path: path.to_string(),
                })
            }
        }
    }

    /// The module new definitions for `path` go to.
    fn module_for_new_definition(&self, path: &NodePath) -> Result<ModuleKey> {
        let mvn_path = self
            .mappings
            .module_for_path(path)
            .ok_or_else(|| MergeError::NoModuleForPath(path.to_string()))?;
        self.to_export
            .iter()
            .find(|m| m.mvn_path() == Some(mvn_path))
            .map(|m| m.key().clone())
            .ok_or_else(|| MergeError::ModuleNotInMerge {
                module: mvn_path.to_string(),
                path: path.to_string(),
            })
    }

    fn item_exists(&self, item: &DefinitionItemRef) -> bool {
        self.module(&item.module)
            .and_then(|m| m.find_definition(item.definition))
            .and_then(|(_, d)| node_in_definition(d, &item.path))
            .is_some()
    }

    fn definition_node_mut(&mut self, item: &DefinitionItemRef) -> Result<&mut DefinitionNode> {
        let module = self.module_mut(&item.module, &item.path)?;
        let definition = module
            .definition_mut(item.definition)
            .ok_or_else(|| not_found(item))?;
        node_in_definition_mut(definition, &item.path).ok_or_else(|| not_found(item))
    }

    fn property_operation(&self, item: &DefinitionItemRef, name: &str) -> Option<PropertyOperation> {
        let (_, definition) = self.module(&item.module)?.find_definition(item.definition)?;
        node_in_definition(definition, &item.path)?
            .property(name)
            .map(DefinitionProperty::operation)
    }

    // ---- namespaces ----

    fn merge_namespace(&mut self, namespace: &NamespaceDefinition) -> Result<()> {
        let path = NodePath::root().child("hippo:namespaces")?.child(&namespace.prefix)?;
        let existing = self
            .model
            .namespace(&namespace.prefix)
            .map(|n| n.definition.clone());

        match existing {
            Some(item) => {
                let module = self.module_mut(&item.module, &path)?;
                let (source_type, source_path) =
                    source_info(module, item.definition).ok_or_else(|| not_found(&item))?;
                let definition = module
                    .definition_mut(item.definition)
                    .ok_or_else(|| not_found(&item))?;
                let mut replacement = namespace.clone();
                let mut removed = Vec::new();
                if let DefinitionBody::Namespace(current) = definition.body_mut() {
                    if let (Some(old), Some(new)) = (&current.cnd, &mut replacement.cnd) {
                        reuse_resource_path(old, new);
                    }
                    removed.extend(current.cnd.clone());
                    *current = replacement;
                }
                module.note_removed_values(source_type, &source_path, &removed);
                debug!("Updated namespace '{}' in {}", namespace.prefix, item.origin());
            }
            None => {
                let key = self.module_for_new_definition(&path)?;
                let module = self.module_mut(&key, &path)?;
                let source_path = module
                    .config_sources()
                    .find(|s| s.has_definitions_of(DefinitionType::Namespace))
                    .map(|s| s.path().to_string())
                    .unwrap_or_else(|| location_mapper::source_path_for(&path));
                module
                    .get_or_create_source(SourceType::Config, &source_path)
                    .add_namespace_definition(namespace.clone());
                info!(
                    "Added namespace '{}' to '{}' in module {}",
                    namespace.prefix, source_path, key
                );
            }
        }
        Ok(())
    }

    // ---- config ----

    fn merge_config_definition(&mut self, change: &DefinitionNode) -> Result<()> {
        let path = change.path();
        debug!("Merging config change at {}", path);
        match self.model.resolve_id(path) {
            None if change.is_delete() => {
                warn!("Ignoring deletion of '{}': the node does not exist", path);
            }
            None if change.creates_node() => self.create_new_node(change)?,
            None => {
                return Err(MergeError::NodeNotFound {
                    path: path.to_string(),
                })
            }
            Some(_) if change.is_delete() => self.delete_node(path)?,
            Some(_) => self.merge_existing_node(change)?,
        }
        self.rebuild()
    }

    fn create_new_node(&mut self, change: &DefinitionNode) -> Result<()> {
        let path = change.path();
        let parent_path = path.parent().unwrap_or_else(NodePath::root);
        let Some(parent_id) = self.model.resolve_id(&parent_path) else {
            error!(path = %path, "Parent of a new node does not exist");
            return Err(MergeError::MissingParent {
                path: path.to_string(),
                parent: parent_path.to_string(),
            });
        };

        if location_mapper::should_path_create_new_source(path) {
            return self.create_new_definition(change);
        }

        let local = self
            .model
            .node(parent_id)
            .definitions()
            .iter()
            .rev()
            .filter(|item| self.is_local(&item.module))
            .find(|item| self.item_exists(item))
            .cloned();

        let Some(item) = local else {
            return self.create_new_definition(change);
        };

        let target = match change.order_before() {
            Some(name) => Some(NodeName::parse(name)?),
            None => None,
        };
        let parent = self.definition_node_mut(&item)?;
        let mut node = change.clone();
        match target {
            Some(sibling) if parent.node(&sibling).is_some_and(DefinitionNode::creates_node) => {
                node.set_order_before(None);
                parent.insert_node_before(node, &sibling);
            }
            _ => {
                parent.add_node(node);
            }
        }
        debug!("Added node '{}' below {}", path, item);
        Ok(())
    }

    fn create_new_definition(&mut self, change: &DefinitionNode) -> Result<()> {
        let path = change.path();
        let key = self.module_for_new_definition(path)?;
        let source_path = location_mapper::source_path_for(path);
        let module = self.module_mut(&key, path)?;
        module
            .get_or_create_source(SourceType::Config, &source_path)
            .add_config_definition(change.clone());
        info!("Added definition for '{}' to '{}' in module {}", path, source_path, key);
        Ok(())
    }

    /// The local definition node to record changes of `path` in, creating
    /// a new definition when no local one mentions the node.
    fn local_target(&mut self, path: &NodePath, cache: &mut Option<DefinitionItemRef>) -> Result<DefinitionItemRef> {
        if let Some(item) = cache.as_ref() {
            if self.item_exists(item) {
                return Ok(item.clone());
            }
        }

        let candidates: Vec<DefinitionItemRef> = self
            .model
            .resolve_node(path)
            .map(|n| n.definitions().iter().rev().cloned().collect())
            .unwrap_or_default();
        if let Some(item) = candidates
            .into_iter()
            .find(|item| self.is_local(&item.module) && self.item_exists(item))
        {
            *cache = Some(item.clone());
            return Ok(item);
        }

        let key = self.module_for_new_definition(path)?;
        let source_path = location_mapper::source_path_for(path);
        let module = self.module_mut(&key, path)?;
        let id = module
            .get_or_create_source(SourceType::Config, &source_path)
            .add_config_definition(DefinitionNode::new(path.clone()));
        let item = DefinitionItemRef {
            module: key,
            source_type: SourceType::Config,
            source: source_path,
            definition: id,
            path: path.clone(),
        };
        debug!("Created definition {} for changes of '{}'", item, path);
        *cache = Some(item.clone());
        Ok(item)
    }

    fn merge_existing_node(&mut self, change: &DefinitionNode) -> Result<()> {
        let path = change.path().clone();
        let mut target = None;

        if change.order_before().is_some()
            || change.ignore_reordered_children().is_some()
            || change.residual_child_node_category().is_some()
            || change.category().is_some()
        {
            let item = self.local_target(&path, &mut target)?;
            let node = self.definition_node_mut(&item)?;
            if let Some(order_before) = change.order_before() {
                node.set_order_before(Some(order_before.to_string()));
            }
            if let Some(ignore) = change.ignore_reordered_children() {
                node.set_ignore_reordered_children(Some(ignore));
            }
            if let Some(category) = change.residual_child_node_category() {
                node.set_residual_child_node_category(Some(category));
            }
            if let Some(category) = change.category() {
                node.set_category(Some(category));
            }
        }

        for property in change.properties() {
            self.merge_property(&path, property, &mut target)?;
        }

        for child in change.nodes() {
            let exists = self.model.resolve_id(child.path()).is_some();
            if child.is_delete() {
                if exists {
                    self.delete_node(child.path())?;
                    self.rebuild()?;
                } else {
                    warn!("Ignoring deletion of '{}': the node does not exist", child.path());
                }
            } else if exists {
                self.merge_existing_node(child)?;
            } else if child.creates_node() {
                self.create_new_node(child)?;
            } else {
                let item = self.local_target(&path, &mut target)?;
                self.definition_node_mut(&item)?.add_node(child.clone());
            }
        }
        Ok(())
    }

    fn merge_property(
        &mut self,
        node_path: &NodePath,
        property: &DefinitionProperty,
        target: &mut Option<DefinitionItemRef>,
    ) -> Result<()> {
        if property.operation() == PropertyOperation::Delete {
            return self.delete_property(node_path, property.name(), target);
        }

        let existing = self
            .model
            .resolve_property(node_path, property.name())
            .cloned();
        match existing {
            Some(existing) if !property.values().is_empty() => {
                self.update_property(node_path, property, &existing, target)
            }
            _ => {
                let item = self.local_target(node_path, target)?;
                let mut new_property = property.clone();
                if !new_property.values().is_empty() {
                    new_property.set_operation(PropertyOperation::Replace);
                }
                self.definition_node_mut(&item)?.add_property(new_property);
                Ok(())
            }
        }
    }

    fn update_property(
        &mut self,
        node_path: &NodePath,
        property: &DefinitionProperty,
        existing: &ConfigurationProperty,
        target: &mut Option<DefinitionItemRef>,
    ) -> Result<()> {
        let name = property.name();
        let locals: Vec<DefinitionItemRef> = existing
            .definitions()
            .iter()
            .filter(|i| self.is_local(&i.module))
            .cloned()
            .collect();
        let has_upstream = locals.len() < existing.definitions().len();

        if !has_upstream {
            if let Some((first, rest)) = locals.split_first() {
                for item in rest.iter().rev() {
                    self.remove_property_item(item, name)?;
                }
                return self.replace_property_in(first, property, None);
            }
        }

        let needs_override = property.kind() != existing.kind()
            || property.value_type() != existing.value_type()
            || (name == JCR_PRIMARY_TYPE && property.values() != existing.values());

        match locals.split_last() {
            Some((last, others)) => {
                let mut had_override = false;
                for item in others {
                    had_override |= self.property_operation(item, name) == Some(PropertyOperation::Override);
                    self.remove_property_item(item, name)?;
                }
                had_override |= self.property_operation(last, name) == Some(PropertyOperation::Override);
                let operation = if needs_override || had_override {
                    PropertyOperation::Override
                } else {
                    PropertyOperation::Replace
                };
                self.replace_property_in(last, property, Some(operation))
            }
            None => {
                let item = self.local_target(node_path, target)?;
                let mut new_property = property.clone();
                new_property.set_operation(if needs_override {
                    PropertyOperation::Override
                } else {
                    PropertyOperation::Replace
                });
                self.definition_node_mut(&item)?.add_property(new_property);
                Ok(())
            }
        }
    }

    /// Writes `property` into the definition node of `item`, updating an
    /// existing property definition in place.
    fn replace_property_in(
        &mut self,
        item: &DefinitionItemRef,
        property: &DefinitionProperty,
        operation: Option<PropertyOperation>,
    ) -> Result<()> {
        let module = self.module_mut(&item.module, &item.path)?;
        let (source_type, source_path) = source_info(module, item.definition).ok_or_else(|| not_found(item))?;
        let definition = module
            .definition_mut(item.definition)
            .ok_or_else(|| not_found(item))?;
        let node = node_in_definition_mut(definition, &item.path).ok_or_else(|| not_found(item))?;

        let mut replacement = property.clone();
        let old_values = match node.property(property.name()) {
            Some(old) => {
                reuse_resource_paths(old.values(), replacement.values_mut());
                let kept = match old.operation() {
                    PropertyOperation::Override => PropertyOperation::Override,
                    _ => PropertyOperation::Replace,
                };
                replacement.set_operation(operation.unwrap_or(kept));
                old.values().to_vec()
            }
            None => {
                replacement.set_operation(operation.unwrap_or(PropertyOperation::Replace));
                Vec::new()
            }
        };

        match node.property_mut(property.name()) {
            Some(current) => current.update_from(&replacement),
            None => {
                node.add_property(replacement);
            }
        }
        module.note_removed_values(source_type, &source_path, &old_values);
        debug!("Updated property '{}' in {}", property.name(), item);
        Ok(())
    }

    fn delete_property(
        &mut self,
        node_path: &NodePath,
        name: &str,
        target: &mut Option<DefinitionItemRef>,
    ) -> Result<()> {
        let Some(existing) = self.model.resolve_property(node_path, name).cloned() else {
            warn!("Ignoring deletion of '{}/{}': the property does not exist", node_path, name);
            return Ok(());
        };
        let locals: Vec<DefinitionItemRef> = existing
            .definitions()
            .iter()
            .filter(|i| self.is_local(&i.module))
            .cloned()
            .collect();
        let has_upstream = locals.len() < existing.definitions().len();

        for item in locals.iter().rev() {
            self.remove_property_item(item, name)?;
        }
        if has_upstream {
            let item = self.local_target(node_path, target)?;
            self.definition_node_mut(&item)?
                .add_property(DefinitionProperty::delete(name));
        }
        Ok(())
    }

    /// Drops a property from one definition node, pruning what is left
    /// empty. A definition that is already gone is skipped.
    fn remove_property_item(&mut self, item: &DefinitionItemRef, name: &str) -> Result<()> {
        let module = self.module_mut(&item.module, &item.path)?;
        let Some((source_type, source_path)) = source_info(module, item.definition) else {
            return Ok(());
        };
        let removed = module
            .definition_mut(item.definition)
            .and_then(|d| node_in_definition_mut(d, &item.path))
            .and_then(|node| node.remove_property(name));
        if let Some(property) = removed {
            module.note_removed_values(source_type, &source_path, property.values());
            prune_empty_nodes(module, item.definition, &item.path);
        }
        Ok(())
    }

    /// Removes the node of `item` from its definition, or the whole
    /// definition when the node is its root.
    fn remove_node_item(&mut self, item: &DefinitionItemRef) -> Result<()> {
        let module = self.module_mut(&item.module, &item.path)?;
        let Some((source_type, source_path)) = source_info(module, item.definition) else {
            return Ok(());
        };
        let Some(root_path) = module
            .find_definition(item.definition)
            .and_then(|(_, d)| d.root())
            .map(|r| r.path().clone())
        else {
            return Ok(());
        };

        if root_path == item.path {
            module.remove_definition(item.definition);
            debug!("Removed definition {}", item);
            return Ok(());
        }

        let Some(parent_path) = item.path.parent() else {
            return Ok(());
        };
        let Some(name) = item.path.last_segment().cloned() else {
            return Ok(());
        };
        let removed = module
            .definition_mut(item.definition)
            .and_then(|d| node_in_definition_mut(d, &parent_path))
            .and_then(|parent| parent.remove_node(&name));
        if let Some(node) = removed {
            module.note_removed_node(source_type, &source_path, &node);
            prune_empty_nodes(module, item.definition, &parent_path);
            debug!("Removed node {}", item);
        }
        Ok(())
    }

    fn delete_node(&mut self, path: &NodePath) -> Result<()> {
        let Some(id) = self.model.resolve_id(path) else {
            warn!("Ignoring deletion of '{}': the node does not exist", path);
            return Ok(());
        };

        let (local, upstream): (Vec<DefinitionItemRef>, Vec<DefinitionItemRef>) = self
            .model
            .node(id)
            .definitions()
            .iter()
            .cloned()
            .partition(|item| self.is_local(&item.module));
        let descendants: Vec<DefinitionItemRef> = self
            .model
            .descendant_ids(id)
            .into_iter()
            .skip(1)
            .flat_map(|d| self.model.node(d).definitions().to_vec())
            .filter(|item| self.is_local(&item.module))
            .collect();

        match (local.split_first(), upstream.is_empty()) {
            (None, _) => {
                for item in &descendants {
                    self.remove_node_item(item)?;
                }
                let key = self.module_for_new_definition(path)?;
                let source_path = location_mapper::source_path_for(path);
                let module = self.module_mut(&key, path)?;
                module
                    .get_or_create_source(SourceType::Config, &source_path)
                    .add_config_definition(DefinitionNode::delete_marker(path.clone()));
                info!("Recorded deletion of upstream node '{}' in '{}' of module {}", path, source_path, key);
            }
            (Some(_), true) => {
                for item in local.iter().chain(descendants.iter()) {
                    self.remove_node_item(item)?;
                }
                info!("Removed all definitions of '{}'", path);
            }
            (Some((keep, others)), false) => {
                {
                    let module = self.module_mut(&keep.module, path)?;
                    let (source_type, source_path) =
                        source_info(module, keep.definition).ok_or_else(|| not_found(keep))?;
                    let old = {
                        let node = module
                            .definition_mut(keep.definition)
                            .and_then(|d| node_in_definition_mut(d, &keep.path))
                            .ok_or_else(|| not_found(keep))?;
                        let old = node.clone();
                        node.make_delete_marker();
                        old
                    };
                    module.note_removed_node(source_type, &source_path, &old);
                }
                for item in others.iter().chain(descendants.iter()) {
                    self.remove_node_item(item)?;
                }
                info!("Collapsed local definitions of '{}' into one delete marker in {}", path, keep.origin());
            }
        }
        Ok(())
    }

    // ---- content ----

    fn merge_content_definition(&mut self, change: &DefinitionNode) -> Result<()> {
        let path = change.path().clone();
        let items = self.model.content_definitions().to_vec();

        let mut exact = Vec::new();
        let mut ancestor: Option<DefinitionItemRef> = None;
        let mut below = Vec::new();
        let mut upstream_covers = false;
        for item in items {
            let local = self.is_local(&item.definition.module);
            if item.path == path || item.path.is_ancestor_of(&path) {
                if !local {
                    upstream_covers = true;
                } else if item.path == path {
                    exact.push(item.definition);
                } else {
                    let deeper = match &ancestor {
                        Some(a) => a.path.segment_count() < item.path.segment_count(),
                        None => true,
                    };
                    if deeper {
                        ancestor = Some(item.definition);
                    }
                }
            } else if path.is_ancestor_of(&item.path) && local {
                below.push(item.definition);
            }
        }

        if change.is_delete() && exact.is_empty() && ancestor.is_none() {
            if upstream_covers {
                return Err(MergeError::UpstreamContentDelete {
                    path: path.to_string(),
                });
            }
            warn!("Ignoring deletion of content '{}': it is not defined", path);
            return Ok(());
        }

        for item in &below {
            self.remove_node_item(item)?;
        }

        if change.is_delete() {
            for item in &exact {
                self.remove_node_item(item)?;
            }
            if exact.is_empty() {
                if let Some(item) = ancestor {
                    self.remove_node_item(&DefinitionItemRef {
                        path: path.clone(),
                        ..item
                    })?;
                }
            }
            info!("Removed content '{}'", path);
            return self.rebuild();
        }

        if let Some((first, rest)) = exact.split_first() {
            for item in rest {
                self.remove_node_item(item)?;
            }
            self.replace_content(first, change)?;
        } else if let Some(item) = ancestor.filter(|a| self.content_parent_exists(a, &path)) {
            self.replace_content(&item, change)?;
        } else {
            let key = self.module_for_new_definition(&path)?;
            let module = self.module_mut(&key, &path)?;
            let source_path =
                unique_source_path(module, SourceType::Content, &location_mapper::source_path_for(&path));
            module
                .add_source(Source::new_changed(&source_path, SourceType::Content))
                .add_content_definition(change.clone());
            info!("Added content '{}' as '{}' in module {}", path, source_path, key);
        }
        self.rebuild()
    }

    fn content_parent_exists(&self, item: &DefinitionItemRef, path: &NodePath) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        self.module(&item.module)
            .and_then(|m| m.find_definition(item.definition))
            .and_then(|(_, d)| node_in_definition(d, &parent))
            .is_some()
    }

    /// Replaces the subtree at `change`'s path inside the content
    /// definition of `item`.
    fn replace_content(&mut self, item: &DefinitionItemRef, change: &DefinitionNode) -> Result<()> {
        let module = self.module_mut(&item.module, change.path())?;
        let (source_type, source_path) = source_info(module, item.definition).ok_or_else(|| not_found(item))?;
        let old = {
            let root = module
                .definition_mut(item.definition)
                .and_then(Definition::root_mut)
                .ok_or_else(|| not_found(item))?;
            let relative = root.path().relativize(change.path())?;
            let mut replacement = change.clone();
            match relative.parent() {
                None => {
                    reuse_resource_paths_in(root, &mut replacement);
                    Some(std::mem::replace(root, replacement))
                }
                Some(parent_relative) => {
                    let parent = root
                        .descendant_mut(&parent_relative)
                        .ok_or_else(|| not_found(item))?;
                    let name = change.name();
                    let old = parent.node(&name).cloned();
                    if let Some(old) = &old {
                        reuse_resource_paths_in(old, &mut replacement);
                    }
                    parent.add_node(replacement);
                    old
                }
            }
        };
        if let Some(old) = old {
            module.note_removed_node(source_type, &source_path, &old);
        }
        info!("Replaced content '{}' in {}", change.path(), item.origin());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoexport::module_mapping::ModuleMapping;
    use crate::model::{ResourceOrigin, ResourceRef, ValueType};
    use std::path::PathBuf;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_prune_removes_empty_ancestors() {
        let mut root = DefinitionNode::new(p("/a"));
        root.add_property(DefinitionProperty::single("x", Value::string("1")));
        let mut b = DefinitionNode::new(p("/a/b"));
        b.add_node(DefinitionNode::new(p("/a/b/c")));
        root.add_node(b);

        let pruned = prune(&mut root, &NodePath::parse("b/c").unwrap().to_relative());
        assert_eq!(pruned, vec![p("/a/b/c"), p("/a/b")]);
        assert!(root.nodes().is_empty());
        assert!(!root.is_empty());
    }

    #[test]
    fn test_reuse_resource_path() {
        let old = Value::resource(
            ValueType::String,
            ResourceRef::existing("text.txt", ResourceOrigin::File(PathBuf::from("/x/text.txt"))),
        );
        let mut new = Value::resource(ValueType::String, ResourceRef::new_resource("other.txt", b"new".to_vec()));
        reuse_resource_path(&old, &mut new);
        let resource = new.resource_ref().unwrap();
        assert_eq!(resource.path, "text.txt");
        assert!(!resource.is_new);
    }

    #[test]
    fn test_unique_source_path() {
        let mut module = Module::new(ModuleKey::new("g", "p", "m"));
        module.add_source(Source::new("content/a.yaml", SourceType::Content));
        assert_eq!(unique_source_path(&module, SourceType::Content, "content/b.yaml"), "content/b.yaml");
        assert_eq!(unique_source_path(&module, SourceType::Content, "content/a.yaml"), "content/a_2.yaml");
        assert_eq!(unique_source_path(&module, SourceType::Config, "content/a.yaml"), "content/a.yaml");
    }

    #[test]
    fn test_empty_changes_leave_modules_untouched() {
        let mut module = Module::new(ModuleKey::new("g", "p", "m"));
        module.set_mvn_path(Some("app".to_string()));
        let mut node = DefinitionNode::new(p("/a"));
        node.add_property(DefinitionProperty::single(
            JCR_PRIMARY_TYPE,
            Value::text(ValueType::Name, "nt:unstructured"),
        ));
        module
            .add_source(Source::new("main.yaml", SourceType::Config))
            .push_loaded(Definition::config(node));
        let baseline = ConfigurationModel::from_modules(vec![module.clone()]).unwrap();

        let service = DefinitionMergeService::with_mappings(ModuleMappingTable::new(vec![
            ModuleMapping::new("app", ["/"]).unwrap(),
        ]));
        let changes = Module::new(ModuleKey::new("auto", "export", "changes"));
        let merged = service
            .merge_changes_to_modules(&changes, [&module], &baseline)
            .unwrap();
        assert_eq!(merged, vec![module]);
        assert!(!merged[0].has_changes());
    }
}
