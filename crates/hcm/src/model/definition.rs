//! Definitions: the top-level stanzas of a source file.

use std::sync::atomic::{AtomicU64, Ordering};

use super::category::ConfigurationItemCategory;
use super::value::{Value, ValueType};
use crate::path::{NodeName, NodePath};

pub const JCR_PRIMARY_TYPE: &str = "jcr:primaryType";
pub const JCR_MIXIN_TYPES: &str = "jcr:mixinTypes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Single,
    List,
    Set,
}

impl PropertyKind {
    pub fn is_multiple(&self) -> bool {
        !matches!(self, PropertyKind::Single)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyOperation {
    Replace,
    Add,
    Delete,
    Override,
}

impl PropertyOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyOperation::Replace => "replace",
            PropertyOperation::Add => "add",
            PropertyOperation::Delete => "delete",
            PropertyOperation::Override => "override",
        }
    }
}

impl std::str::FromStr for PropertyOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(PropertyOperation::Replace),
            "add" => Ok(PropertyOperation::Add),
            "delete" => Ok(PropertyOperation::Delete),
            "override" => Ok(PropertyOperation::Override),
            _ => Err(format!("Unknown property operation: {}", s)),
        }
    }
}

/// A property as written in one definition.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionProperty {
    name: String,
    kind: PropertyKind,
    value_type: ValueType,
    values: Vec<Value>,
    operation: PropertyOperation,
    category: Option<ConfigurationItemCategory>,
}

impl DefinitionProperty {
    /// A single-valued property replacing any earlier value.
    pub fn single(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Single,
            value_type: value.value_type(),
            values: vec![value],
            operation: PropertyOperation::Replace,
            category: None,
        }
    }

    /// A list property.
    pub fn multiple(name: impl Into<String>, value_type: ValueType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::List,
            value_type,
            values,
            operation: PropertyOperation::Replace,
            category: None,
        }
    }

    /// A `operation: delete` marker.
    pub fn delete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Single,
            value_type: ValueType::String,
            values: Vec::new(),
            operation: PropertyOperation::Delete,
            category: None,
        }
    }

    /// A category-only entry carrying no value.
    pub fn category_only(name: impl Into<String>, category: ConfigurationItemCategory) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Single,
            value_type: ValueType::String,
            values: Vec::new(),
            operation: PropertyOperation::Replace,
            category: Some(category),
        }
    }

    pub fn with_operation(mut self, operation: PropertyOperation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_kind(mut self, kind: PropertyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn is_multiple(&self) -> bool {
        self.kind.is_multiple()
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn operation(&self) -> PropertyOperation {
        self.operation
    }

    pub fn set_operation(&mut self, operation: PropertyOperation) {
        self.operation = operation;
    }

    pub fn category(&self) -> Option<ConfigurationItemCategory> {
        self.category
    }

    pub fn set_category(&mut self, category: Option<ConfigurationItemCategory>) {
        self.category = category;
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    /// The value of a single-valued property.
    pub fn value(&self) -> Option<&Value> {
        if self.kind.is_multiple() {
            None
        } else {
            self.values.first()
        }
    }

    /// Takes over type, kind, values and operation from `other`.
    pub fn update_from(&mut self, other: &DefinitionProperty) {
        self.kind = other.kind;
        self.value_type = other.value_type;
        self.values = other.values.clone();
        self.operation = other.operation;
        if other.category.is_some() {
            self.category = other.category;
        }
    }
}

/// A node as written in one definition.
///
/// Children and properties keep their insertion order so that written
/// files stay stable.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionNode {
    path: NodePath,
    delete: bool,
    order_before: Option<String>,
    ignore_reordered_children: Option<bool>,
    category: Option<ConfigurationItemCategory>,
    residual_child_node_category: Option<ConfigurationItemCategory>,
    nodes: Vec<DefinitionNode>,
    properties: Vec<DefinitionProperty>,
}

impl DefinitionNode {
    /// Creates an empty node at `path`.
    pub fn new(path: NodePath) -> Self {
        Self {
            path,
            delete: false,
            order_before: None,
            ignore_reordered_children: None,
            category: None,
            residual_child_node_category: None,
            nodes: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// A `.meta:delete: true` marker.
    pub fn delete_marker(path: NodePath) -> Self {
        let mut node = Self::new(path);
        node.delete = true;
        node
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The last path segment; the root has the empty name.
    pub fn name(&self) -> NodeName {
        self.path
            .last_segment()
            .cloned()
            .unwrap_or_else(|| NodeName::unindexed(""))
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn is_delete(&self) -> bool {
        self.delete
    }

    pub fn set_delete(&mut self, delete: bool) {
        self.delete = delete;
    }

    pub fn order_before(&self) -> Option<&str> {
        self.order_before.as_deref()
    }

    pub fn set_order_before(&mut self, order_before: Option<String>) {
        self.order_before = order_before;
    }

    pub fn ignore_reordered_children(&self) -> Option<bool> {
        self.ignore_reordered_children
    }

    pub fn set_ignore_reordered_children(&mut self, value: Option<bool>) {
        self.ignore_reordered_children = value;
    }

    pub fn category(&self) -> Option<ConfigurationItemCategory> {
        self.category
    }

    pub fn set_category(&mut self, category: Option<ConfigurationItemCategory>) {
        self.category = category;
    }

    pub fn residual_child_node_category(&self) -> Option<ConfigurationItemCategory> {
        self.residual_child_node_category
    }

    pub fn set_residual_child_node_category(&mut self, category: Option<ConfigurationItemCategory>) {
        self.residual_child_node_category = category;
    }

    pub fn nodes(&self) -> &[DefinitionNode] {
        &self.nodes
    }

    pub fn properties(&self) -> &[DefinitionProperty] {
        &self.properties
    }

    pub fn node(&self, name: &NodeName) -> Option<&DefinitionNode> {
        self.nodes.iter().find(|n| &n.name() == name)
    }

    pub fn node_mut(&mut self, name: &NodeName) -> Option<&mut DefinitionNode> {
        self.nodes.iter_mut().find(|n| &n.name() == name)
    }

    /// Adds `node` as the last child, re-rooting its path under this node.
    /// An existing child of the same name is replaced in place.
    pub fn add_node(&mut self, mut node: DefinitionNode) -> &mut DefinitionNode {
        let name = node.name();
        node.rebase(self.path.resolve_name(&name));
        match self.nodes.iter().position(|n| n.name() == name) {
            Some(index) => {
                self.nodes[index] = node;
                &mut self.nodes[index]
            }
            None => {
                self.nodes.push(node);
                let last = self.nodes.len() - 1;
                &mut self.nodes[last]
            }
        }
    }

    /// Adds `node` right before the child named `sibling`, or last when
    /// there is no such child.
    pub fn insert_node_before(&mut self, mut node: DefinitionNode, sibling: &NodeName) -> &mut DefinitionNode {
        let name = node.name();
        node.rebase(self.path.resolve_name(&name));
        self.nodes.retain(|n| n.name() != name);
        let index = self
            .nodes
            .iter()
            .position(|n| &n.name() == sibling)
            .unwrap_or(self.nodes.len());
        self.nodes.insert(index, node);
        &mut self.nodes[index]
    }

    /// Removes a child node and returns it.
    pub fn remove_node(&mut self, name: &NodeName) -> Option<DefinitionNode> {
        let index = self.nodes.iter().position(|n| &n.name() == name)?;
        Some(self.nodes.remove(index))
    }

    pub fn property(&self, name: &str) -> Option<&DefinitionProperty> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut DefinitionProperty> {
        self.properties.iter_mut().find(|p| p.name() == name)
    }

    /// Adds or replaces a property, keeping the position of a replaced one.
    pub fn add_property(&mut self, property: DefinitionProperty) -> &mut DefinitionProperty {
        match self.properties.iter().position(|p| p.name() == property.name()) {
            Some(index) => {
                self.properties[index] = property;
                &mut self.properties[index]
            }
            None => {
                self.properties.push(property);
                let last = self.properties.len() - 1;
                &mut self.properties[last]
            }
        }
    }

    /// Removes a property and returns it.
    pub fn remove_property(&mut self, name: &str) -> Option<DefinitionProperty> {
        let index = self.properties.iter().position(|p| p.name() == name)?;
        Some(self.properties.remove(index))
    }

    /// True when the node carries nothing at all.
    pub fn is_empty(&self) -> bool {
        !self.delete
            && self.order_before.is_none()
            && self.ignore_reordered_children.is_none()
            && self.category.is_none()
            && self.residual_child_node_category.is_none()
            && self.nodes.is_empty()
            && self.properties.is_empty()
    }

    /// True when this node creates its node: it declares a primary type
    /// that is neither an override nor a delete.
    pub fn creates_node(&self) -> bool {
        !self.delete
            && self.property(JCR_PRIMARY_TYPE).is_some_and(|p| {
                !matches!(
                    p.operation(),
                    PropertyOperation::Override | PropertyOperation::Delete
                )
            })
    }

    /// Turns this node into a bare delete marker.
    pub fn make_delete_marker(&mut self) {
        self.delete = true;
        self.order_before = None;
        self.ignore_reordered_children = None;
        self.category = None;
        self.residual_child_node_category = None;
        self.nodes.clear();
        self.properties.clear();
    }

    /// Moves this node, and all of its descendants, to `path`.
    pub fn rebase(&mut self, path: NodePath) {
        for child in &mut self.nodes {
            let child_path = path.resolve_name(&child.name());
            child.rebase(child_path);
        }
        self.path = path;
    }

    /// The node at `relative` below this one; the empty path is this node.
    pub fn descendant(&self, relative: &NodePath) -> Option<&DefinitionNode> {
        let mut current = self;
        for segment in relative.segments() {
            current = current.node(segment)?;
        }
        Some(current)
    }

    /// The node at `relative` below this one.
    pub fn descendant_mut(&mut self, relative: &NodePath) -> Option<&mut DefinitionNode> {
        let mut current = self;
        for segment in relative.segments() {
            current = current.node_mut(segment)?;
        }
        Some(current)
    }

    /// Visits every value in this subtree.
    pub fn visit_values<'a>(&'a self, visitor: &mut dyn FnMut(&'a Value)) {
        for property in &self.properties {
            for value in property.values() {
                visitor(value);
            }
        }
        for child in &self.nodes {
            child.visit_values(visitor);
        }
    }

    pub fn visit_values_mut(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        for property in &mut self.properties {
            for value in property.values_mut() {
                visitor(value);
            }
        }
        for child in &mut self.nodes {
            child.visit_values_mut(visitor);
        }
    }
}

/// A namespace registration.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceDefinition {
    pub prefix: String,
    pub uri: String,
    /// A resource value holding the CND of the namespace's node types.
    pub cnd: Option<Value>,
}

/// Identity of a definition, stable across clones of its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u64);

static NEXT_DEFINITION_ID: AtomicU64 = AtomicU64::new(1);

impl DefinitionId {
    pub fn next() -> Self {
        DefinitionId(NEXT_DEFINITION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionType {
    Namespace,
    Config,
    Content,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionBody {
    Namespace(NamespaceDefinition),
    Config(DefinitionNode),
    Content(DefinitionNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    id: DefinitionId,
    body: DefinitionBody,
}

impl Definition {
    /// Creates a definition with a fresh id.
    pub fn new(body: DefinitionBody) -> Self {
        Self {
            id: DefinitionId::next(),
            body,
        }
    }

    /// Creates a config definition rooted at `root`.
    pub fn config(root: DefinitionNode) -> Self {
        Self::new(DefinitionBody::Config(root))
    }

    /// Creates a content definition rooted at `root`.
    pub fn content(root: DefinitionNode) -> Self {
        Self::new(DefinitionBody::Content(root))
    }

    pub fn namespace(namespace: NamespaceDefinition) -> Self {
        Self::new(DefinitionBody::Namespace(namespace))
    }

    pub fn id(&self) -> DefinitionId {
        self.id
    }

    pub fn definition_type(&self) -> DefinitionType {
        match self.body {
            DefinitionBody::Namespace(_) => DefinitionType::Namespace,
            DefinitionBody::Config(_) => DefinitionType::Config,
            DefinitionBody::Content(_) => DefinitionType::Content,
        }
    }

    pub fn body(&self) -> &DefinitionBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut DefinitionBody {
        &mut self.body
    }

    /// The root node of a config or content definition.
    pub fn root(&self) -> Option<&DefinitionNode> {
        match &self.body {
            DefinitionBody::Config(node) | DefinitionBody::Content(node) => Some(node),
            DefinitionBody::Namespace(_) => None,
        }
    }

    pub fn root_mut(&mut self) -> Option<&mut DefinitionNode> {
        match &mut self.body {
            DefinitionBody::Config(node) | DefinitionBody::Content(node) => Some(node),
            DefinitionBody::Namespace(_) => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&NamespaceDefinition> {
        match &self.body {
            DefinitionBody::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    /// Visits every value held by this definition.
    pub fn visit_values<'a>(&'a self, visitor: &mut dyn FnMut(&'a Value)) {
        match &self.body {
            DefinitionBody::Namespace(ns) => {
                if let Some(cnd) = &ns.cnd {
                    visitor(cnd);
                }
            }
            DefinitionBody::Config(node) | DefinitionBody::Content(node) => {
                node.visit_values(visitor)
            }
        }
    }

    pub fn visit_values_mut(&mut self, visitor: &mut dyn FnMut(&mut Value)) {
        match &mut self.body {
            DefinitionBody::Namespace(ns) => {
                if let Some(cnd) = &mut ns.cnd {
                    visitor(cnd);
                }
            }
            DefinitionBody::Config(node) | DefinitionBody::Content(node) => {
                node.visit_values_mut(visitor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn typed_node(path: &str) -> DefinitionNode {
        let mut node = DefinitionNode::new(p(path));
        node.add_property(DefinitionProperty::single(
            JCR_PRIMARY_TYPE,
            Value::text(ValueType::Name, "nt:unstructured"),
        ));
        node
    }

    #[test]
    fn test_add_node_rebases_subtree() {
        let mut parent = DefinitionNode::new(p("/a"));
        let mut child = typed_node("/elsewhere/b");
        child.add_node(typed_node("/whatever/c"));
        parent.add_node(child);

        let b = parent.node(&NodeName::unindexed("b")).unwrap();
        assert_eq!(b.path(), &p("/a/b"));
        assert_eq!(b.nodes()[0].path(), &p("/a/b/c"));
    }

    #[test]
    fn test_insert_node_before() {
        let mut parent = DefinitionNode::new(p("/a"));
        parent.add_node(typed_node("/a/x"));
        parent.add_node(typed_node("/a/y"));
        parent.insert_node_before(typed_node("/a/new"), &NodeName::unindexed("y"));
        let names: Vec<String> = parent.nodes().iter().map(|n| n.name().to_string()).collect();
        assert_eq!(names, vec!["x", "new", "y"]);
    }

    #[test]
    fn test_creates_node() {
        assert!(typed_node("/a").creates_node());
        let mut overridden = typed_node("/a");
        overridden
            .property_mut(JCR_PRIMARY_TYPE)
            .unwrap()
            .set_operation(PropertyOperation::Override);
        assert!(!overridden.creates_node());
        assert!(!DefinitionNode::new(p("/a")).creates_node());
        assert!(!DefinitionNode::delete_marker(p("/a")).creates_node());
    }

    #[test]
    fn test_descendant_lookup_ignores_implicit_index() {
        let mut root = DefinitionNode::new(p("/a"));
        root.add_node(typed_node("/a/b"));
        assert!(root.descendant(&p("b[1]")).is_some());
        assert!(root.descendant(&p("b[2]")).is_none());
        assert!(root.descendant(&NodePath::empty()).is_some());
    }

    #[test]
    fn test_make_delete_marker_clears_content() {
        let mut node = typed_node("/a");
        node.add_node(typed_node("/a/b"));
        node.make_delete_marker();
        assert!(node.is_delete());
        assert!(node.nodes().is_empty());
        assert!(node.properties().is_empty());
    }

    #[test]
    fn test_definition_ids_are_unique() {
        let a = Definition::config(typed_node("/a"));
        let b = Definition::config(typed_node("/a"));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
