//! Builder patterns for creating test data programmatically.
//!
//! These builders assemble definition trees and change modules without
//! going through YAML.

#![allow(dead_code)]

use hcm::autoexport::{ModuleMapping, ModuleMappingTable};
use hcm::model::{
    DefinitionNode, DefinitionProperty, NamespaceDefinition, Source, SourceType, Value, ValueType,
    JCR_PRIMARY_TYPE,
};
use hcm::{DefinitionMergeService, Module, ModuleKey, NodePath};

pub fn p(path: &str) -> NodePath {
    NodePath::parse(path).expect("Invalid test path")
}

/// Builder for `DefinitionNode` trees.
pub struct NodeBuilder {
    node: DefinitionNode,
}

impl NodeBuilder {
    pub fn new(path: &str) -> Self {
        Self {
            node: DefinitionNode::new(p(path)),
        }
    }

    /// A node that creates itself with the given primary type.
    pub fn typed(path: &str, primary_type: &str) -> Self {
        Self::new(path).primary_type(primary_type)
    }

    pub fn primary_type(mut self, primary_type: &str) -> Self {
        self.node.add_property(DefinitionProperty::single(
            JCR_PRIMARY_TYPE,
            Value::text(ValueType::Name, primary_type),
        ));
        self
    }

    pub fn string(mut self, name: &str, value: &str) -> Self {
        self.node
            .add_property(DefinitionProperty::single(name, Value::string(value)));
        self
    }

    pub fn long(mut self, name: &str, value: i64) -> Self {
        self.node
            .add_property(DefinitionProperty::single(name, Value::long(value)));
        self
    }

    pub fn property(mut self, property: DefinitionProperty) -> Self {
        self.node.add_property(property);
        self
    }

    pub fn delete_property(mut self, name: &str) -> Self {
        self.node.add_property(DefinitionProperty::delete(name));
        self
    }

    pub fn order_before(mut self, sibling: &str) -> Self {
        self.node.set_order_before(Some(sibling.to_string()));
        self
    }

    /// Adds a child; its path is rebased below this node.
    pub fn child(mut self, child: NodeBuilder) -> Self {
        self.node.add_node(child.build());
        self
    }

    pub fn build(self) -> DefinitionNode {
        self.node
    }
}

/// A `.meta:delete` marker for `path`.
pub fn delete_marker(path: &str) -> DefinitionNode {
    DefinitionNode::delete_marker(p(path))
}

/// Builder for the module of changed definitions fed to a merge.
pub struct ChangesBuilder {
    module: Module,
}

impl ChangesBuilder {
    pub fn new() -> Self {
        Self {
            module: Module::new(ModuleKey::new("hcm-autoexport", "autoexport", "changes")),
        }
    }

    pub fn config(mut self, node: DefinitionNode) -> Self {
        self.module
            .get_or_create_source(SourceType::Config, "changes.yaml")
            .add_config_definition(node);
        self
    }

    pub fn content(mut self, node: DefinitionNode) -> Self {
        let source_path = format!("content{}.yaml", node.path());
        self.module
            .add_source(Source::new_changed(source_path, SourceType::Content))
            .add_content_definition(node);
        self
    }

    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.module
            .get_or_create_source(SourceType::Config, "changes.yaml")
            .add_namespace_definition(NamespaceDefinition {
                prefix: prefix.to_string(),
                uri: uri.to_string(),
                cnd: None,
            });
        self
    }

    pub fn build(self) -> Module {
        self.module
    }
}

impl Default for ChangesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A merge service routing each `(mvnPath, pattern)` pair, in order.
pub fn merge_service(mappings: &[(&str, &str)]) -> DefinitionMergeService {
    let mappings = mappings
        .iter()
        .map(|(mvn_path, pattern)| ModuleMapping::new(*mvn_path, [*pattern]).expect("Invalid mapping pattern"))
        .collect();
    DefinitionMergeService::with_mappings(ModuleMappingTable::new(mappings))
}
