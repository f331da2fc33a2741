//! Renders sources back into the YAML layout the parser reads.

use base64::Engine;
use serde_yaml::{Mapping, Value as Yaml};

use crate::error::WriteError;
use crate::model::{
    DefinitionBody, DefinitionNode, DefinitionProperty, NamespaceDefinition, PropertyOperation,
    Scalar, Source, SourceType, Value, ValueKind, ValueType, JCR_MIXIN_TYPES, JCR_PRIMARY_TYPE,
};
use crate::parser::source_parser::{
    META_CATEGORY, META_DELETE, META_IGNORE_REORDERED_CHILDREN, META_ORDER_BEFORE,
    META_RESIDUAL_CHILD_NODE_CATEGORY,
};
use crate::path::sns::has_sns;

pub struct SourceSerializer;

impl SourceSerializer {
    /// Serializes `source` into the text of its YAML file.
    pub fn serialize(source: &Source) -> Result<String, WriteError> {
        let yaml = Self::to_yaml(source)?;
        serde_yaml::to_string(&yaml).map_err(|e| WriteError::SerializeYaml {
            path: source.path().to_string(),
            message: e.to_string(),
        })
    }

    pub fn to_yaml(source: &Source) -> Result<Yaml, WriteError> {
        match source.source_type() {
            SourceType::Config => {
                let mut namespaces = Mapping::new();
                let mut config = Mapping::new();
                for definition in source.definitions() {
                    match definition.body() {
                        DefinitionBody::Namespace(ns) => {
                            namespaces.insert(key(&ns.prefix), namespace(ns));
                        }
                        DefinitionBody::Config(node) => {
                            config.insert(key(&node.path().to_string()), node_yaml(source, node)?);
                        }
                        DefinitionBody::Content(node) => {
                            return Err(WriteError::SerializeYaml {
                                path: source.path().to_string(),
                                message: format!("content definition '{}' in a config source", node.path()),
                            })
                        }
                    }
                }
                let mut definitions = Mapping::new();
                if !namespaces.is_empty() {
                    definitions.insert(key("namespace"), Yaml::Mapping(namespaces));
                }
                if !config.is_empty() {
                    definitions.insert(key("config"), Yaml::Mapping(config));
                }
                let mut root = Mapping::new();
                root.insert(key("definitions"), Yaml::Mapping(definitions));
                Ok(Yaml::Mapping(root))
            }
            SourceType::Content => {
                let mut root = Mapping::new();
                for definition in source.definitions() {
                    if let Some(node) = definition.root() {
                        root.insert(key(&node.path().to_string()), node_yaml(source, node)?);
                    }
                }
                Ok(Yaml::Mapping(root))
            }
        }
    }
}

fn key(s: &str) -> Yaml {
    Yaml::String(s.to_string())
}

fn namespace(ns: &NamespaceDefinition) -> Yaml {
    let mut map = Mapping::new();
    map.insert(key("uri"), key(&ns.uri));
    if let Some(cnd) = &ns.cnd {
        match cnd.kind() {
            ValueKind::Resource(r) => {
                map.insert(key("cnd"), key(&r.path));
            }
            _ => {
                map.insert(key("cnd"), key(&cnd.to_string()));
            }
        }
    }
    Yaml::Mapping(map)
}

fn node_yaml(source: &Source, node: &DefinitionNode) -> Result<Yaml, WriteError> {
    let mut map = Mapping::new();
    if node.is_delete() {
        map.insert(key(META_DELETE), Yaml::Bool(true));
        return Ok(Yaml::Mapping(map));
    }
    if let Some(category) = node.category() {
        map.insert(key(META_CATEGORY), key(category.as_str()));
    }
    if let Some(order_before) = node.order_before() {
        map.insert(key(META_ORDER_BEFORE), key(order_before));
    }
    if let Some(ignore) = node.ignore_reordered_children() {
        map.insert(key(META_IGNORE_REORDERED_CHILDREN), Yaml::Bool(ignore));
    }
    if let Some(category) = node.residual_child_node_category() {
        map.insert(key(META_RESIDUAL_CHILD_NODE_CATEGORY), key(category.as_str()));
    }

    let mut properties: Vec<&DefinitionProperty> = node.properties().iter().collect();
    properties.sort_by_key(|p| match p.name() {
        JCR_PRIMARY_TYPE => 0,
        JCR_MIXIN_TYPES => 1,
        _ => 2,
    });
    for property in properties {
        map.insert(key(property.name()), property_yaml(property));
    }

    let sibling_names: Vec<String> = node.nodes().iter().map(|n| n.name().to_string()).collect();
    for child in node.nodes() {
        let name = child.name();
        let rendered = name.to_string();
        let sns = has_sns(&rendered, sibling_names.iter().map(String::as_str)).map_err(|e| {
            WriteError::SerializeYaml {
                path: source.path().to_string(),
                message: e.to_string(),
            }
        })?;
        let written = if sns {
            name.force_index()
        } else {
            name.minimally_indexed()
        };
        map.insert(key(&format!("/{}", written)), node_yaml(source, child)?);
    }
    Ok(Yaml::Mapping(map))
}

fn implicit_type(name: &str) -> ValueType {
    if name == JCR_PRIMARY_TYPE || name == JCR_MIXIN_TYPES {
        ValueType::Name
    } else {
        ValueType::String
    }
}

/// True when the value reads back with the same type without a `type:` key.
fn is_plain(name: &str, value: &Value) -> bool {
    match (value.value_type(), value.kind()) {
        (ValueType::Long, ValueKind::Literal(Scalar::Long(_)))
        | (ValueType::Double, ValueKind::Literal(Scalar::Double(_)))
        | (ValueType::Boolean, ValueKind::Literal(Scalar::Boolean(_))) => true,
        (t, ValueKind::Literal(Scalar::Text(_))) => t == implicit_type(name),
        _ => false,
    }
}

fn scalar_yaml(value: &Value) -> Yaml {
    match value.kind() {
        ValueKind::Literal(Scalar::Text(s)) => key(s),
        ValueKind::Literal(Scalar::Long(v)) => Yaml::Number((*v).into()),
        ValueKind::Literal(Scalar::Double(v)) => Yaml::Number((*v).into()),
        ValueKind::Literal(Scalar::Boolean(v)) => Yaml::Bool(*v),
        ValueKind::Literal(Scalar::Date(d)) => key(&d.to_rfc3339()),
        ValueKind::Literal(Scalar::Binary(bytes)) => {
            key(&base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        ValueKind::Resource(r) => key(&r.path),
        ValueKind::Path(p) => key(p),
    }
}

fn property_yaml(property: &DefinitionProperty) -> Yaml {
    if property.operation() == PropertyOperation::Delete {
        let mut map = Mapping::new();
        map.insert(key("operation"), key("delete"));
        return Yaml::Mapping(map);
    }
    if property.values().is_empty() && !property.is_multiple() {
        let mut map = Mapping::new();
        if let Some(category) = property.category() {
            map.insert(key(META_CATEGORY), key(category.as_str()));
        }
        return Yaml::Mapping(map);
    }

    let implicit = implicit_type(property.name());
    let plain_values = property.values().iter().all(|v| is_plain(property.name(), v))
        && (!property.is_multiple()
            || !property.values().is_empty()
            || property.value_type() == implicit);

    let body = if property.is_multiple() {
        Yaml::Sequence(property.values().iter().map(scalar_yaml).collect())
    } else {
        match property.values().first() {
            Some(value) => scalar_yaml(value),
            None => Yaml::Null,
        }
    };

    if plain_values
        && property.operation() == PropertyOperation::Replace
        && property.category().is_none()
    {
        return body;
    }

    let (value_key, needs_type) = match property.values().first().map(|v| v.kind()) {
        Some(ValueKind::Resource(_)) => ("resource", property.value_type() != ValueType::String),
        Some(ValueKind::Path(_)) => ("path", property.value_type() != ValueType::Reference),
        _ => ("value", !plain_values),
    };

    let mut map = Mapping::new();
    if needs_type {
        map.insert(key("type"), key(property.value_type().as_str()));
    }
    if property.operation() != PropertyOperation::Replace {
        map.insert(key("operation"), key(property.operation().as_str()));
    }
    if let Some(category) = property.category() {
        map.insert(key(META_CATEGORY), key(category.as_str()));
    }
    map.insert(key(value_key), body);
    Yaml::Mapping(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfigurationItemCategory, ResourceRef};
    use crate::parser::{SourceParser, SourceRoot};
    use crate::path::NodePath;
    use std::path::PathBuf;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    fn reparse(source: &Source) -> Source {
        let text = SourceSerializer::serialize(source).unwrap();
        let root = SourceRoot::Directory(PathBuf::from("/m/hcm-config"));
        SourceParser::new(&root)
            .parse(source.path(), source.source_type(), &text)
            .unwrap()
    }

    #[test]
    fn test_serialize_simple_config() {
        let mut source = Source::new("main.yaml", SourceType::Config);
        let mut node = DefinitionNode::new(p("/content/foo"));
        node.add_property(DefinitionProperty::single("title", Value::string("bar")));
        node.add_property(DefinitionProperty::single(
            JCR_PRIMARY_TYPE,
            Value::text(ValueType::Name, "nt:unstructured"),
        ));
        source.add_config_definition(node);

        let text = SourceSerializer::serialize(&source).unwrap();
        assert_eq!(
            text,
            "definitions:\n  config:\n    /content/foo:\n      jcr:primaryType: nt:unstructured\n      title: bar\n"
        );
    }

    #[test]
    fn test_serialized_source_parses_back() {
        let mut source = Source::new("main.yaml", SourceType::Config);
        let mut node = DefinitionNode::new(p("/a"));
        node.add_property(DefinitionProperty::single(
            JCR_PRIMARY_TYPE,
            Value::text(ValueType::Name, "nt:unstructured"),
        ));
        node.add_property(DefinitionProperty::single("count", Value::long(7)));
        node.add_property(DefinitionProperty::single("numeric", Value::string("42")));
        node.add_property(DefinitionProperty::single("binary", Value::binary(vec![9, 8])));
        node.add_property(DefinitionProperty::single(
            "ref",
            Value::path_reference(ValueType::WeakReference, "/b"),
        ));
        node.add_property(DefinitionProperty::multiple("empty", ValueType::Long, vec![]));
        node.add_property(
            DefinitionProperty::multiple("more", ValueType::String, vec![Value::string("x")])
                .with_operation(PropertyOperation::Add),
        );
        node.add_property(DefinitionProperty::delete("gone"));
        node.add_property(DefinitionProperty::category_only(
            "status",
            ConfigurationItemCategory::Runtime,
        ));
        node.add_property(DefinitionProperty::single(
            "file",
            Value::resource(
                ValueType::Binary,
                ResourceRef::existing("file.bin", crate::model::ResourceOrigin::Inline(Default::default())),
            ),
        ));
        let mut first = DefinitionNode::new(p("/a/x"));
        first.add_property(DefinitionProperty::single(
            JCR_PRIMARY_TYPE,
            Value::text(ValueType::Name, "nt:unstructured"),
        ));
        node.add_node(first);
        node.add_node(DefinitionNode::delete_marker(p("/a/x[2]")));
        source.add_config_definition(node);

        let parsed = reparse(&source);
        let original = source.definitions()[0].root().unwrap();
        let round = parsed.definitions()[0].root().unwrap();
        for name in ["count", "numeric", "binary", "ref", "empty", "more", "gone", "status"] {
            assert_eq!(
                round.property(name),
                original.property(name),
                "property {} differs",
                name
            );
        }
        let file = round.property("file").unwrap();
        assert_eq!(file.value_type(), ValueType::Binary);
        assert_eq!(file.value().unwrap().resource_ref().unwrap().path, "file.bin");
        assert_eq!(round.nodes()[0].name().to_string(), "x[1]");
        assert!(round.nodes()[1].is_delete());
    }

    #[test]
    fn test_serialize_content_source() {
        let mut source = Source::new("content/a.yaml", SourceType::Content);
        let mut node = DefinitionNode::new(p("/content/a"));
        node.add_property(DefinitionProperty::single(
            JCR_PRIMARY_TYPE,
            Value::text(ValueType::Name, "hippostd:folder"),
        ));
        source.add_content_definition(node);
        let text = SourceSerializer::serialize(&source).unwrap();
        assert_eq!(text, "/content/a:\n  jcr:primaryType: hippostd:folder\n");
    }
}
