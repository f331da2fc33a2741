//! Parses config and content source files.
//!
//! Config sources:
//!
//! ```yaml
//! definitions:
//!   namespace:
//!     myproject:
//!       uri: http://www.example.com/myproject/nt/1.0
//!       cnd: myproject.cnd
//!   config:
//!     /hippo:configuration/hippo:queries:
//!       jcr:primaryType: hipposys:queryfolder
//!       /new-document:
//!         jcr:primaryType: hippostd:templatequery
//! ```
//!
//! Content sources hold a single `/path: node` mapping.

use base64::Engine;
use chrono::DateTime;
use serde_yaml::{Mapping, Value as Yaml};

use super::SourceRoot;
use crate::error::ParserError;
use crate::model::{
    resource_root_path, ConfigurationItemCategory, Definition, DefinitionNode, DefinitionProperty,
    NamespaceDefinition, PropertyKind, PropertyOperation, ResourceRef, Scalar, Source, SourceType,
    Value, ValueKind, ValueType, JCR_MIXIN_TYPES, JCR_PRIMARY_TYPE,
};
use crate::path::{NodeName, NodePath};

pub const META_DELETE: &str = ".meta:delete";
pub const META_ORDER_BEFORE: &str = ".meta:order-before";
pub const META_IGNORE_REORDERED_CHILDREN: &str = ".meta:ignore-reordered-children";
pub const META_CATEGORY: &str = ".meta:category";
pub const META_RESIDUAL_CHILD_NODE_CATEGORY: &str = ".meta:residual-child-node-category";

/// Parses source files found below one [`SourceRoot`].
pub struct SourceParser<'a> {
    root: &'a SourceRoot,
}

impl<'a> SourceParser<'a> {
    /// Creates a parser resolving resources against `root`.
    pub fn new(root: &'a SourceRoot) -> Self {
        Self { root }
    }

    /// Parses `text` as the source at `source_path` (relative to the root).
    pub fn parse(&self, source_path: &str, source_type: SourceType, text: &str) -> Result<Source, ParserError> {
        let yaml: Yaml = serde_yaml::from_str(text).map_err(|e| ParserError::ParseYaml {
            path: source_path.to_string(),
            message: e.to_string(),
        })?;

        let context = ParseContext {
            root: self.root,
            source_path,
        };
        let mut source = Source::new(source_path, source_type);
        if yaml.is_null() {
            return Ok(source);
        }
        let top = context.mapping(&yaml, "source")?;

        match source_type {
            SourceType::Config => {
                let definitions = match top.get("definitions") {
                    Some(value) => context.mapping(value, "definitions")?,
                    None => return Err(ParserError::invalid(source_path, "missing 'definitions'")),
                };
                for (key, value) in definitions {
                    match context.key(key)? {
                        "namespace" => {
                            for namespace in context.namespaces(value)? {
                                source.push_loaded(Definition::namespace(namespace));
                            }
                        }
                        "config" => {
                            for node in context.roots(value)? {
                                source.push_loaded(Definition::config(node));
                            }
                        }
                        other => {
                            return Err(ParserError::invalid(
                                source_path,
                                format!("unknown definition type '{}'", other),
                            ))
                        }
                    }
                }
            }
            SourceType::Content => {
                let roots = context.roots(&yaml)?;
                if roots.len() != 1 {
                    return Err(ParserError::invalid(
                        source_path,
                        "a content source must define exactly one root node",
                    ));
                }
                for node in roots {
                    source.push_loaded(Definition::content(node));
                }
            }
        }
        Ok(source)
    }
}

struct ParseContext<'a> {
    root: &'a SourceRoot,
    source_path: &'a str,
}

impl<'a> ParseContext<'a> {
    fn error(&self, message: impl Into<String>) -> ParserError {
        ParserError::invalid(self.source_path, message)
    }

    fn mapping<'y>(&self, value: &'y Yaml, what: &str) -> Result<&'y Mapping, ParserError> {
        value
            .as_mapping()
            .ok_or_else(|| self.error(format!("{} must be a mapping", what)))
    }

    fn key<'y>(&self, key: &'y Yaml) -> Result<&'y str, ParserError> {
        key.as_str()
            .ok_or_else(|| self.error(format!("keys must be strings, found {:?}", key)))
    }

    fn string(&self, value: &Yaml, what: &str) -> Result<String, ParserError> {
        match value {
            Yaml::String(s) => Ok(s.clone()),
            Yaml::Number(n) => Ok(n.to_string()),
            Yaml::Bool(b) => Ok(b.to_string()),
            _ => Err(self.error(format!("{} must be a scalar", what))),
        }
    }

    fn bool(&self, value: &Yaml, what: &str) -> Result<bool, ParserError> {
        value
            .as_bool()
            .ok_or_else(|| self.error(format!("{} must be a boolean", what)))
    }

    fn category(&self, value: &Yaml, what: &str) -> Result<ConfigurationItemCategory, ParserError> {
        self.string(value, what)?
            .parse()
            .map_err(|e: String| self.error(e))
    }

    fn namespaces(&self, value: &Yaml) -> Result<Vec<NamespaceDefinition>, ParserError> {
        let mut result = Vec::new();
        for (prefix, body) in self.mapping(value, "namespace")? {
            let prefix = self.key(prefix)?.to_string();
            let body = self.mapping(body, &format!("namespace '{}'", prefix))?;
            let uri = body
                .get("uri")
                .ok_or_else(|| self.error(format!("namespace '{}' has no uri", prefix)))?;
            let cnd = match body.get("cnd") {
                Some(cnd) => Some(self.resource_value(ValueType::String, cnd)?),
                None => None,
            };
            result.push(NamespaceDefinition {
                prefix,
                uri: self.string(uri, "uri")?,
                cnd,
            });
        }
        Ok(result)
    }

    fn roots(&self, value: &Yaml) -> Result<Vec<DefinitionNode>, ParserError> {
        let mut result = Vec::new();
        for (key, body) in self.mapping(value, "definition roots")? {
            let key = self.key(key)?;
            if !key.starts_with('/') {
                return Err(self.error(format!("root path '{}' must be absolute", key)));
            }
            let path = NodePath::parse(key).map_err(|e| self.error(e.to_string()))?;
            result.push(self.node(path, body)?);
        }
        Ok(result)
    }

    fn node(&self, path: NodePath, value: &Yaml) -> Result<DefinitionNode, ParserError> {
        let mut node = DefinitionNode::new(path.clone());
        if value.is_null() {
            return Ok(node);
        }
        for (key, body) in self.mapping(value, &format!("node '{}'", path))? {
            let key = self.key(key)?;
            match key {
                META_DELETE => node.set_delete(self.bool(body, key)?),
                META_ORDER_BEFORE => node.set_order_before(Some(self.string(body, key)?)),
                META_IGNORE_REORDERED_CHILDREN => {
                    node.set_ignore_reordered_children(Some(self.bool(body, key)?))
                }
                META_CATEGORY => node.set_category(Some(self.category(body, key)?)),
                META_RESIDUAL_CHILD_NODE_CATEGORY => {
                    node.set_residual_child_node_category(Some(self.category(body, key)?))
                }
                _ if key.starts_with('/') => {
                    let name = NodeName::parse(&key[1..]).map_err(|e| self.error(e.to_string()))?;
                    let child = self.node(path.resolve_name(&name), body)?;
                    node.add_node(child);
                }
                _ if key.starts_with(".meta:") => {
                    return Err(self.error(format!("unknown meta key '{}' at '{}'", key, path)));
                }
                _ => {
                    node.add_property(self.property(key, body)?);
                }
            }
        }
        if node.is_delete() && (!node.nodes().is_empty() || !node.properties().is_empty()) {
            return Err(self.error(format!(
                "node '{}' is deleted but also defines content",
                path
            )));
        }
        Ok(node)
    }

    fn property(&self, name: &str, value: &Yaml) -> Result<DefinitionProperty, ParserError> {
        match value {
            Yaml::Mapping(map) => self.complex_property(name, map),
            Yaml::Sequence(items) => {
                let values = items
                    .iter()
                    .map(|item| self.implicit_value(name, item))
                    .collect::<Result<Vec<_>, _>>()?;
                let value_type = values
                    .first()
                    .map(|v| v.value_type())
                    .unwrap_or_else(|| implicit_text_type(name));
                if values.iter().any(|v| v.value_type() != value_type) {
                    return Err(self.error(format!(
                        "property '{}' mixes values of different types",
                        name
                    )));
                }
                Ok(DefinitionProperty::multiple(name, value_type, values).with_kind(list_kind(name)))
            }
            Yaml::Null => Err(self.error(format!("property '{}' has no value", name))),
            _ => Ok(DefinitionProperty::single(name, self.implicit_value(name, value)?)),
        }
    }

    fn complex_property(&self, name: &str, map: &Mapping) -> Result<DefinitionProperty, ParserError> {
        let operation = match map.get("operation") {
            Some(op) => self
                .string(op, "operation")?
                .parse::<PropertyOperation>()
                .map_err(|e| self.error(e))?,
            None => PropertyOperation::Replace,
        };
        let category = match map.get(META_CATEGORY) {
            Some(c) => Some(self.category(c, META_CATEGORY)?),
            None => None,
        };
        let explicit_type = match map.get("type") {
            Some(t) => Some(
                self.string(t, "type")?
                    .parse::<ValueType>()
                    .map_err(|e| self.error(e))?,
            ),
            None => None,
        };

        for key in map.keys() {
            let key = self.key(key)?;
            if !matches!(
                key,
                "type" | "operation" | "value" | "resource" | "path" | META_CATEGORY
            ) {
                return Err(self.error(format!("unknown key '{}' in property '{}'", key, name)));
            }
        }

        if operation == PropertyOperation::Delete {
            let mut property = DefinitionProperty::delete(name);
            property.set_category(category);
            return Ok(property);
        }

        let (body, form) = match (map.get("value"), map.get("resource"), map.get("path")) {
            (Some(v), None, None) => (v, ValueForm::Literal),
            (None, Some(r), None) => (r, ValueForm::Resource),
            (None, None, Some(p)) => (p, ValueForm::Path),
            (None, None, None) => {
                if let Some(category) = category {
                    return Ok(DefinitionProperty::category_only(name, category));
                }
                return Err(self.error(format!("property '{}' has no value", name)));
            }
            _ => {
                return Err(self.error(format!(
                    "property '{}' must use exactly one of 'value', 'resource' or 'path'",
                    name
                )))
            }
        };

        let value_type = explicit_type.unwrap_or(match form {
            ValueForm::Path => ValueType::Reference,
            ValueForm::Resource => ValueType::String,
            ValueForm::Literal => match body {
                Yaml::Sequence(items) => items
                    .first()
                    .map(|item| implicit_type(name, item))
                    .unwrap_or_else(|| implicit_text_type(name)),
                other => implicit_type(name, other),
            },
        });

        let convert = |item: &Yaml| -> Result<Value, ParserError> {
            match form {
                ValueForm::Literal => self.typed_value(value_type, item),
                ValueForm::Resource => self.resource_value(value_type, item),
                ValueForm::Path => Ok(Value::path_reference(value_type, self.string(item, "path")?)),
            }
        };

        let mut property = match body {
            Yaml::Sequence(items) => {
                let values = items.iter().map(convert).collect::<Result<Vec<_>, _>>()?;
                DefinitionProperty::multiple(name, value_type, values).with_kind(list_kind(name))
            }
            other => DefinitionProperty::single(name, convert(other)?),
        };
        property.set_operation(operation);
        property.set_category(category);
        Ok(property)
    }

    fn implicit_value(&self, name: &str, value: &Yaml) -> Result<Value, ParserError> {
        self.typed_value(implicit_type(name, value), value)
    }

    fn typed_value(&self, value_type: ValueType, value: &Yaml) -> Result<Value, ParserError> {
        let scalar = match value_type {
            ValueType::Long => match value {
                Yaml::Number(n) => n.as_i64().map(Scalar::Long),
                Yaml::String(s) => s.trim().parse().ok().map(Scalar::Long),
                _ => None,
            },
            ValueType::Double => match value {
                Yaml::Number(n) => n.as_f64().map(Scalar::Double),
                Yaml::String(s) => s.trim().parse().ok().map(Scalar::Double),
                _ => None,
            },
            ValueType::Boolean => match value {
                Yaml::Bool(b) => Some(Scalar::Boolean(*b)),
                Yaml::String(s) => s.trim().parse().ok().map(Scalar::Boolean),
                _ => None,
            },
            ValueType::Date => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(Scalar::Date),
            ValueType::Binary => value.as_str().and_then(|s| {
                base64::engine::general_purpose::STANDARD
                    .decode(s.trim())
                    .ok()
                    .map(Scalar::Binary)
            }),
            _ => Some(Scalar::Text(self.string(value, "value")?)),
        };
        let scalar = scalar.ok_or_else(|| {
            self.error(format!("{:?} is not a valid {} value", value, value_type))
        })?;
        Ok(Value::new(value_type, ValueKind::Literal(scalar)))
    }

    fn resource_value(&self, value_type: ValueType, value: &Yaml) -> Result<Value, ParserError> {
        let path = self.string(value, "resource")?;
        if path.trim().is_empty() {
            return Err(self.error("resource path must not be blank"));
        }
        let origin = self.root.origin(&resource_root_path(self.source_path, &path));
        Ok(Value::resource(value_type, ResourceRef::existing(path, origin)))
    }
}

#[derive(Clone, Copy)]
enum ValueForm {
    Literal,
    Resource,
    Path,
}

fn implicit_text_type(name: &str) -> ValueType {
    if name == JCR_PRIMARY_TYPE || name == JCR_MIXIN_TYPES {
        ValueType::Name
    } else {
        ValueType::String
    }
}

fn implicit_type(name: &str, value: &Yaml) -> ValueType {
    match value {
        Yaml::Bool(_) => ValueType::Boolean,
        Yaml::Number(n) if n.is_f64() => ValueType::Double,
        Yaml::Number(_) => ValueType::Long,
        _ => implicit_text_type(name),
    }
}

fn list_kind(name: &str) -> PropertyKind {
    if name == JCR_MIXIN_TYPES {
        PropertyKind::Set
    } else {
        PropertyKind::List
    }
}
