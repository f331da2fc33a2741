//! In-memory configuration model: modules, sources, definitions and the
//! merged node tree built from them.

mod builder;
pub mod category;
pub mod configuration;
pub mod definition;
pub mod module;
pub mod ordering;
pub mod source;
pub mod value;

pub use category::ConfigurationItemCategory;
pub use configuration::{
    ConfigurationModel, ConfigurationNode, ConfigurationProperty, ContentItem, DefinitionItemRef,
    NamespaceItem, NodeId,
};
pub use definition::{
    Definition, DefinitionBody, DefinitionId, DefinitionNode, DefinitionProperty, DefinitionType,
    NamespaceDefinition, PropertyKind, PropertyOperation, JCR_MIXIN_TYPES, JCR_PRIMARY_TYPE,
};
pub use module::{
    resource_root_path, ActionItem, ActionList, ActionType, Module, ModuleKey, ModuleLocation,
    RemovedResource,
};
pub use source::{Source, SourceType};
pub use value::{ResourceOrigin, ResourceRef, Scalar, Value, ValueKind, ValueType};
