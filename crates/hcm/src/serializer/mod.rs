//! Writing modules back to their on-disk layout.

pub mod context;
pub mod resource;
pub mod source_serializer;
pub mod writer;

pub use context::{ModuleContext, ResourceNameResolver};
pub use resource::{
    FileResourceInputProvider, FileResourceOutputProvider, ResourceInputProvider,
    ResourceOutputProvider,
};
pub use source_serializer::SourceSerializer;
pub use writer::{AutoExportModuleWriter, FileConfigurationWriter, ModuleWriter};
