pub mod autoexport;
pub mod error;
pub mod model;
pub mod parser;
pub mod path;
pub mod repository;
pub mod serializer;

pub use autoexport::{
    AutoExportConfig, AutoExportError, Configuration, DefinitionMergeService, EventJournalProcessor,
    JournalScheduler, MergeError,
};
pub use error::{HcmError, ModelError, ParserError, PathError, RepositoryError, Result, WriteError};
pub use model::{ConfigurationModel, Module, ModuleKey};
pub use parser::{ArchiveConfigurationReader, PathConfigurationReader};
pub use path::{NodeName, NodePath};
pub use serializer::{AutoExportModuleWriter, FileConfigurationWriter, ModuleContext, ModuleWriter};
