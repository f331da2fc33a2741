//! Auto-export: turning repository changes back into module files.
//!
//! This module provides:
//! - The persisted on/off switch and last exported revision
//! - Settings for module routing, exclusions and timing
//! - A debounced processor over the repository event journal
//! - The merge service folding changed definitions into existing modules

pub mod change_log;
pub mod configuration;
pub mod error;
pub mod location_mapper;
pub mod merge;
pub mod module_mapping;
pub mod processor;
pub mod scheduler;
pub mod settings;

pub use change_log::ChangeLog;
pub use configuration::Configuration;
pub use error::{AutoExportError, MergeError};
pub use merge::DefinitionMergeService;
pub use module_mapping::{ModuleMapping, ModuleMappingTable};
pub use processor::{
    ChangeDiff, ChangeExporter, EventJournalProcessor, ModuleExporter, PollOutcome, ProcessorState,
    ProcessorStatus,
};
pub use scheduler::JournalScheduler;
pub use settings::{AutoExportConfig, ModuleConfig, ModuleMappings};
