//! Auto-export error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::error::{ModelError, ParserError, PathError, RepositoryError, WriteError};

/// Internal-consistency failures of a merge pass. None of these are
/// recoverable; they abort the merge.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Module '{module}' defining '{path}' is not part of the merge")]
    ModuleNotInMerge { module: String, path: String },

    #[error("Cannot add node '{path}': parent '{parent}' does not exist")]
    MissingParent { path: String, parent: String },

    #[error("Definition {definition} referenced by '{path}' was not found in module '{module}'")]
    DefinitionNotFound {
        definition: String,
        module: String,
        path: String,
    },

    #[error("Cannot delete content '{path}': it is only defined by modules outside the merge")]
    UpstreamContentDelete { path: String },

    #[error("No module is mapped to '{0}' and no default module is configured")]
    NoModuleForPath(String),

    #[error("Changed node '{path}' does not exist in the configuration model")]
    NodeNotFound { path: String },

    #[error("Cannot rebuild configuration model: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid path: {0}")]
    Path(#[from] PathError),
}

/// Errors surfaced by the auto-export processor and its configuration.
#[derive(Error, Debug)]
pub enum AutoExportError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("Writing modules failed: {0}")]
    Write(#[from] WriteError),

    #[error("Reading modules failed: {0}")]
    Parser(#[from] ParserError),

    #[error("Failed to read config file '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid auto-export configuration: {0}")]
    Config(String),

    #[error("Export of the change set failed: {0}")]
    Export(String),

    #[error("Auto-export stopped after an earlier failure; restart it explicitly")]
    TaskFailed,
}

impl From<PathError> for AutoExportError {
    fn from(e: PathError) -> Self {
        AutoExportError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AutoExportError>;
