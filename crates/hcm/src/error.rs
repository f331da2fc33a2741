use std::path::PathBuf;
use thiserror::Error;

use crate::autoexport::error::{AutoExportError, MergeError};

#[derive(Error, Debug)]
pub enum HcmError {
    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Auto-export error: {0}")]
    AutoExport(#[from] AutoExportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path must not be blank")]
    Blank,

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Node '{path}' defined in {origin} refers to a non-existing parent node")]
    MissingParent { path: String, origin: String },

    #[error("Node '{path}' defined in {origin} is new but has no jcr:primaryType")]
    MissingPrimaryType { path: String, origin: String },

    #[error("Node '{path}' in {origin} changes jcr:primaryType without 'operation: override'")]
    PrimaryTypeChange { path: String, origin: String },

    #[error("Property '{path}' in {origin} changes type or multiplicity without 'operation: override'")]
    PropertyTypeChange { path: String, origin: String },

    #[error("Property '{path}' in {origin} uses 'operation: add' on a single-valued property")]
    InvalidAdd { path: String, origin: String },

    #[error("Node '{path}' in {origin} is ordered before non-existing sibling '{target}'")]
    OrderBeforeTargetMissing {
        path: String,
        target: String,
        origin: String,
    },

    #[error("Namespace prefix '{prefix}' in {origin} is already defined in {existing}")]
    DuplicateNamespace {
        prefix: String,
        origin: String,
        existing: String,
    },

    #[error("Duplicate module '{0}'")]
    DuplicateModule(String),

    #[error("Circular 'after' dependency between {kind}s: {names}")]
    CircularDependency { kind: String, names: String },

    #[error("Invalid path: {0}")]
    Path(#[from] PathError),
}

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseYaml { path: String, message: String },

    #[error("Invalid content in '{path}': {message}")]
    InvalidStructure { path: String, message: String },

    #[error("Failed to read archive '{path}': {message}")]
    Archive { path: PathBuf, message: String },

    #[error("Module descriptor not found: {0}")]
    DescriptorNotFound(PathBuf),
}

impl ParserError {
    pub(crate) fn invalid(path: &str, message: impl Into<String>) -> Self {
        ParserError::InvalidStructure {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy resource from '{from}' to '{to}': {source}")]
    CopyResource {
        from: String,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize YAML for '{path}': {message}")]
    SerializeYaml { path: String, message: String },

    #[error("Could not find a free name for resource '{0}'")]
    NameExhausted(String),
}

#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Property '{path}' has an unexpected value type")]
    ValueType { path: String },

    #[error("Repository access failed: {0}")]
    Access(String),

    #[error("Event journal unavailable: {0}")]
    Journal(String),
}

pub type Result<T> = std::result::Result<T, HcmError>;
