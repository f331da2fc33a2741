//! Reading modules from disk and from archives.

pub mod archive_reader;
pub mod descriptor;
pub mod path_reader;
pub mod source_parser;

use std::path::PathBuf;

use crate::model::ResourceOrigin;

pub use archive_reader::ArchiveConfigurationReader;
pub use descriptor::{parse_action_lists, ModuleDescriptor};
pub use path_reader::PathConfigurationReader;
pub use source_parser::SourceParser;

pub const MODULE_DESCRIPTOR: &str = "hcm-module.yaml";
pub const ACTIONS_FILE: &str = "hcm-actions.yaml";

/// The location sources of one type are read from, used to turn resource
/// paths into [`ResourceOrigin`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRoot {
    /// A `hcm-config` or `hcm-content` directory.
    Directory(PathBuf),
    /// A `hcm-config/` or `hcm-content/` prefix inside an archive.
    Archive { archive: PathBuf, prefix: String },
}

impl SourceRoot {
    /// The origin of a resource given relative to this root.
    pub fn origin(&self, root_relative: &str) -> ResourceOrigin {
        match self {
            SourceRoot::Directory(dir) => {
                let mut path = dir.clone();
                for part in root_relative.split('/').filter(|p| !p.is_empty()) {
                    path.push(part);
                }
                ResourceOrigin::File(path)
            }
            SourceRoot::Archive { archive, prefix } => ResourceOrigin::Archive {
                archive: archive.clone(),
                entry: format!("{}{}", prefix, root_relative),
            },
        }
    }
}
