//! Reads modules packaged in zip or jar archives.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use super::descriptor::{parse_action_lists, ModuleDescriptor};
use super::source_parser::SourceParser;
use super::{SourceRoot, ACTIONS_FILE, MODULE_DESCRIPTOR};
use crate::error::ParserError;
use crate::model::{Module, ModuleLocation, SourceType};

/// Reads every module found in an archive.
///
/// The archive is opened for the duration of the call only; resource values
/// point back into it and reopen it when read.
pub struct ArchiveConfigurationReader {
    archive: PathBuf,
}

impl ArchiveConfigurationReader {
    /// Creates a reader for the zip or jar file at `archive`.
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
        }
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Reads every module whose descriptor is inside the archive.
    pub fn read(&self) -> Result<Vec<Module>, ParserError> {
        let file = File::open(&self.archive).map_err(|e| ParserError::ReadFile {
            path: self.archive.clone(),
            source: e,
        })?;
        let mut zip = ZipArchive::new(file).map_err(|e| self.error(e))?;

        let mut names: Vec<String> = zip.file_names().map(String::from).collect();
        names.sort();

        let prefixes: Vec<String> = names
            .iter()
            .filter_map(|n| {
                if n == MODULE_DESCRIPTOR {
                    Some(String::new())
                } else {
                    n.strip_suffix(&format!("/{}", MODULE_DESCRIPTOR))
                        .map(|p| format!("{}/", p))
                }
            })
            .collect();

        let mut modules = Vec::new();
        for prefix in prefixes {
            modules.push(self.read_module(&mut zip, &names, &prefix)?);
        }
        log::info!(
            "Read {} modules from archive {}",
            modules.len(),
            self.archive.display()
        );
        Ok(modules)
    }

    fn read_module(
        &self,
        zip: &mut ZipArchive<File>,
        names: &[String],
        prefix: &str,
    ) -> Result<Module, ParserError> {
        let descriptor_entry = format!("{}{}", prefix, MODULE_DESCRIPTOR);
        let text = self.read_entry(zip, &descriptor_entry)?;
        let descriptor = ModuleDescriptor::parse(&self.describe(&descriptor_entry), &text)?;
        let mut module = descriptor.to_module();
        module.set_location(ModuleLocation::Archive {
            archive: self.archive.clone(),
            prefix: prefix.to_string(),
        });

        let actions_entry = format!("{}{}", prefix, ACTIONS_FILE);
        if names.contains(&actions_entry) {
            let text = self.read_entry(zip, &actions_entry)?;
            module.set_action_lists(parse_action_lists(&self.describe(&actions_entry), &text)?);
        }

        for source_type in [SourceType::Config, SourceType::Content] {
            let root_prefix = format!("{}{}/", prefix, source_type.root_dir());
            let root = SourceRoot::Archive {
                archive: self.archive.clone(),
                prefix: root_prefix.clone(),
            };
            let parser = SourceParser::new(&root);
            for name in names {
                let Some(relative) = name.strip_prefix(&root_prefix) else {
                    continue;
                };
                let hidden = relative.split('/').any(|s| s.starts_with('.'));
                if hidden || relative.ends_with('/') || !relative.ends_with(".yaml") {
                    continue;
                }
                let text = self.read_entry(zip, name)?;
                module.add_source(parser.parse(relative, source_type, &text)?);
            }
        }
        Ok(module)
    }

    fn read_entry(&self, zip: &mut ZipArchive<File>, name: &str) -> Result<String, ParserError> {
        let mut entry = zip.by_name(name).map_err(|e| self.error(e))?;
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|e| ParserError::ReadFile {
                path: PathBuf::from(self.describe(name)),
                source: e,
            })?;
        Ok(text)
    }

    fn describe(&self, entry: &str) -> String {
        format!("{}!/{}", self.archive.display(), entry)
    }

    fn error(&self, e: impl std::fmt::Display) -> ParserError {
        ParserError::Archive {
            path: self.archive.clone(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn create_archive(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_read_archive_modules() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("app.jar");
        create_archive(
            &archive,
            &[
                ("hcm-module.yaml", "group: g\nproject: p\nmodule: root\n"),
                (
                    "hcm-config/main.yaml",
                    "definitions:\n  config:\n    /a:\n      jcr:primaryType: nt:unstructured\n      text:\n        resource: text.txt\n",
                ),
                ("hcm-config/text.txt", "hello"),
                ("nested/hcm-module.yaml", "group: g\nproject: p\nmodule: nested\n"),
                ("nested/hcm-actions.yaml", "action-lists:\n- 1.0:\n    /content/a: reload\n"),
            ],
        );

        let modules = ArchiveConfigurationReader::new(&archive).read().unwrap();
        assert_eq!(modules.len(), 2);
        let root = modules.iter().find(|m| m.name() == "root").unwrap();
        assert_eq!(root.sources().len(), 1);
        let nested = modules.iter().find(|m| m.name() == "nested").unwrap();
        assert_eq!(nested.action_lists().len(), 1);

        let definition = &root.sources()[0].definitions()[0];
        let value = definition.root().unwrap().property("text").unwrap().value().unwrap();
        let mut text = String::new();
        value
            .resource_ref()
            .unwrap()
            .origin
            .open()
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_missing_archive() {
        let temp = TempDir::new().unwrap();
        let result = ArchiveConfigurationReader::new(temp.path().join("missing.jar")).read();
        assert!(matches!(result, Err(ParserError::ReadFile { .. })));
    }
}
