//! Reads modules from a source tree on disk.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::descriptor::{parse_action_lists, ModuleDescriptor};
use super::source_parser::SourceParser;
use super::{SourceRoot, ACTIONS_FILE, MODULE_DESCRIPTOR};
use crate::error::ParserError;
use crate::model::{Module, ModuleLocation, SourceType};

const MAVEN_RESOURCES: &str = "src/main/resources";

/// Reads modules from directories holding an `hcm-module.yaml`.
pub struct PathConfigurationReader {
    /// Root of the project; used to derive each module's `mvn_path`.
    project_root: Option<PathBuf>,
}

impl PathConfigurationReader {
    /// Creates a reader for explicit descriptor paths; modules read this way
    /// have no `mvnPath`.
    pub fn new() -> Self {
        Self { project_root: None }
    }

    /// Creates a reader for the modules below `project_root`.
    pub fn with_project_root(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: Some(project_root.into()),
        }
    }

    /// Finds every module descriptor below `root`, skipping hidden
    /// directories and build output.
    pub fn discover(root: &Path) -> Result<Vec<PathBuf>, ParserError> {
        if !root.is_dir() {
            return Err(ParserError::ReadDirectory {
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }
        let mut descriptors = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !e
                        .file_name()
                        .to_str()
                        .map(|s| s.starts_with('.') || s == "target" || s == "node_modules")
                        .unwrap_or(false)
            });
        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && entry.file_name() == MODULE_DESCRIPTOR {
                descriptors.push(entry.path().to_path_buf());
            }
        }
        Ok(descriptors)
    }

    /// Reads every module below the project root.
    pub fn read_project(&self) -> Result<Vec<Module>, ParserError> {
        let Some(root) = &self.project_root else {
            return Ok(Vec::new());
        };
        let mut modules = Vec::new();
        for descriptor in Self::discover(root)? {
            modules.push(self.read_module(&descriptor)?);
        }
        log::info!("Read {} modules from {}", modules.len(), root.display());
        Ok(modules)
    }

    /// Reads the module described by the given `hcm-module.yaml`.
    pub fn read_module(&self, descriptor_path: &Path) -> Result<Module, ParserError> {
        if !descriptor_path.is_file() {
            return Err(ParserError::DescriptorNotFound(descriptor_path.to_path_buf()));
        }
        let module_dir = descriptor_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let text = read_to_string(descriptor_path)?;
        let descriptor = ModuleDescriptor::parse(&descriptor_path.display().to_string(), &text)?;
        let mut module = descriptor.to_module();
        module.set_location(ModuleLocation::Directory(module_dir.clone()));
        module.set_mvn_path(self.mvn_path(&module_dir));

        let actions_path = module_dir.join(ACTIONS_FILE);
        if actions_path.is_file() {
            let text = read_to_string(&actions_path)?;
            module.set_action_lists(parse_action_lists(
                &actions_path.display().to_string(),
                &text,
            )?);
        }

        for source_type in [SourceType::Config, SourceType::Content] {
            let dir = module_dir.join(source_type.root_dir());
            if dir.is_dir() {
                self.read_sources(&mut module, &dir, source_type)?;
            }
        }

        log::debug!(
            "Read module {} with {} sources from {}",
            module.key(),
            module.sources().len(),
            module_dir.display()
        );
        Ok(module)
    }

    fn read_sources(&self, module: &mut Module, dir: &Path, source_type: SourceType) -> Result<(), ParserError> {
        let root = SourceRoot::Directory(dir.to_path_buf());
        let parser = SourceParser::new(&root);

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let hidden = relative.components().any(|c| {
                c.as_os_str()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false)
            });
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if hidden || ext != "yaml" {
                continue;
            }

            let source_path = to_slash_path(relative);
            let text = read_to_string(path)?;
            let source = parser.parse(&source_path, source_type, &text)?;
            module.add_source(source);
        }
        Ok(())
    }

    fn mvn_path(&self, module_dir: &Path) -> Option<String> {
        let root = self.project_root.as_ref()?;
        let relative = module_dir.strip_prefix(root).ok()?;
        let mut path = to_slash_path(relative);
        if path == MAVEN_RESOURCES {
            path.clear();
        } else if let Some(stripped) = path.strip_suffix(&format!("/{}", MAVEN_RESOURCES)) {
            path = stripped.to_string();
        }
        Some(path)
    }
}

impl Default for PathConfigurationReader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_to_string(path: &Path) -> Result<String, ParserError> {
    fs::read_to_string(path).map_err(|e| ParserError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

pub(crate) fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn create_module(root: &Path, dir: &str, name: &str) -> PathBuf {
        let module_dir = root.join(dir);
        write(
            &module_dir.join(MODULE_DESCRIPTOR),
            &format!("group: g\nproject: p\nmodule: {}\n", name),
        );
        write(
            &module_dir.join("hcm-config/main.yaml"),
            "definitions:\n  config:\n    /a:\n      jcr:primaryType: nt:unstructured\n",
        );
        write(&module_dir.join("hcm-config/data.txt"), "not a source");
        write(&module_dir.join("hcm-config/.hidden/skip.yaml"), "broken: [");
        write(
            &module_dir.join("hcm-content/content/a.yaml"),
            "/content/a:\n  jcr:primaryType: nt:unstructured\n",
        );
        module_dir
    }

    #[test]
    fn test_read_module() {
        let temp = TempDir::new().unwrap();
        let dir = create_module(temp.path(), "repository-data/application/src/main/resources", "app");

        let reader = PathConfigurationReader::with_project_root(temp.path());
        let module = reader.read_module(&dir.join(MODULE_DESCRIPTOR)).unwrap();

        assert_eq!(module.name(), "app");
        assert_eq!(module.mvn_path(), Some("repository-data/application"));
        assert_eq!(module.sources().len(), 2);
        assert!(module.source(SourceType::Config, "main.yaml").is_some());
        assert!(module.source(SourceType::Content, "content/a.yaml").is_some());
    }

    #[test]
    fn test_discover_skips_hidden_and_target() {
        let temp = TempDir::new().unwrap();
        create_module(temp.path(), "one", "one");
        create_module(temp.path(), "two/src/main/resources", "two");
        create_module(temp.path(), "target/classes", "copied");
        create_module(temp.path(), ".git/x", "hidden");

        let found = PathConfigurationReader::discover(temp.path()).unwrap();
        assert_eq!(found.len(), 2);

        let modules = PathConfigurationReader::with_project_root(temp.path())
            .read_project()
            .unwrap();
        let names: Vec<&str> = modules.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn test_missing_descriptor() {
        let temp = TempDir::new().unwrap();
        let result = PathConfigurationReader::new().read_module(&temp.path().join(MODULE_DESCRIPTOR));
        assert!(matches!(result, Err(ParserError::DescriptorNotFound(_))));
    }
}
