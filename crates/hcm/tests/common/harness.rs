//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct provides a throwaway project directory holding
//! modules laid out the way a Maven project lays them out:
//! `<mvnPath>/src/main/resources/hcm-module.yaml` with `hcm-config/` and
//! `hcm-content/` next to it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use hcm::model::SourceType;
use hcm::parser::MODULE_DESCRIPTOR;
use hcm::{ConfigurationModel, Module, PathConfigurationReader};

pub const GROUP: &str = "hcm-test";
pub const PROJECT: &str = "site";

/// Test harness providing an isolated project root for integration tests.
pub struct TestHarness {
    /// Keeps the directory alive for the lifetime of the harness.
    temp_dir: TempDir,
    /// Root the module `mvnPath`s are relative to.
    pub project_root: PathBuf,
    /// Scratch directory outside the project, e.g. for write targets.
    pub scratch_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let project_root = temp_dir.path().join("project");
        let scratch_dir = temp_dir.path().join("scratch");
        fs::create_dir_all(&project_root).expect("Failed to create project directory");
        fs::create_dir_all(&scratch_dir).expect("Failed to create scratch directory");
        Self {
            temp_dir,
            project_root,
            scratch_dir,
        }
    }

    /// The directory holding the descriptor of the module at `mvn_path`.
    pub fn module_dir(&self, mvn_path: &str) -> PathBuf {
        self.project_root
            .join(mvn_path)
            .join("src")
            .join("main")
            .join("resources")
    }

    /// Writes a module descriptor; `after` lists modules this one is
    /// ordered after.
    pub fn create_module(&self, mvn_path: &str, name: &str, after: &[&str]) -> PathBuf {
        let module = if after.is_empty() {
            format!("module: {}\n", name)
        } else {
            format!("module:\n  name: {}\n  after: [{}]\n", name, after.join(", "))
        };
        let descriptor = format!("group: {}\nproject: {}\n{}", GROUP, PROJECT, module);
        let dir = self.module_dir(mvn_path);
        write_file(&dir.join(MODULE_DESCRIPTOR), descriptor.as_bytes());
        dir
    }

    pub fn write_config(&self, mvn_path: &str, source: &str, yaml: &str) {
        self.write_source(mvn_path, SourceType::Config, source, yaml);
    }

    pub fn write_content(&self, mvn_path: &str, source: &str, yaml: &str) {
        self.write_source(mvn_path, SourceType::Content, source, yaml);
    }

    pub fn write_source(&self, mvn_path: &str, source_type: SourceType, source: &str, yaml: &str) {
        write_file(&self.source_file(mvn_path, source_type, source), yaml.as_bytes());
    }

    /// Writes a resource file below the config or content root.
    pub fn write_resource(&self, mvn_path: &str, source_type: SourceType, path: &str, bytes: &[u8]) {
        write_file(&self.source_file(mvn_path, source_type, path), bytes);
    }

    pub fn source_file(&self, mvn_path: &str, source_type: SourceType, path: &str) -> PathBuf {
        self.module_dir(mvn_path).join(source_type.root_dir()).join(path)
    }

    pub fn read_source(&self, mvn_path: &str, source_type: SourceType, path: &str) -> String {
        let file = self.source_file(mvn_path, source_type, path);
        fs::read_to_string(&file).unwrap_or_else(|e| panic!("Failed to read {}: {}", file.display(), e))
    }

    pub fn exists(&self, mvn_path: &str, source_type: SourceType, path: &str) -> bool {
        self.source_file(mvn_path, source_type, path).is_file()
    }

    /// Reads every module of the project.
    pub fn read_modules(&self) -> Vec<Module> {
        read_modules(&self.project_root)
    }

    /// Builds the model of the project as it is on disk.
    pub fn baseline(&self) -> ConfigurationModel {
        ConfigurationModel::from_modules(self.read_modules()).expect("Project does not form a valid model")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn read_modules(root: &Path) -> Vec<Module> {
    PathConfigurationReader::with_project_root(root)
        .read_project()
        .expect("Failed to read project")
}

/// The module read from `mvn_path`.
pub fn find_module<'a>(modules: &'a [Module], mvn_path: &str) -> &'a Module {
    modules
        .iter()
        .find(|m| m.mvn_path() == Some(mvn_path))
        .unwrap_or_else(|| panic!("No module at {}", mvn_path))
}

fn write_file(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().expect("File has no parent")).expect("Failed to create directory");
    fs::write(path, bytes).expect("Failed to write file");
}
