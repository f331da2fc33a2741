//! Reading and writing resource and source files of one module.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::WriteError;
use crate::model::{ResourceOrigin, SourceType};

/// Opens resource content wherever it currently lives.
pub trait ResourceInputProvider {
    fn open(&self, origin: &ResourceOrigin) -> std::io::Result<Box<dyn Read + Send>>;

    /// The on-disk file backing `origin`, when there is one.
    fn file_path(&self, origin: &ResourceOrigin) -> Option<PathBuf>;
}

/// Writes the files of one module below its config and content roots.
pub trait ResourceOutputProvider {
    /// Absolute output path of a root-relative file.
    fn path_for(&self, source_type: SourceType, root_relative: &str) -> PathBuf;

    fn write(&self, source_type: SourceType, root_relative: &str, content: &mut dyn Read) -> Result<PathBuf, WriteError>;

    /// Removes a file; a missing file is not an error.
    fn remove(&self, source_type: SourceType, root_relative: &str) -> Result<(), WriteError>;
}

#[derive(Debug, Clone, Default)]
pub struct FileResourceInputProvider;

impl ResourceInputProvider for FileResourceInputProvider {
    fn open(&self, origin: &ResourceOrigin) -> std::io::Result<Box<dyn Read + Send>> {
        origin.open()
    }

    fn file_path(&self, origin: &ResourceOrigin) -> Option<PathBuf> {
        origin.file_path().map(Path::to_path_buf)
    }
}

/// Writes below `<module>/hcm-config` and `<module>/hcm-content`.
#[derive(Debug, Clone)]
pub struct FileResourceOutputProvider {
    module_root: PathBuf,
}

impl FileResourceOutputProvider {
    /// Creates a provider writing below `module_root`.
    pub fn new(module_root: impl Into<PathBuf>) -> Self {
        Self {
            module_root: module_root.into(),
        }
    }

    pub fn module_root(&self) -> &Path {
        &self.module_root
    }

    pub fn root(&self, source_type: SourceType) -> PathBuf {
        self.module_root.join(source_type.root_dir())
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), WriteError> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| WriteError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl ResourceOutputProvider for FileResourceOutputProvider {
    fn path_for(&self, source_type: SourceType, root_relative: &str) -> PathBuf {
        let mut path = self.root(source_type);
        for part in root_relative.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Writes to a sibling temporary file first and renames it into place,
    /// so readers never see a half-written file.
    fn write(&self, source_type: SourceType, root_relative: &str, content: &mut dyn Read) -> Result<PathBuf, WriteError> {
        let target = self.path_for(source_type, root_relative);
        if let Some(parent) = target.parent() {
            self.ensure_directory(parent)?;
        }

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("resource");
        let temp = target.with_file_name(format!(".{}.tmp", file_name));
        let write_err = |e: std::io::Error| WriteError::WriteFile {
            path: target.clone(),
            source: e,
        };

        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)
                .map_err(write_err)?;
            std::io::copy(content, &mut file).map_err(write_err)?;
            file.flush().map_err(write_err)?;
        }
        fs::rename(&temp, &target).map_err(write_err)?;
        Ok(target)
    }

    fn remove(&self, source_type: SourceType, root_relative: &str) -> Result<(), WriteError> {
        let path = self.path_for(source_type, root_relative);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WriteError::RemoveFile { path, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_directories() {
        let temp = TempDir::new().unwrap();
        let output = FileResourceOutputProvider::new(temp.path());
        let path = output
            .write(SourceType::Config, "a/b/c.txt", &mut Cursor::new(b"hello".to_vec()))
            .unwrap();
        assert_eq!(path, temp.path().join("hcm-config/a/b/c.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert!(!temp.path().join("hcm-config/a/b/.c.txt.tmp").exists());
    }

    #[test]
    fn test_write_overwrites() {
        let temp = TempDir::new().unwrap();
        let output = FileResourceOutputProvider::new(temp.path());
        output
            .write(SourceType::Content, "x.yaml", &mut Cursor::new(b"one".to_vec()))
            .unwrap();
        let path = output
            .write(SourceType::Content, "x.yaml", &mut Cursor::new(b"two".to_vec()))
            .unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "two");
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        let output = FileResourceOutputProvider::new(temp.path());
        assert!(output.remove(SourceType::Config, "nope.txt").is_ok());
    }
}
