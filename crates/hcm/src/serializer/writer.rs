//! Writes modules back to disk.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use tracing::info_span;

use super::context::ModuleContext;
use super::resource::{ResourceInputProvider, ResourceOutputProvider};
use super::source_serializer::SourceSerializer;
use crate::error::WriteError;
use crate::model::{resource_root_path, Module, ModuleLocation, ResourceOrigin};
use crate::parser::descriptor::{action_lists_to_yaml, ModuleDescriptor};

/// Writes the sources and resources of a module through a [`ModuleContext`].
#[derive(Debug, Clone, Default)]
pub struct ModuleWriter {
    skip_unchanged: bool,
}

impl ModuleWriter {
    /// Creates a writer that writes every source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `module`. New resources get their final names, removed sources
    /// and unreferenced removed resources are deleted, and every written
    /// source is marked unchanged afterwards.
    pub fn write_module(&self, module: &mut Module, context: &mut ModuleContext) -> Result<(), WriteError> {
        let span = info_span!("write_module", module = %module.key());
        let _enter = span.enter();

        context.add_existing_files_to_known_list(module);

        for (source_type, path) in module.removed_sources().to_vec() {
            log::info!("Deleting source {}/{}", source_type.root_dir(), path);
            context.output_provider().remove(source_type, &path)?;
        }

        let mut written = 0;
        for index in 0..module.sources().len() {
            let source = &module.sources()[index];
            if self.skip_unchanged && !source.has_changed() {
                continue;
            }
            let source_type = source.source_type();
            let source_path = source.path().to_string();

            self.assign_new_resource_names(module, index, context)?;
            self.copy_resources(module, index, context)?;

            let source = &module.sources()[index];
            let text = SourceSerializer::serialize(source)?;
            context
                .output_provider()
                .write(source_type, &source_path, &mut Cursor::new(text.into_bytes()))?;
            module.sources_mut()[index].mark_saved();
            written += 1;
        }

        for removed in module.removed_resources().to_vec() {
            if module.references_resource(&removed) {
                continue;
            }
            log::info!(
                "Deleting resource {}/{}",
                removed.source_type.root_dir(),
                removed.path
            );
            context
                .output_provider()
                .remove(removed.source_type, &removed.path)?;
        }
        module.clear_removals();

        log::debug!("Wrote {} sources of module {}", written, module.key());
        Ok(())
    }

    /// Gives every new resource of a source a collision-free name.
    fn assign_new_resource_names(
        &self,
        module: &mut Module,
        index: usize,
        context: &mut ModuleContext,
    ) -> Result<(), WriteError> {
        let source = &mut module.sources_mut()[index];
        let source_type = source.source_type();
        let source_path = source.path().to_string();
        let resolver = context.name_resolver(source_type);

        let mut result = Ok(());
        for definition in source.definitions_mut() {
            definition.visit_values_mut(&mut |value| {
                if result.is_err() {
                    return;
                }
                if let Some(resource) = value.resource_ref_mut() {
                    if !resource.is_new {
                        return;
                    }
                    let requested = resource_root_path(&source_path, &resource.path);
                    match resolver.generate(&requested) {
                        Ok(name) => resource.path = relative_to_source(&source_path, &name),
                        Err(e) => result = Err(e),
                    }
                }
            });
        }
        result
    }

    /// Streams the resources of a source to their output location, unless
    /// they already live there.
    fn copy_resources(&self, module: &mut Module, index: usize, context: &ModuleContext) -> Result<(), WriteError> {
        let source = &mut module.sources_mut()[index];
        let source_type = source.source_type();
        let source_path = source.path().to_string();
        let input = context.input_provider();
        let output = context.output_provider();

        let mut result = Ok(());
        for definition in source.definitions_mut() {
            definition.visit_values_mut(&mut |value| {
                if result.is_err() {
                    return;
                }
                let Some(resource) = value.resource_ref_mut() else {
                    return;
                };
                let root_relative = resource_root_path(&source_path, &resource.path);
                let destination = output.path_for(source_type, &root_relative);
                if let Some(current) = input.file_path(&resource.origin) {
                    if same_file(&current, &destination) {
                        resource.is_new = false;
                        return;
                    }
                }
                let copied = input
                    .open(&resource.origin)
                    .map_err(|e| WriteError::CopyResource {
                        from: resource.origin.describe(),
                        to: destination.clone(),
                        source: e,
                    })
                    .and_then(|mut reader| output.write(source_type, &root_relative, &mut reader));
                match copied {
                    Ok(path) => {
                        resource.origin = ResourceOrigin::File(path);
                        resource.is_new = false;
                    }
                    Err(e) => result = Err(e),
                }
            });
        }
        result
    }
}

/// Writes only the sources that changed since they were read.
#[derive(Debug, Clone)]
pub struct AutoExportModuleWriter {
    inner: ModuleWriter,
}

impl AutoExportModuleWriter {
    /// Creates a writer that skips unchanged sources.
    pub fn new() -> Self {
        Self {
            inner: ModuleWriter {
                skip_unchanged: true,
            },
        }
    }

    pub fn write_module(&self, module: &mut Module, context: &mut ModuleContext) -> Result<(), WriteError> {
        self.inner.write_module(module, context)
    }

    /// Writes a module in place, at the directory it was read from.
    pub fn write_in_place(&self, module: &mut Module) -> Result<(), WriteError> {
        let root = match module.location() {
            ModuleLocation::Directory(dir) => dir.clone(),
            other => {
                return Err(WriteError::WriteFile {
                    path: PathBuf::from(module.key().to_string()),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        format!("module location {:?} is not writable", other),
                    ),
                })
            }
        };
        let mut context = ModuleContext::new(root);
        self.write_module(module, &mut context)
    }
}

impl Default for AutoExportModuleWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes complete modules (descriptor, actions, sources and resources)
/// below a target directory.
pub struct FileConfigurationWriter {
    target: PathBuf,
}

impl FileConfigurationWriter {
    /// Creates a writer placing modules below `target`.
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// The directory a module is written to: `<mvnPath>/src/main/resources`
    /// when the module has one, `<group>/<project>/<module>` otherwise.
    pub fn module_dir(&self, module: &Module) -> PathBuf {
        match module.mvn_path() {
            Some(mvn_path) => {
                let mut dir = self.target.clone();
                for part in mvn_path.split('/').filter(|p| !p.is_empty()) {
                    dir.push(part);
                }
                dir.join("src").join("main").join("resources")
            }
            None => self
                .target
                .join(&module.key().group)
                .join(&module.key().project)
                .join(&module.key().module),
        }
    }

    /// Writes every module, including descriptor, actions and resources.
    pub fn write(&self, modules: &mut [Module]) -> Result<(), WriteError> {
        let writer = ModuleWriter::new();
        for module in modules.iter_mut() {
            let dir = self.module_dir(module);
            self.write_descriptor(module, &dir)?;
            let mut context = ModuleContext::new(&dir);
            writer.write_module(module, &mut context)?;
            module.set_location(ModuleLocation::Directory(dir));
        }
        log::info!("Wrote {} modules to {}", modules.len(), self.target.display());
        Ok(())
    }

    fn write_descriptor(&self, module: &Module, dir: &Path) -> Result<(), WriteError> {
        fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let descriptor = ModuleDescriptor::from_module(module)
            .to_yaml()
            .map_err(|e| WriteError::SerializeYaml {
                path: crate::parser::MODULE_DESCRIPTOR.to_string(),
                message: e.to_string(),
            })?;
        let descriptor_path = dir.join(crate::parser::MODULE_DESCRIPTOR);
        fs::write(&descriptor_path, descriptor).map_err(|e| WriteError::WriteFile {
            path: descriptor_path,
            source: e,
        })?;

        if !module.action_lists().is_empty() {
            let actions = action_lists_to_yaml(module.action_lists()).map_err(|e| {
                WriteError::SerializeYaml {
                    path: crate::parser::ACTIONS_FILE.to_string(),
                    message: e.to_string(),
                }
            })?;
            let actions_path = dir.join(crate::parser::ACTIONS_FILE);
            fs::write(&actions_path, actions).map_err(|e| WriteError::WriteFile {
                path: actions_path,
                source: e,
            })?;
        }
        Ok(())
    }
}

fn relative_to_source(source_path: &str, root_relative: &str) -> String {
    let dir = match source_path.rfind('/') {
        Some(i) => &source_path[..=i],
        None => "",
    };
    match root_relative.strip_prefix(dir) {
        Some(stripped) => stripped.to_string(),
        None => format!("/{}", root_relative),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_to_source() {
        assert_eq!(relative_to_source("a/b.yaml", "a/c.txt"), "c.txt");
        assert_eq!(relative_to_source("a/b.yaml", "x/c.txt"), "/x/c.txt");
        assert_eq!(relative_to_source("b.yaml", "x/c.txt"), "x/c.txt");
    }
}
