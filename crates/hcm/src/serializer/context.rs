//! Per-module write context.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::resource::{FileResourceInputProvider, FileResourceOutputProvider};
use crate::error::WriteError;
use crate::model::{resource_root_path, Module, SourceType};
use crate::parser::path_reader::to_slash_path;

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Hands out resource names that collide neither with files on disk nor
/// with names handed out before.
#[derive(Debug, Default, Clone)]
pub struct ResourceNameResolver {
    known: HashSet<String>,
}

impl ResourceNameResolver {
    /// Creates a resolver that knows no names yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a root-relative path as taken.
    pub fn seed(&mut self, path: impl Into<String>) {
        self.known.insert(path.into());
    }

    pub fn is_known(&self, path: &str) -> bool {
        self.known.contains(path)
    }

    /// Returns `path` if free, otherwise the first free `{base}_{n}{ext}`.
    /// The returned name is taken from then on.
    pub fn generate(&mut self, path: &str) -> Result<String, WriteError> {
        if !self.known.contains(path) {
            self.known.insert(path.to_string());
            return Ok(path.to_string());
        }

        let (dir, file) = match path.rfind('/') {
            Some(i) => (&path[..=i], &path[i + 1..]),
            None => ("", path),
        };
        let (base, ext) = match file.rfind('.') {
            Some(dot) if dot > 0 => (&file[..dot], &file[dot..]),
            _ => (file, ""),
        };

        for counter in 2..=MAX_NAME_ATTEMPTS {
            let candidate = format!("{}{}_{}{}", dir, base, counter, ext);
            if !self.known.contains(&candidate) {
                self.known.insert(candidate.clone());
                return Ok(candidate);
            }
        }
        Err(WriteError::NameExhausted(path.to_string()))
    }
}

/// Locations and name bookkeeping for writing one module.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    module_root: PathBuf,
    input: FileResourceInputProvider,
    output: FileResourceOutputProvider,
    config_names: ResourceNameResolver,
    content_names: ResourceNameResolver,
}

impl ModuleContext {
    /// A context writing the module below `module_root`.
    pub fn new(module_root: impl Into<PathBuf>) -> Self {
        let module_root = module_root.into();
        Self {
            output: FileResourceOutputProvider::new(&module_root),
            input: FileResourceInputProvider,
            module_root,
            config_names: ResourceNameResolver::new(),
            content_names: ResourceNameResolver::new(),
        }
    }

    pub fn module_root(&self) -> &Path {
        &self.module_root
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.module_root.join(crate::parser::MODULE_DESCRIPTOR)
    }

    pub fn actions_path(&self) -> PathBuf {
        self.module_root.join(crate::parser::ACTIONS_FILE)
    }

    pub fn config_root(&self) -> PathBuf {
        self.output.root(SourceType::Config)
    }

    pub fn content_root(&self) -> PathBuf {
        self.output.root(SourceType::Content)
    }

    pub fn input_provider(&self) -> &FileResourceInputProvider {
        &self.input
    }

    pub fn output_provider(&self) -> &FileResourceOutputProvider {
        &self.output
    }

    /// The resolver for new resource names below the config or content root.
    pub fn name_resolver(&mut self, source_type: SourceType) -> &mut ResourceNameResolver {
        match source_type {
            SourceType::Config => &mut self.config_names,
            SourceType::Content => &mut self.content_names,
        }
    }

    /// Primes the name resolvers with every file already below the output
    /// roots and every resource or source the module refers to.
    pub fn add_existing_files_to_known_list(&mut self, module: &Module) {
        for source_type in [SourceType::Config, SourceType::Content] {
            let root = self.output.root(source_type);
            if root.is_dir() {
                for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    if let Ok(relative) = entry.path().strip_prefix(&root) {
                        self.name_resolver(source_type).seed(to_slash_path(relative));
                    }
                }
            }
        }

        for source in module.sources() {
            let source_type = source.source_type();
            self.name_resolver(source_type).seed(source.path());
            let mut referenced = Vec::new();
            for definition in source.definitions() {
                definition.visit_values(&mut |value| {
                    if let Some(resource) = value.resource_ref() {
                        if !resource.is_new {
                            referenced.push(resource_root_path(source.path(), &resource.path));
                        }
                    }
                });
            }
            let resolver = self.name_resolver(source_type);
            for path in referenced {
                resolver.seed(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        DefinitionNode, DefinitionProperty, ModuleKey, ResourceOrigin, ResourceRef, Source, Value,
        ValueType,
    };
    use crate::path::NodePath;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_generate_unique_names() {
        let mut resolver = ResourceNameResolver::new();
        assert_eq!(resolver.generate("a/file.txt").unwrap(), "a/file.txt");
        assert_eq!(resolver.generate("a/file.txt").unwrap(), "a/file_2.txt");
        assert_eq!(resolver.generate("a/file.txt").unwrap(), "a/file_3.txt");
        assert_eq!(resolver.generate("noext").unwrap(), "noext");
        assert_eq!(resolver.generate("noext").unwrap(), "noext_2");
        assert_eq!(resolver.generate(".hidden").unwrap(), ".hidden");
        assert_eq!(resolver.generate(".hidden").unwrap(), ".hidden_2");
    }

    #[test]
    fn test_existing_files_are_known() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("hcm-config/dir")).unwrap();
        fs::write(temp.path().join("hcm-config/dir/image.png"), b"png").unwrap();

        let mut module = Module::new(ModuleKey::new("g", "p", "m"));
        let source = module.add_source(Source::new("main.yaml", SourceType::Config));
        let mut node = DefinitionNode::new(NodePath::parse("/a").unwrap());
        node.add_property(DefinitionProperty::single(
            "text",
            Value::resource(
                ValueType::String,
                ResourceRef::existing("elsewhere.txt", ResourceOrigin::File(PathBuf::from("/x"))),
            ),
        ));
        source.add_config_definition(node);

        let mut context = ModuleContext::new(temp.path());
        context.add_existing_files_to_known_list(&module);

        let resolver = context.name_resolver(SourceType::Config);
        assert!(resolver.is_known("dir/image.png"));
        assert!(resolver.is_known("elsewhere.txt"));
        assert!(resolver.is_known("main.yaml"));
        assert_eq!(resolver.generate("dir/image.png").unwrap(), "dir/image_2.png");
        assert!(!context.name_resolver(SourceType::Content).is_known("dir/image.png"));
    }
}
