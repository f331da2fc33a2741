//! `hcm-module.yaml` descriptors and `hcm-actions.yaml` action lists.

use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;

use crate::error::ParserError;
use crate::model::{ActionItem, ActionList, ActionType, Module, ModuleKey};
use crate::path::NodePath;

/// One or many names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AfterList {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl AfterList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            AfterList::None => Vec::new(),
            AfterList::One(name) => vec![name],
            AfterList::Many(names) => names,
        }
    }

    fn from_slice(names: &[String]) -> Self {
        match names {
            [] => AfterList::None,
            [one] => AfterList::One(one.clone()),
            many => AfterList::Many(many.to_vec()),
        }
    }

    fn is_none(&self) -> bool {
        matches!(self, AfterList::None)
    }
}

/// A group, project or module entry: a plain name or `{name, after}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NamedEntry {
    Name(String),
    Full {
        name: String,
        #[serde(default, skip_serializing_if = "AfterList::is_none")]
        after: AfterList,
    },
}

impl NamedEntry {
    fn new(name: &str, after: &[String]) -> Self {
        if after.is_empty() {
            NamedEntry::Name(name.to_string())
        } else {
            NamedEntry::Full {
                name: name.to_string(),
                after: AfterList::from_slice(after),
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NamedEntry::Name(name) => name,
            NamedEntry::Full { name, .. } => name,
        }
    }

    pub fn after(&self) -> Vec<String> {
        match self {
            NamedEntry::Name(_) => Vec::new(),
            NamedEntry::Full { after, .. } => after.clone().into_vec(),
        }
    }
}

/// Contents of `hcm-module.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub group: NamedEntry,
    pub project: NamedEntry,
    pub module: NamedEntry,
}

impl ModuleDescriptor {
    /// Parses the text of an `hcm-module.yaml` read from `path`.
    pub fn parse(path: &str, text: &str) -> Result<Self, ParserError> {
        let descriptor: ModuleDescriptor =
            serde_yaml::from_str(text).map_err(|e| ParserError::ParseYaml {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        for entry in [&descriptor.group, &descriptor.project, &descriptor.module] {
            if entry.name().trim().is_empty() {
                return Err(ParserError::invalid(path, "group, project and module names must not be blank"));
            }
        }
        Ok(descriptor)
    }

    /// The descriptor that describes `module` when it is written back.
    pub fn from_module(module: &Module) -> Self {
        let key = module.key();
        Self {
            group: NamedEntry::new(&key.group, module.group_after()),
            project: NamedEntry::new(&key.project, module.project_after()),
            module: NamedEntry::new(&key.module, module.after()),
        }
    }

    /// An empty module carrying the descriptor's names and ordering.
    pub fn to_module(&self) -> Module {
        let mut module = Module::new(ModuleKey::new(
            self.group.name(),
            self.project.name(),
            self.module.name(),
        ));
        module.set_after(self.group.after(), self.project.after(), self.module.after());
        module
    }

    /// Renders the descriptor as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Parses `hcm-actions.yaml`:
///
/// ```yaml
/// action-lists:
/// - 1.0:
///     /content/documents/myproject: reload
/// ```
pub fn parse_action_lists(path: &str, text: &str) -> Result<Vec<ActionList>, ParserError> {
    let yaml: Yaml = serde_yaml::from_str(text).map_err(|e| ParserError::ParseYaml {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    if yaml.is_null() {
        return Ok(Vec::new());
    }
    let lists = yaml
        .get("action-lists")
        .ok_or_else(|| ParserError::invalid(path, "missing 'action-lists'"))?;

    let mut entries: Vec<(&Yaml, &Yaml)> = Vec::new();
    match lists {
        Yaml::Sequence(items) => {
            for item in items {
                let map = item
                    .as_mapping()
                    .ok_or_else(|| ParserError::invalid(path, "action list entries must be mappings"))?;
                entries.extend(map.iter());
            }
        }
        Yaml::Mapping(map) => entries.extend(map.iter()),
        Yaml::Null => {}
        _ => return Err(ParserError::invalid(path, "'action-lists' must be a sequence")),
    }

    let mut result = Vec::new();
    for (version, items) in entries {
        let version = match version {
            Yaml::String(s) => s.clone(),
            Yaml::Number(n) => n.to_string(),
            _ => return Err(ParserError::invalid(path, "action list versions must be scalars")),
        };
        let mut list = ActionList {
            version: version.clone(),
            items: Vec::new(),
        };
        let items = items.as_mapping().ok_or_else(|| {
            ParserError::invalid(path, format!("actions of version {} must be a mapping", version))
        })?;
        for (node, action) in items {
            let node = node
                .as_str()
                .ok_or_else(|| ParserError::invalid(path, "action paths must be strings"))?;
            let node_path = NodePath::parse(node)
                .map_err(|e| ParserError::invalid(path, e.to_string()))?;
            if !node_path.is_absolute() {
                return Err(ParserError::invalid(path, format!("action path '{}' must be absolute", node)));
            }
            let action: ActionType = action
                .as_str()
                .ok_or_else(|| ParserError::invalid(path, "actions must be strings"))?
                .parse()
                .map_err(|e: String| ParserError::invalid(path, e))?;
            list.items.push(ActionItem {
                path: node_path,
                action,
            });
        }
        result.push(list);
    }
    Ok(result)
}

/// Renders action lists in the layout [`parse_action_lists`] reads.
pub fn action_lists_to_yaml(lists: &[ActionList]) -> Result<String, serde_yaml::Error> {
    let mut sequence = Vec::new();
    for list in lists {
        let mut actions = serde_yaml::Mapping::new();
        for item in &list.items {
            actions.insert(
                Yaml::String(item.path.to_string()),
                Yaml::String(item.action.as_str().to_string()),
            );
        }
        let mut entry = serde_yaml::Mapping::new();
        entry.insert(Yaml::String(list.version.clone()), Yaml::Mapping(actions));
        sequence.push(Yaml::Mapping(entry));
    }
    let mut root = serde_yaml::Mapping::new();
    root.insert(
        Yaml::String("action-lists".to_string()),
        Yaml::Sequence(sequence),
    );
    serde_yaml::to_string(&Yaml::Mapping(root))
}
