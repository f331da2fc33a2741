//! Ordering of groups, projects and modules by their `after` declarations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::module::Module;
use crate::error::ModelError;

/// Sorts names so that each comes after everything it declares in `after`.
/// Ties are broken alphabetically. Unknown names in `after` are ignored.
pub fn sort_names(kind: &str, after: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, ModelError> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (name, deps) in after {
        let mut known = BTreeSet::new();
        for dep in deps {
            if dep == name {
                continue;
            }
            if after.contains_key(dep) {
                known.insert(dep.as_str());
            } else {
                log::warn!("{} '{}' is declared after unknown {} '{}'", kind, name, kind, dep);
            }
        }
        pending.insert(name.as_str(), known);
    }

    let mut sorted = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let ready = pending
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name);
        match ready {
            Some(name) => {
                pending.remove(name);
                for deps in pending.values_mut() {
                    deps.remove(name);
                }
                sorted.push(name.to_string());
            }
            None => {
                let names: Vec<&str> = pending.keys().copied().collect();
                return Err(ModelError::CircularDependency {
                    kind: kind.to_string(),
                    names: names.join(", "),
                });
            }
        }
    }
    Ok(sorted)
}

/// Sorts modules by group, then project, then module order.
pub fn sort_modules(modules: &[Arc<Module>]) -> Result<Vec<Arc<Module>>, ModelError> {
    let mut group_after: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for module in modules {
        group_after
            .entry(module.key().group.clone())
            .or_default()
            .extend(module.group_after().iter().cloned());
    }

    let mut sorted = Vec::with_capacity(modules.len());
    for group in sort_names("group", &group_after)? {
        let mut project_after: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for module in modules.iter().filter(|m| m.key().group == group) {
            project_after
                .entry(module.key().project.clone())
                .or_default()
                .extend(module.project_after().iter().cloned());
        }

        for project in sort_names("project", &project_after)? {
            let in_project: Vec<&Arc<Module>> = modules
                .iter()
                .filter(|m| m.key().group == group && m.key().project == project)
                .collect();

            let mut module_after: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for module in &in_project {
                if module_after.contains_key(module.name()) {
                    return Err(ModelError::DuplicateModule(module.key().to_string()));
                }
                module_after.insert(
                    module.name().to_string(),
                    module.after().iter().cloned().collect(),
                );
            }

            for name in sort_names("module", &module_after)? {
                if let Some(module) = in_project.iter().find(|m| m.name() == name) {
                    sorted.push(Arc::clone(module));
                }
            }
        }
    }
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::module::ModuleKey;

    fn deps(pairs: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(n, a)| (n.to_string(), a.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_sort_names_respects_after() {
        let sorted = sort_names("module", &deps(&[("a", &["c"]), ("b", &[]), ("c", &[])])).unwrap();
        assert_eq!(sorted, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_names_ignores_unknown() {
        let sorted = sort_names("module", &deps(&[("a", &["missing"]), ("b", &[])])).unwrap();
        assert_eq!(sorted, vec!["a", "b"]);
    }

    #[test]
    fn test_sort_names_detects_cycle() {
        let result = sort_names("group", &deps(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]));
        match result {
            Err(ModelError::CircularDependency { kind, names }) => {
                assert_eq!(kind, "group");
                assert_eq!(names, "a, b");
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_sort_modules_by_group_then_project() {
        let mut core = Module::new(ModuleKey::new("core", "p", "m"));
        core.set_after(vec![], vec![], vec![]);
        let mut site = Module::new(ModuleKey::new("app", "p", "m"));
        site.set_after(vec!["core".to_string()], vec![], vec![]);
        let modules = vec![Arc::new(site), Arc::new(core)];

        let sorted = sort_modules(&modules).unwrap();
        let keys: Vec<String> = sorted.iter().map(|m| m.key().to_string()).collect();
        assert_eq!(keys, vec!["core/p/m", "app/p/m"]);
    }

    #[test]
    fn test_sort_modules_rejects_duplicates() {
        let modules = vec![
            Arc::new(Module::new(ModuleKey::new("g", "p", "m"))),
            Arc::new(Module::new(ModuleKey::new("g", "p", "m"))),
        ];
        assert!(matches!(
            sort_modules(&modules),
            Err(ModelError::DuplicateModule(_))
        ));
    }
}
