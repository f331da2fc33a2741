//! Conventional file layout for repository paths.
//!
//! A table of path patterns maps a node (or property) to its *context node*,
//! the node that owns a source file, and to the relative file that source
//! should live in. The first matching entry wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::path::NodePath;

const NAME: &str = "([^/]+)";
const ANY: &str = "(/.*)?";

struct Entry {
    pattern: Regex,
    context: &'static str,
    file: &'static str,
}

impl Entry {
    fn new(pattern: &str, context: &'static str, file: &'static str) -> Self {
        let pattern = pattern.replace("{NAME}", NAME).replace("{ANY}", ANY);
        Self {
            pattern: Regex::new(&format!("^{}$", pattern)).unwrap(),
            context,
            file,
        }
    }
}

static ENTRIES: LazyLock<Vec<Entry>> = LazyLock::new(|| {
    vec![
        Entry::new(
            "/hippo:namespaces/{NAME}/{NAME}{ANY}",
            "/hippo:namespaces/${1}/${2}",
            "namespaces/${1}/${2}.xml",
        ),
        Entry::new("/hippo:namespaces/{NAME}", "/hippo:namespaces/${1}", "namespaces/${1}.xml"),
        Entry::new(
            "/hippo:configuration/hippo:queries/hippo:templates/{NAME}{ANY}",
            "/hippo:configuration/hippo:queries/hippo:templates/${1}",
            "hippo:configuration/hippo:queries/hippo:templates/${1}.xml",
        ),
        Entry::new(
            "/hippo:configuration/hippo:workflows/{NAME}/{NAME}{ANY}",
            "/hippo:configuration/hippo:workflows/${1}/${2}",
            "hippo:configuration/hippo:workflows/${1}/${2}.xml",
        ),
        Entry::new(
            "/hippo:configuration/hippo:frontend/{NAME}/{NAME}{ANY}",
            "/hippo:configuration/hippo:frontend/${1}/${2}",
            "hippo:configuration/hippo:frontend/${1}/${2}.xml",
        ),
        Entry::new(
            "/hippo:configuration/{NAME}/{NAME}{ANY}",
            "/hippo:configuration/${1}/${2}",
            "hippo:configuration/${1}/${2}.xml",
        ),
        Entry::new(
            "/hippo:configuration/{NAME}",
            "/hippo:configuration/${1}",
            "hippo:configuration/${1}.xml",
        ),
        Entry::new(
            "/hst:hst/hst:configurations/{NAME}/{NAME}{ANY}",
            "/hst:hst/hst:configurations/${1}/${2}",
            "hst/configurations/${1}/${2}.xml",
        ),
        Entry::new(
            "/hst:hst/hst:configurations/{NAME}",
            "/hst:hst/hst:configurations/${1}",
            "hst/configurations/${1}.xml",
        ),
        Entry::new("/hst:hst/{NAME}/{NAME}{ANY}", "/hst:hst/${1}/${2}", "hst/${1}/${2}.xml"),
        Entry::new("/hst:hst/{NAME}", "/hst:hst/${1}", "hst/${1}.xml"),
        Entry::new("/content/{NAME}/{NAME}{ANY}", "/content/${1}/${2}", "content/${1}/${2}.xml"),
        Entry::new("/content/{NAME}", "/content/${1}", "content/${1}.xml"),
        Entry::new("/{NAME}{ANY}", "/${1}", "${1}.xml"),
    ]
});

const ROOT_FILE: &str = "main.xml";

fn node_path_for(path: &str, is_node: bool) -> String {
    if is_node {
        return path.to_string();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn find(path: &str) -> Option<(&'static Entry, regex::Captures<'_>)> {
    ENTRIES
        .iter()
        .find_map(|entry| entry.pattern.captures(path).map(|c| (entry, c)))
}

/// The node that owns the source file `path` belongs in.
pub fn context_node_for_path(path: &str, is_node: bool) -> String {
    let node = node_path_for(path, is_node);
    match find(&node) {
        Some((entry, captures)) => {
            let mut context = String::new();
            captures.expand(entry.context, &mut context);
            context
        }
        None => "/".to_string(),
    }
}

/// The conventional relative file for `path`, with the legacy `.xml`
/// extension.
pub fn file_for_path(path: &str, is_node: bool) -> String {
    let node = node_path_for(path, is_node);
    let file = match find(&node) {
        Some((entry, captures)) => {
            let mut file = String::new();
            captures.expand(entry.file, &mut file);
            file
        }
        None => ROOT_FILE.to_string(),
    };
    sanitize(&file)
}

/// The source path a new definition for `path` should be written to.
pub fn source_path_for(path: &NodePath) -> String {
    let file = file_for_path(&path.to_string(), true);
    match file.strip_suffix(".xml") {
        Some(stem) => format!("{}.yaml", stem),
        None => format!("{}.yaml", file),
    }
}

/// True when `path` is a context node of its own, so a new node there
/// gets a source file of its own.
pub fn should_path_create_new_source(path: &NodePath) -> bool {
    let rendered = path.to_string();
    context_node_for_path(&rendered, true) == rendered
}

/// Namespace prefixes become `-` separated names and same-name-sibling
/// indices are flattened.
fn sanitize(file: &str) -> String {
    let mut result = String::with_capacity(file.len());
    for c in file.chars() {
        match c {
            ':' | '[' => result.push('-'),
            ']' => {}
            other => result.push(other),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_context_node_for_path() {
        assert_eq!(
            context_node_for_path("/hippo:namespaces/myproject/newsdocument/editor:templates", true),
            "/hippo:namespaces/myproject/newsdocument"
        );
        assert_eq!(context_node_for_path("/content/documents", true), "/content/documents");
        assert_eq!(context_node_for_path("/content/documents/a/b", true), "/content/documents/a");
        assert_eq!(context_node_for_path("/content/documents/title", false), "/content/documents");
        assert_eq!(context_node_for_path("/webfiles/site/x", true), "/webfiles");
        assert_eq!(context_node_for_path("/", true), "/");
    }

    #[test]
    fn test_file_for_path() {
        assert_eq!(
            file_for_path("/hippo:namespaces/myproject/newsdocument/x", true),
            "namespaces/myproject/newsdocument.xml"
        );
        assert_eq!(
            file_for_path("/hippo:configuration/hippo:modules/autoexport/hippo:moduleconfig", true),
            "hippo-configuration/hippo-modules/autoexport.xml"
        );
        assert_eq!(file_for_path("/hst:hst/hst:hosts/dev", true), "hst/hst-hosts/dev.xml");
        assert_eq!(file_for_path("/", true), "main.xml");
        assert_eq!(file_for_path("/content/a[2]", true), "content/a-2.xml");
    }

    #[test]
    fn test_source_path_for() {
        assert_eq!(source_path_for(&p("/content/newfolder")), "content/newfolder.yaml");
        assert_eq!(
            source_path_for(&p("/hippo:namespaces/myproject")),
            "namespaces/myproject.yaml"
        );
    }

    #[test]
    fn test_should_path_create_new_source() {
        assert!(should_path_create_new_source(&p("/content/newfolder")));
        assert!(should_path_create_new_source(&p("/hippo:namespaces/myproject/doc")));
        assert!(!should_path_create_new_source(&p(
            "/hippo:configuration/hippo:modules/autoexport/hippo:moduleconfig"
        )));
    }
}
