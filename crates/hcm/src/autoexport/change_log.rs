//! Accumulated node paths touched since the last export.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::path::NodePath;

/// Sorted sets of added, changed and deleted node paths, plus namespace
/// prefixes whose node types were re-registered.
///
/// A path is never recorded below a path that is already added: the added
/// node is exported as a whole.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    created: Instant,
    updated: Instant,
    last_revision: i64,
    added: BTreeSet<String>,
    changed: BTreeSet<String>,
    deleted: BTreeSet<String>,
    namespaces: BTreeSet<String>,
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(i) => Some(&path[..i]),
    }
}

/// `/a[1]/b` and `/a/b` name the same node; paths are kept without
/// explicit `[1]` indices. Unparseable paths are kept as given.
fn normalize(path: &str) -> String {
    NodePath::parse(path)
        .map(|p| p.to_minimally_indexed().to_string())
        .unwrap_or_else(|_| path.to_string())
}

fn is_self_or_descendant(path: &str, ancestor: &str) -> bool {
    if path == ancestor {
        return true;
    }
    if ancestor == "/" {
        return path.starts_with('/');
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

fn remove_subtree(set: &mut BTreeSet<String>, path: &str) {
    set.retain(|p| !is_self_or_descendant(p, path));
}

impl ChangeLog {
    /// Creates an empty log started at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            created: now,
            updated: now,
            last_revision: -1,
            added: BTreeSet::new(),
            changed: BTreeSet::new(),
            deleted: BTreeSet::new(),
            namespaces: BTreeSet::new(),
        }
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// Time of the last recorded change.
    pub fn updated(&self) -> Instant {
        self.updated
    }

    /// Time since the log was started.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created)
    }

    /// Time since the last recorded change.
    pub fn quiet_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.updated)
    }

    /// The newest journal revision folded into this log.
    pub fn last_revision(&self) -> i64 {
        self.last_revision
    }

    pub fn set_last_revision(&mut self, revision: i64) {
        self.last_revision = self.last_revision.max(revision);
    }

    pub fn added(&self) -> &BTreeSet<String> {
        &self.added
    }

    pub fn changed(&self) -> &BTreeSet<String> {
        &self.changed
    }

    pub fn deleted(&self) -> &BTreeSet<String> {
        &self.deleted
    }

    pub fn namespaces(&self) -> &BTreeSet<String> {
        &self.namespaces
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.changed.is_empty()
            && self.deleted.is_empty()
            && self.namespaces.is_empty()
    }

    /// Number of recorded paths and prefixes.
    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.deleted.len() + self.namespaces.len()
    }

    /// True when `path` is an added node or lies below one.
    pub fn is_within_added(&self, path: &str) -> bool {
        let path = normalize(path);
        let path = path.as_str();
        self.added.iter().any(|a| is_self_or_descendant(path, a))
    }

    pub fn record_node_added(&mut self, path: &str, now: Instant) {
        let path = normalize(path);
        let path = path.as_str();
        if self.is_within_added(path) {
            return;
        }
        remove_subtree(&mut self.added, path);
        remove_subtree(&mut self.changed, path);
        let replaced = self.deleted.remove(path);
        if replaced {
            self.changed.insert(path.to_string());
        } else {
            self.added.insert(path.to_string());
        }
        self.record_parent_changed(path);
        self.touch(now);
    }

    /// A removed node that was added in this log cancels out.
    pub fn record_node_removed(&mut self, path: &str, now: Instant) {
        let path = normalize(path);
        let path = path.as_str();
        let was_added = self.added.contains(path);
        let below_added = !was_added && self.is_within_added(path);
        remove_subtree(&mut self.added, path);
        remove_subtree(&mut self.changed, path);
        remove_subtree(&mut self.deleted, path);
        if !was_added && !below_added {
            self.deleted.insert(path.to_string());
        }
        if !below_added {
            self.record_parent_changed(path);
        }
        self.touch(now);
    }

    /// Marks `path` changed unless it is added or deleted in this log.
    pub fn record_node_changed(&mut self, path: &str, now: Instant) {
        let path = normalize(path);
        let path = path.as_str();
        if self.is_within_added(path) || self.deleted.contains(path) {
            return;
        }
        self.changed.insert(path.to_string());
        self.touch(now);
    }

    /// A property event marks its node changed.
    pub fn record_property_changed(&mut self, property_path: &str, now: Instant) {
        if let Some(node) = parent_of(property_path) {
            self.record_node_changed(node, now);
        }
    }

    /// A move is a removal followed by an add.
    pub fn record_node_moved(&mut self, from: &str, to: &str, now: Instant) {
        self.record_node_removed(from, now);
        self.record_node_added(to, now);
    }

    /// Records that the node types of `prefix` were re-registered.
    pub fn record_namespace(&mut self, prefix: &str, now: Instant) {
        if self.namespaces.insert(prefix.to_string()) {
            self.touch(now);
        }
    }

    fn record_parent_changed(&mut self, path: &str) {
        if let Some(parent) = parent_of(path) {
            if !self.is_within_added(parent) {
                self.changed.insert(parent.to_string());
            }
        }
    }

    fn touch(&mut self, now: Instant) {
        self.updated = self.updated.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_added_node_marks_parent_changed() {
        let now = Instant::now();
        let mut log = ChangeLog::new(now);
        log.record_node_added("/a/b", now);
        assert_eq!(log.added(), &set(&["/a/b"]));
        assert_eq!(log.changed(), &set(&["/a"]));
    }

    #[test]
    fn test_changes_below_added_are_ignored() {
        let now = Instant::now();
        let mut log = ChangeLog::new(now);
        log.record_node_added("/a/b", now);
        log.record_node_added("/a/b/c", now);
        log.record_property_changed("/a/b/c/title", now);
        assert_eq!(log.added(), &set(&["/a/b"]));
        assert_eq!(log.changed(), &set(&["/a"]));
    }

    #[test]
    fn test_added_ancestor_absorbs_descendants() {
        let now = Instant::now();
        let mut log = ChangeLog::new(now);
        log.record_property_changed("/a/b/c/title", now);
        log.record_node_added("/a/b", now);
        assert_eq!(log.added(), &set(&["/a/b"]));
        assert_eq!(log.changed(), &set(&["/a"]));
    }

    #[test]
    fn test_added_then_removed_cancels() {
        let now = Instant::now();
        let mut log = ChangeLog::new(now);
        log.record_node_added("/a/b", now);
        log.record_node_removed("/a/b", now);
        assert!(log.added().is_empty());
        assert!(log.deleted().is_empty());
        assert_eq!(log.changed(), &set(&["/a"]));
    }

    #[test]
    fn test_removed_then_added_is_changed() {
        let now = Instant::now();
        let mut log = ChangeLog::new(now);
        log.record_node_removed("/a/b", now);
        log.record_node_added("/a/b", now);
        assert!(log.deleted().is_empty());
        assert!(log.added().is_empty());
        assert_eq!(log.changed(), &set(&["/a", "/a/b"]));
    }

    #[test]
    fn test_move() {
        let now = Instant::now();
        let mut log = ChangeLog::new(now);
        log.record_node_moved("/a/x", "/b/x", now);
        assert_eq!(log.deleted(), &set(&["/a/x"]));
        assert_eq!(log.added(), &set(&["/b/x"]));
        assert_eq!(log.changed(), &set(&["/a", "/b"]));
    }

    #[test]
    fn test_sibling_prefix_is_not_descendant() {
        assert!(is_self_or_descendant("/a/b", "/a"));
        assert!(!is_self_or_descendant("/ab", "/a"));
        assert!(is_self_or_descendant("/a", "/"));
        assert_eq!(parent_of("/a"), Some("/"));
        assert_eq!(parent_of("/"), None);
    }

    #[test]
    fn test_explicit_first_index_is_same_node() {
        let now = Instant::now();
        let mut log = ChangeLog::new(now);
        log.record_node_added("/a[1]/b", now);
        assert_eq!(log.added(), &set(&["/a/b"]));
        assert!(log.is_within_added("/a/b[1]/c"));

        log.record_node_removed("/a/b[1]", now);
        assert!(log.added().is_empty());
        assert!(log.deleted().is_empty());

        log.record_property_changed("/a[1]/c[2]/title", now);
        assert_eq!(log.changed(), &set(&["/a", "/a/c[2]"]));
    }

    #[test]
    fn test_timing() {
        let start = Instant::now();
        let mut log = ChangeLog::new(start);
        let later = start + Duration::from_millis(100);
        log.record_node_changed("/a", later);
        assert_eq!(log.age(later), Duration::from_millis(100));
        assert_eq!(log.quiet_for(later), Duration::ZERO);
        assert_eq!(log.quiet_for(later + Duration::from_millis(50)), Duration::from_millis(50));
    }
}
