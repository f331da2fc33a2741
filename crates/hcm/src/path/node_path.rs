//! Multi-segment repository paths.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use super::node_name::NodeName;
use crate::error::PathError;

/// An immutable repository path.
///
/// Every operation returns a new path. Equality and ordering follow
/// [`NodeName`], so `/a/b` and `/a[1]/b[1]` are the same path.
#[derive(Debug, Clone)]
pub struct NodePath {
    segments: Vec<NodeName>,
    absolute: bool,
}

impl NodePath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            absolute: true,
        }
    }

    /// The empty relative path.
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
            absolute: false,
        }
    }

    /// Creates a path from already parsed segments.
    pub fn from_segments(segments: Vec<NodeName>, absolute: bool) -> Self {
        Self { segments, absolute }
    }

    /// Parses a path string.
    ///
    /// Trailing slashes are dropped. Blank input, input made only of
    /// slashes (other than the root `/` itself) and empty inner segments are
    /// rejected.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.trim().is_empty() {
            return Err(PathError::Blank);
        }
        if path == "/" {
            return Ok(Self::root());
        }

        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::InvalidPath {
                path: path.to_string(),
                reason: "path consists only of slashes".to_string(),
            });
        }

        let (absolute, body) = match trimmed.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let mut segments = Vec::new();
        for segment in body.split('/') {
            if segment.is_empty() {
                return Err(PathError::InvalidPath {
                    path: path.to_string(),
                    reason: "empty path segment".to_string(),
                });
            }
            segments.push(NodeName::parse(segment)?);
        }

        Ok(Self { segments, absolute })
    }

    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[NodeName] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&NodeName> {
        self.segments.get(index)
    }

    pub fn last_segment(&self) -> Option<&NodeName> {
        self.segments.last()
    }

    /// The parent path, `None` for the root and the empty relative path.
    pub fn parent(&self) -> Option<NodePath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
            absolute: self.absolute,
        })
    }

    /// Resolves `other` against this path.
    ///
    /// An absolute `other` is returned as is. `..` segments pop the
    /// preceding segment; on an absolute path they stop at the root.
    pub fn resolve(&self, other: &NodePath) -> NodePath {
        if other.absolute {
            return other.clone();
        }
        let mut segments = self.segments.clone();
        for segment in &other.segments {
            if segment.name() == "." && !segment.is_indexed() {
                continue;
            }
            if segment.is_parent_reference() {
                match segments.last() {
                    Some(last) if !last.is_parent_reference() => {
                        segments.pop();
                    }
                    _ if self.absolute => {}
                    _ => segments.push(segment.clone()),
                }
                continue;
            }
            segments.push(segment.clone());
        }
        Self {
            segments,
            absolute: self.absolute,
        }
    }

    /// Appends a single name.
    pub fn resolve_name(&self, name: &NodeName) -> NodePath {
        let mut segments = self.segments.clone();
        segments.push(name.clone());
        Self {
            segments,
            absolute: self.absolute,
        }
    }

    /// Parses `name` and appends it.
    pub fn child(&self, name: &str) -> Result<NodePath, PathError> {
        Ok(self.resolve_name(&NodeName::parse(name)?))
    }

    /// Parses `path` and resolves it against this path.
    pub fn resolve_str(&self, path: &str) -> Result<NodePath, PathError> {
        Ok(self.resolve(&NodePath::parse(path)?))
    }

    /// Computes the relative path leading from this path to `other`.
    ///
    /// When `other` is not below this path the result climbs with `..`
    /// segments to the common ancestor first.
    pub fn relativize(&self, other: &NodePath) -> Result<NodePath, PathError> {
        if self.absolute != other.absolute {
            return Err(PathError::InvalidPath {
                path: other.to_string(),
                reason: format!(
                    "cannot relativize against '{}': one path is absolute, the other is not",
                    self
                ),
            });
        }

        let common = self
            .segments
            .iter()
            .zip(other.segments.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut segments = Vec::new();
        for _ in common..self.segments.len() {
            segments.push(NodeName::unindexed(".."));
        }
        segments.extend(other.segments[common..].iter().cloned());

        Ok(Self {
            segments,
            absolute: false,
        })
    }

    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.absolute == prefix.absolute
            && prefix.segments.len() <= self.segments.len()
            && self
                .segments
                .iter()
                .zip(prefix.segments.iter())
                .all(|(a, b)| a == b)
    }

    pub fn ends_with(&self, suffix: &NodePath) -> bool {
        if suffix.absolute {
            return self == suffix;
        }
        if suffix.segments.len() > self.segments.len() {
            return false;
        }
        let offset = self.segments.len() - suffix.segments.len();
        self.segments[offset..]
            .iter()
            .zip(suffix.segments.iter())
            .all(|(a, b)| a == b)
    }

    /// True when `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        other.segments.len() > self.segments.len() && other.starts_with(self)
    }

    /// Segments `[begin, end)`; absolute only when `begin == 0` on an
    /// absolute path.
    pub fn subpath(&self, begin: usize, end: usize) -> NodePath {
        let end = end.min(self.segments.len());
        let begin = begin.min(end);
        Self {
            segments: self.segments[begin..end].to_vec(),
            absolute: self.absolute && begin == 0,
        }
    }

    pub fn to_relative(&self) -> NodePath {
        Self {
            segments: self.segments.clone(),
            absolute: false,
        }
    }

    pub fn to_absolute(&self) -> NodePath {
        Self {
            segments: self.segments.clone(),
            absolute: true,
        }
    }

    /// Drops every explicit `[1]`.
    pub fn to_minimally_indexed(&self) -> NodePath {
        Self {
            segments: self.segments.iter().map(NodeName::minimally_indexed).collect(),
            absolute: self.absolute,
        }
    }

    /// Makes every implicit `[1]` explicit.
    pub fn force_indices(&self) -> NodePath {
        Self {
            segments: self.segments.iter().map(NodeName::force_index).collect(),
            absolute: self.absolute,
        }
    }
}

impl PartialEq for NodePath {
    fn eq(&self, other: &Self) -> bool {
        self.absolute == other.absolute && self.segments == other.segments
    }
}

impl Eq for NodePath {}

impl Hash for NodePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.absolute.hash(state);
        self.segments.hash(state);
    }
}

impl PartialOrd for NodePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodePath {
    /// Absolute paths sort before relative ones; otherwise segment by
    /// segment, so a parent always sorts before its descendants.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .absolute
            .cmp(&self.absolute)
            .then_with(|| self.segments.cmp(&other.segments))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            if self.segments.is_empty() {
                return write!(f, "/");
            }
            for segment in &self.segments {
                write!(f, "/{}", segment)?;
            }
            Ok(())
        } else {
            for (i, segment) in self.segments.iter().enumerate() {
                if i > 0 {
                    write!(f, "/")?;
                }
                write!(f, "{}", segment)?;
            }
            Ok(())
        }
    }
}

impl FromStr for NodePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
