//! A single same-name-sibling aware node name.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::PathError;

/// A node name plus a same-name-sibling index.
///
/// Index `0` means "unindexed". For equality, hashing and ordering an
/// unindexed name is the same as index `1`, because the repository treats
/// `foo` and `foo[1]` as the same node. Use
/// [`NodeName::equals_unindexed_significant`] when the written form matters.
#[derive(Debug, Clone)]
pub struct NodeName {
    name: String,
    index: u32,
}

impl NodeName {
    /// Creates a name without validating it.
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Creates an unindexed name without validating it.
    pub fn unindexed(name: impl Into<String>) -> Self {
        Self::new(name, 0)
    }

    /// Parses `name` or `name[index]`.
    pub fn parse(segment: &str) -> Result<Self, PathError> {
        if segment.trim().is_empty() {
            return Err(PathError::InvalidName {
                name: segment.to_string(),
                reason: "name must not be blank".to_string(),
            });
        }
        if segment.contains('/') {
            return Err(PathError::InvalidName {
                name: segment.to_string(),
                reason: "name must not contain '/'".to_string(),
            });
        }

        if let Some(stripped) = segment.strip_suffix(']') {
            let open = stripped.rfind('[').ok_or_else(|| PathError::InvalidName {
                name: segment.to_string(),
                reason: "unbalanced ']'".to_string(),
            })?;
            let name = &stripped[..open];
            let index_text = &stripped[open + 1..];
            if name.is_empty() || name.contains('[') || name.contains(']') {
                return Err(PathError::InvalidName {
                    name: segment.to_string(),
                    reason: "malformed same-name-sibling index".to_string(),
                });
            }
            let index: u32 = index_text.parse().map_err(|_| PathError::InvalidName {
                name: segment.to_string(),
                reason: format!("index '{}' is not a number", index_text),
            })?;
            if index == 0 {
                return Err(PathError::InvalidName {
                    name: segment.to_string(),
                    reason: "same-name-sibling indices start at 1".to_string(),
                });
            }
            return Ok(Self::new(name, index));
        }

        if segment.contains('[') || segment.contains(']') {
            return Err(PathError::InvalidName {
                name: segment.to_string(),
                reason: "unbalanced '['".to_string(),
            });
        }
        Ok(Self::unindexed(segment))
    }

    /// The name without its index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw index, `0` when unindexed.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The index with `0` folded onto `1`.
    pub fn normalized_index(&self) -> u32 {
        if self.index == 0 {
            1
        } else {
            self.index
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.index > 0
    }

    /// True for the relative path segments `.` and `..`.
    pub fn is_parent_reference(&self) -> bool {
        self.name == ".." && self.index == 0
    }

    /// Same name and the exact same written index.
    pub fn equals_unindexed_significant(&self, other: &NodeName) -> bool {
        self.name == other.name && self.index == other.index
    }

    /// Drops the index.
    pub fn suppress_index(&self) -> NodeName {
        Self::unindexed(self.name.clone())
    }

    /// Makes an implicit `[1]` explicit.
    pub fn force_index(&self) -> NodeName {
        Self::new(self.name.clone(), self.normalized_index())
    }

    /// Drops an index of `1`; keeps higher indices.
    pub fn minimally_indexed(&self) -> NodeName {
        if self.index == 1 {
            self.suppress_index()
        } else {
            self.clone()
        }
    }

    pub fn with_index(&self, index: u32) -> NodeName {
        Self::new(self.name.clone(), index)
    }
}

impl PartialEq for NodeName {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.normalized_index() == other.normalized_index()
    }
}

impl Eq for NodeName {}

impl Hash for NodeName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.normalized_index().hash(state);
    }
}

impl PartialOrd for NodeName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.normalized_index().cmp(&other.normalized_index()))
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.index)
        }
    }
}

impl FromStr for NodeName {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_unindexed() {
        let name = NodeName::parse("hippo:configuration").unwrap();
        assert_eq!(name.name(), "hippo:configuration");
        assert_eq!(name.index(), 0);
        assert!(!name.is_indexed());
    }

    #[test]
    fn test_parse_indexed() {
        let name = NodeName::parse("child[3]").unwrap();
        assert_eq!(name.name(), "child");
        assert_eq!(name.index(), 3);
        assert_eq!(name.to_string(), "child[3]");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "  ", "a/b", "a[", "a]", "[1]", "a[x]", "a[0]", "a[1]b", "a[[1]]"] {
            assert!(NodeName::parse(bad).is_err(), "expected '{}' to be rejected", bad);
        }
    }

    #[test]
    fn test_index_zero_equals_index_one() {
        for n in ["a", "hippo:foo", "x-y"] {
            let zero = NodeName::new(n, 0);
            let one = NodeName::new(n, 1);
            assert_eq!(zero, one);
            assert!(!zero.equals_unindexed_significant(&one));
            assert_eq!(zero.cmp(&one), Ordering::Equal);
        }
    }

    #[test]
    fn test_hash_consistent_with_eq() {
        let mut set = HashSet::new();
        set.insert(NodeName::new("a", 0));
        assert!(set.contains(&NodeName::new("a", 1)));
        assert!(!set.contains(&NodeName::new("a", 2)));
    }

    #[test]
    fn test_ordering() {
        let mut names = vec![
            NodeName::new("b", 0),
            NodeName::new("a", 2),
            NodeName::new("a", 0),
        ];
        names.sort();
        let rendered: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(rendered, vec!["a", "a[2]", "b"]);
    }

    #[test]
    fn test_index_transforms() {
        let name = NodeName::parse("a").unwrap();
        assert_eq!(name.force_index().to_string(), "a[1]");
        assert_eq!(name.force_index().minimally_indexed().to_string(), "a");
        assert_eq!(NodeName::new("a", 2).minimally_indexed().to_string(), "a[2]");
        assert_eq!(NodeName::new("a", 2).suppress_index().to_string(), "a");
    }
}
