//! Glob patterns over repository paths.

use glob::{MatchOptions, Pattern};

use super::node_path::NodePath;
use crate::error::PathError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled path pattern.
///
/// `*` matches within one segment and a trailing `/**` matches any
/// descendant. Everything else is literal, including the `[n]` of a
/// same-name-sibling index.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    pattern: Pattern,
}

impl PathPattern {
    /// Compiles a repository path pattern.
    pub fn new(pattern: &str) -> Result<Self, PathError> {
        let escaped = escape_brackets(pattern);
        let compiled = Pattern::new(&escaped).map_err(|e| PathError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            pattern: compiled,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when `path` matches this pattern.
    pub fn matches(&self, path: &NodePath) -> bool {
        self.pattern
            .matches_with(&path.to_string(), MATCH_OPTIONS)
    }

    pub fn matches_str(&self, path: &str) -> bool {
        self.pattern.matches_with(path, MATCH_OPTIONS)
    }
}

/// An ordered set of path patterns, matching when any member matches.
#[derive(Debug, Clone, Default)]
pub struct PathPatterns {
    patterns: Vec<PathPattern>,
}

impl PathPatterns {
    /// Compiles each entry as the exact path plus its `/**` descendants.
    pub fn with_descendants<'a, I>(paths: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut patterns = Vec::new();
        for path in paths {
            let trimmed = path.trim();
            if trimmed.ends_with("/**") {
                patterns.push(PathPattern::new(trimmed)?);
                let exact = trimmed.trim_end_matches("/**");
                patterns.push(PathPattern::new(if exact.is_empty() { "/" } else { exact })?);
                continue;
            }
            patterns.push(PathPattern::new(trimmed)?);
            let wildcard = if trimmed == "/" {
                "/**".to_string()
            } else {
                format!("{}/**", trimmed.trim_end_matches('/'))
            };
            patterns.push(PathPattern::new(&wildcard)?);
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, path: &NodePath) -> bool {
        let rendered = path.to_string();
        self.patterns.iter().any(|p| p.matches_str(&rendered))
    }

    /// True when one of the source patterns is exactly `/`.
    pub fn contains_root(&self) -> bool {
        self.patterns.iter().any(|p| p.as_str() == "/")
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathPattern> {
        self.patterns.iter()
    }
}

/// Brackets in repository names are literal index markers, not glob
/// character classes.
fn escape_brackets(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '[' => escaped.push_str("[[]"),
            ']' => escaped.push_str("[]]"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NodePath {
        NodePath::parse(s).unwrap()
    }

    #[test]
    fn test_descendant_expansion() {
        let patterns = PathPatterns::with_descendants(["/hippo:configuration/hippo:users"]).unwrap();
        assert!(patterns.matches(&p("/hippo:configuration/hippo:users")));
        assert!(patterns.matches(&p("/hippo:configuration/hippo:users/admin/x")));
        assert!(!patterns.matches(&p("/hippo:configuration/hippo:usersx")));
        assert!(!patterns.matches(&p("/hippo:configuration")));
    }

    #[test]
    fn test_root_matches_everything() {
        let patterns = PathPatterns::with_descendants(["/"]).unwrap();
        assert!(patterns.contains_root());
        assert!(patterns.matches(&p("/")));
        assert!(patterns.matches(&p("/a/b/c")));
    }

    #[test]
    fn test_single_segment_wildcard() {
        let pattern = PathPattern::new("/content/*/foo").unwrap();
        assert!(pattern.matches(&p("/content/documents/foo")));
        assert!(!pattern.matches(&p("/content/a/b/foo")));
    }

    #[test]
    fn test_brackets_are_literal() {
        let patterns = PathPatterns::with_descendants(["/a[2]"]).unwrap();
        assert!(patterns.matches(&p("/a[2]/b")));
        assert!(!patterns.matches(&p("/a/b")));
    }
}
