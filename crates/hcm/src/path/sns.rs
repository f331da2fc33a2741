//! Helpers for same-name-sibling names in their string form.

use super::node_name::NodeName;
use crate::error::PathError;

/// Splits `name[index]` into its name and index (`0` when unindexed).
pub fn split_indexed_name(name: &str) -> Result<(String, u32), PathError> {
    let parsed = NodeName::parse(name)?;
    Ok((parsed.name().to_string(), parsed.index()))
}

/// Returns `name[1]` for an unindexed name, the name itself otherwise.
pub fn create_indexed_name(name: &str) -> Result<String, PathError> {
    Ok(NodeName::parse(name)?.force_index().to_string())
}

/// True when `name` shares its unindexed name with at least one other
/// sibling.
pub fn has_sns<'a, I>(name: &str, siblings: I) -> Result<bool, PathError>
where
    I: IntoIterator<Item = &'a str>,
{
    let name = NodeName::parse(name)?;
    for sibling in siblings {
        let sibling = NodeName::parse(sibling)?;
        if sibling.name() == name.name() && sibling != name {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_indexed_name() {
        assert_eq!(split_indexed_name("a").unwrap(), ("a".to_string(), 0));
        assert_eq!(split_indexed_name("a[4]").unwrap(), ("a".to_string(), 4));
        assert!(split_indexed_name("a[").is_err());
    }

    #[test]
    fn test_create_indexed_name() {
        assert_eq!(create_indexed_name("a").unwrap(), "a[1]");
        assert_eq!(create_indexed_name("a[3]").unwrap(), "a[3]");
    }

    #[test]
    fn test_has_sns() {
        assert!(!has_sns("a", ["a", "b"]).unwrap());
        assert!(!has_sns("a", ["a[1]", "b"]).unwrap());
        assert!(has_sns("a", ["a", "a[2]"]).unwrap());
        assert!(has_sns("a[2]", ["a", "b"]).unwrap());
    }
}
