//! Repository path value types.

pub mod node_name;
pub mod node_path;
pub mod pattern;
pub mod sns;

pub use node_name::NodeName;
pub use node_path::NodePath;
pub use pattern::{PathPattern, PathPatterns};
