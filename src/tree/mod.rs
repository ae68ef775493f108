//! Generic tree skeleton shared by the R*-tree and M-tree families.

pub mod core;
pub mod node;
pub mod path;

pub use self::core::{TreeCore, TreeStats};
pub use node::{Node, TreeEntry, TreeHeader};
pub use path::TreePath;
