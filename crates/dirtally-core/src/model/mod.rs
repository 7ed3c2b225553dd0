/// Data model for the DirTally tree.
///
/// Re-exports the slot-arena tree and supporting types.
pub mod attributes;
pub mod format;
pub mod node;
pub mod tree;

pub use attributes::{Attributes, FileAttributes};
pub use node::{Node, NodeIndex, NodeKind, FREE_SPACE_NAME, UNKNOWN_NAME};
pub use tree::{Descendants, DirTree};
