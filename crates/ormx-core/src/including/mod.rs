//! Association/Including trees and mandatory-include rules.

mod forced;
mod tree;

pub use forced::{force_includes, mandatory_members};
pub use tree::{IncludeNode, IncludingTree, NodeKind};
