//! 版本历史：只追加的树形 arena 与树视图

pub mod store;
pub mod tree;

pub use store::{NewVersion, VersionHistory, VersionInputs, VersionKind, VersionNode};
pub use tree::{render_tree, TreeLine};
