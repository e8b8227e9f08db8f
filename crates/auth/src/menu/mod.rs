//! Versioned menu catalog, menu permission levels and tree assembly.

pub mod document;
pub mod level;
pub mod tree;

pub use document::{MenuDocumentError, MenuSpec, flatten_menus, parse_menu_document};
pub use level::{PermissionLevel, merge_permission_levels};
pub use tree::{
    MenuAnnotation, MenuNode, MenuTreeNode, MenuVersion, annotate, build_tree, filter_authorized,
};
