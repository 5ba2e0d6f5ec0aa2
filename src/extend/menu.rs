//! Side menu tree for the admin surface.

use serde::Serialize;

/// One admin side-menu entry. The tree is two levels deep: root items and
/// one level of children, each list kept sorted by ascending priority.
#[derive(Debug, Clone, Serialize)]
pub struct SideMenuItem {
    pub title: String,
    /// `#` marks a non-navigable grouping node; when rendered with
    /// children its effective path becomes the first child's path
    pub path: String,
    pub children: Vec<SideMenuItem>,
    pub priority: i32,
    /// Permission required to see the entry; empty means everyone
    pub permission: String,
}

impl SideMenuItem {
    pub fn new(title: impl Into<String>, path: &str, priority: i32, permission: impl Into<String>) -> Self {
        let path = if path == "#" {
            "#".to_string()
        } else {
            format!("/admin/{}", path)
        };
        Self {
            title: title.into(),
            path,
            children: Vec::new(),
            priority,
            permission: permission.into(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.path == "#"
    }
}
