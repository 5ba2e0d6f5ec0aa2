//! Admin pages and their route templates.
//!
//! Admin page routes are slash-separated templates like `docs/{id}`. The
//! matching algorithm is deliberately stricter than, and independent from,
//! resource route rules: segment counts must match exactly, `{name}`
//! segments always match and capture, and literal segments compare exactly.
//! There is no prefix matching here.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::ApiError;
use crate::flow::Flow;

/// Renders the page body; the surrounding chrome is the caller's concern
pub type RenderFn =
    Arc<dyn Fn(Arc<Flow>) -> BoxFuture<'static, Result<String, ApiError>> + Send + Sync>;

#[derive(Clone)]
pub struct AdminPage {
    /// Route template relative to `/admin/`, e.g. `docs/{id}`
    pub route: String,
    pub render: RenderFn,
    /// Permission required to view the page; empty means everyone
    pub permission: String,
}

impl AdminPage {
    pub fn new(route: impl Into<String>, render: RenderFn) -> Self {
        Self {
            route: route.into(),
            render,
            permission: String::new(),
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = permission.into();
        self
    }
}

impl std::fmt::Debug for AdminPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminPage")
            .field("route", &self.route)
            .field("permission", &self.permission)
            .finish()
    }
}

/// Match a path against a segment template, capturing `{name}` segments.
/// Returns `None` when the segment counts differ or a literal mismatches.
pub fn match_template(path: &str, template: &str) -> Option<BTreeMap<String, String>> {
    let path_parts: Vec<&str> = path.split('/').collect();
    let template_parts: Vec<&str> = template.split('/').collect();

    if path_parts.len() != template_parts.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    for (segment, pattern) in path_parts.iter().zip(template_parts.iter()) {
        if pattern.starts_with('{') && pattern.ends_with('}') {
            let name = &pattern[1..pattern.len() - 1];
            params.insert(name.to_string(), segment.to_string());
            continue;
        }
        if segment != pattern {
            return None;
        }
    }

    Some(params)
}
