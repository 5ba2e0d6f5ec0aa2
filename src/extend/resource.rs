//! Resources: a single route + handler pair owned by an extension.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::extend::{HandlerFn, RouteRule};
use crate::flow::Flow;

/// Optional custom predicate consulted after the route rule matches
pub type WillHandleFn = Arc<dyn Fn(&Flow) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct Resource {
    pub rule: RouteRule,
    pub description: String,
    pub handler: HandlerFn,
    /// Allows overriding the default can-handle behavior
    pub will_handle: Option<WillHandleFn>,
}

impl Resource {
    pub fn new(rule: RouteRule, description: impl Into<String>, handler: HandlerFn) -> Self {
        Self {
            rule,
            description: description.into(),
            handler,
            will_handle: None,
        }
    }

    pub fn with_predicate(mut self, predicate: WillHandleFn) -> Self {
        self.will_handle = Some(predicate);
        self
    }

    /// A resource handles a request when its route rule matches and any
    /// custom predicate agrees.
    pub fn can_handle(&self, flow: &Flow) -> bool {
        if !self.rule.matches(flow.method().as_str(), flow.path()) {
            return false;
        }
        match &self.will_handle {
            Some(predicate) => predicate(flow),
            None => true,
        }
    }

    /// User-friendly, API-consumable description of this resource
    pub fn to_api_json(&self) -> Value {
        json!({
            "method": self.rule.method(),
            "path": self.rule.pattern(),
            "description": self.description,
        })
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("rule", &self.rule)
            .field("description", &self.description)
            .finish()
    }
}
