//! Middleware and freeform handlers.

use crate::extend::{HandlerFn, RouteRule};

/// A cross-cutting, ordered, potentially request-terminating step that runs
/// before resource resolution.
#[derive(Clone)]
pub struct Middleware {
    pub rule: RouteRule,
    /// Lower priorities run earlier
    pub priority: i32,
    pub action: HandlerFn,
    /// Insertion sequence, the tiebreaker that keeps equal-priority
    /// middleware in registration order
    pub(crate) seq: u64,
}

impl Middleware {
    pub fn new(rule: RouteRule, priority: i32, action: HandlerFn) -> Self {
        Self {
            rule,
            priority,
            action,
            seq: 0,
        }
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("rule", &self.rule)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish()
    }
}

/// A catch-all route + handler pair, the lowest-precedence dispatch tier
#[derive(Clone)]
pub struct Handler {
    pub rule: RouteRule,
    pub action: HandlerFn,
}

impl Handler {
    pub fn new(rule: RouteRule, action: HandlerFn) -> Self {
        Self { rule, action }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("rule", &self.rule).finish()
    }
}
