//! Request dispatch.
//!
//! One dispatcher instance serves every request: it runs the ordered
//! middleware pipeline, then resolves exactly one terminal handler —
//! extension resources first (registration order), freeform handlers
//! second — and invokes it inside a uniform panic-recovery boundary.

pub mod server;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::StatusCode;
use futures::FutureExt;

use crate::extend::{HandlerFn, Registry};
use crate::flow::Flow;

/// Typed flow extension giving handlers access to the registry (admin
/// pages, menu, extension introspection)
#[derive(Clone)]
pub struct RegistryHandle(pub Arc<Registry>);

pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Drive one request through middleware, resolution, and handling.
    /// On return the flow's accumulated response is final.
    pub async fn dispatch(&self, flow: Arc<Flow>) {
        flow.insert_extension(RegistryHandle(self.registry.clone()));

        // MIDDLEWARE: globally ordered; any entry may terminate the flow,
        // in which case the response is whatever that entry wrote
        for middleware in self.registry.middleware() {
            if !middleware.rule.matches(flow.method().as_str(), flow.path()) {
                continue;
            }
            tracing::debug!(pattern = %middleware.rule.pattern(), "Running middleware");
            if self.invoke(&middleware.action, &flow).await.is_err() {
                return;
            }
            if flow.is_terminated() {
                return;
            }
        }

        // RESOLVE: extensions in registration order, resources within each
        // in registration order; the first match is the only handler that
        // will ever run for this request
        for extension in self.registry.extensions() {
            for resource in &extension.resources {
                if resource.can_handle(&flow) {
                    tracing::debug!(
                        extension = %extension.name,
                        pattern = %resource.rule.pattern(),
                        "Running resource"
                    );
                    let _ = self.invoke(&resource.handler, &flow).await;
                    return;
                }
            }
        }

        // Freeform handlers are the lowest-precedence tier
        for handler in self.registry.handlers() {
            if handler.rule.matches(flow.method().as_str(), flow.path()) {
                tracing::debug!(pattern = %handler.rule.pattern(), "Running handler");
                let _ = self.invoke(&handler.action, &flow).await;
                return;
            }
        }

        tracing::warn!(method = %flow.method(), path = %flow.path(), "No handler found");
        flow.write_error_json(StatusCode::NOT_FOUND, "Not found");
    }

    /// Single recovery boundary: a panic anywhere in a middleware action,
    /// resource, or handler becomes a generic internal-error response
    /// instead of tearing down the worker.
    async fn invoke(&self, action: &HandlerFn, flow: &Arc<Flow>) -> Result<(), ()> {
        match AssertUnwindSafe(action(flow.clone())).catch_unwind().await {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::error!(
                    method = %flow.method(),
                    path = %flow.path(),
                    "Handler panicked"
                );
                flow.write_error_json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                );
                Err(())
            }
        }
    }
}
