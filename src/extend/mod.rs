//! Extension surface: route rules, resources, extensions, middleware,
//! admin pages, side menu, and the registry that owns them all.

pub mod admin;
pub mod extension;
pub mod menu;
pub mod middleware;
pub mod registry;
pub mod route;
pub mod resource;

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::flow::Flow;

pub use admin::{match_template, AdminPage, RenderFn};
pub use extension::{Extension, InitHook};
pub use menu::SideMenuItem;
pub use middleware::{Handler, Middleware};
pub use registry::{Registry, RegistryError};
pub use resource::{Resource, WillHandleFn};
pub use route::{RouteError, RouteRule};

/// Boxed future returned by middleware actions and resource handlers
pub type HandlerFuture = BoxFuture<'static, ()>;

/// A middleware action or terminal handler bound to a request flow
pub type HandlerFn = Arc<dyn Fn(Arc<Flow>) -> HandlerFuture + Send + Sync>;

/// Box an async fn into a [`HandlerFn`]
pub fn handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Arc<Flow>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |flow| Box::pin(f(flow)))
}

/// Box an async fn into a [`RenderFn`] for admin pages
pub fn render<F, Fut>(f: F) -> RenderFn
where
    F: Fn(Arc<Flow>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, crate::error::ApiError>> + Send + 'static,
{
    Arc::new(move |flow| Box::pin(f(flow)))
}
