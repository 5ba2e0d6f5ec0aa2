//! HTTP wiring: every inbound request funnels through one catch-all axum
//! route into the dispatcher.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::dispatch::Dispatcher;
use crate::flow::Flow;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_size: usize,
}

/// Build the axum router. The host owns routing itself, so axum sees just
/// a catch-all pair plus the global layers.
pub fn router(dispatcher: Arc<Dispatcher>, max_body_size: usize) -> Router {
    let state = AppState {
        dispatcher,
        max_body_size,
    };

    Router::new()
        .route("/", any(dispatch_request))
        .route("/*path", any(dispatch_request))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn dispatch_request(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, state.max_body_size).await.unwrap_or_default();

    let flow = Arc::new(Flow::new(parts, body));
    state.dispatcher.dispatch(flow.clone()).await;
    flow.to_response()
}

/// Bind and serve until shutdown
pub async fn serve(router: Router, port: u16) -> Result<(), std::io::Error> {
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(address = %bind_addr, "Server listening");
    axum::serve(listener, router).await
}
