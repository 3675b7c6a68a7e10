pub mod health;

use axum::routing::get;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::state::AppState;
use crate::ws;

/// Build the application router: the WebSocket endpoint at `/` plus the
/// health check, with panic recovery and request tracing.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .merge(health::router())
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
