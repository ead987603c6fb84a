//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use routes::{create_router, AppState};

/// Build the application router: `/health` plus the API under `/api`.
///
/// Layers run outermost first: CORS, tracing, correlation id, operation
/// context, request logging, then the handler.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .nest("/api", create_router())
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn(middleware::context_middleware))
        .layer(PropagateRequestIdLayer::new(middleware::CORRELATION_ID_HEADER))
        .layer(SetRequestIdLayer::new(
            middleware::CORRELATION_ID_HEADER,
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
