use crate::handlers::{self, AppState};
use crate::live_handler;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Largest accepted request body. Pasted raw text is the biggest input.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// API routes without the per-IP rate limiter, which needs the peer
/// address and is added by the binary.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/provinces", get(handlers::list_provinces))
        .route(
            "/api/v1/config",
            get(handlers::get_provider_config).put(handlers::put_provider_config),
        )
        .route("/api/v1/sessions", post(handlers::create_session))
        .route("/api/v1/sessions/:id", get(handlers::get_session))
        .route("/api/v1/sessions/:id/search", post(handlers::search))
        .route("/api/v1/sessions/:id/more", post(handlers::search_more))
        .route("/api/v1/sessions/:id/raw", post(handlers::process_raw))
        .route(
            "/api/v1/sessions/:id/analytics",
            get(handlers::session_analytics),
        )
        .route("/api/v1/sessions/:id/export.csv", get(handlers::export_csv))
        .route(
            "/api/v1/sessions/:id/chat",
            get(handlers::get_chat).post(handlers::send_chat),
        )
        .route("/api/v1/live", get(live_handler::live_socket))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)))
}

/// Full application router with health check, tracing and CORS.
pub fn create_router(state: Arc<AppState>) -> Router {
    build_router(state, api_routes())
}

/// Mounts `api` next to the health check, which stays outside any layer
/// the caller put on `api`.
pub fn build_router(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
