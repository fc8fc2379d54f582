//! Route definitions for the storefront statistics API.

pub mod dashboard;
pub mod health;
pub mod orders;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::AppState;

const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Full application router, shared by the server binary and integration tests.
pub fn router(state: AppState) -> Router {
    let dashboard_routes = Router::new()
        .route("/dashboard/data", get(dashboard::data))
        .route("/dashboard/events", get(dashboard::events))
        .route("/dashboard/details/{stat}", get(dashboard::details))
        .route("/dashboard/embed", get(dashboard::embed));

    let order_routes = Router::new()
        .route("/orders/{id}/status", patch(orders::update_status))
        .route("/orders/{id}/deliver", post(orders::deliver));

    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .nest("/admin", dashboard_routes.merge(order_routes))
        .layer(cors(&state.config.frontend_url))
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    match frontend_url.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(frontend_url, "Invalid FRONTEND_URL, allowing any origin");
            layer.allow_origin(Any)
        }
    }
}
