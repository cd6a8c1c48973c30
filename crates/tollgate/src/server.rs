use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::cors;
use crate::dispatch::Dispatcher;
use crate::handlers;
use crate::response;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

pub fn build_app(state: AppState, config: &ServerConfig) -> Router {
    let proxy = Router::new()
        .route("/v1/images/generations", post(handlers::image_generations))
        .route("/flux/generate", post(handlers::flux_generate))
        .route("/image", get(handlers::stream_image));

    let limited = Router::new()
        .route("/", get(handlers::root))
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/fetch-image", get(handlers::fetch_image))
        .nest("/proxy", proxy)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes));

    // Merged after the limit layer so the cap never wraps it.
    let unlimited = Router::new()
        .route("/proxy/v1/messages", post(handlers::messages))
        .layer(DefaultBodyLimit::disable());

    limited
        .merge(unlimited)
        .fallback(fallback)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            Duration::from_secs(config.request_timeout_seconds),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(cors::cors))
}

async fn fallback(request: Request) -> Response {
    response::not_found(format!("No route for {} {}", request.method(), request.uri().path()))
}

async fn method_not_allowed(request: Request) -> Response {
    response::error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        format!("{} is not allowed on {}", request.method(), request.uri().path()),
    )
}
