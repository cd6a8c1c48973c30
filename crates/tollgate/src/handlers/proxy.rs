//! Credential-forwarding API proxy handlers.

use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;

use crate::dispatch::Route;
use crate::server::AppState;
use crate::upstream::{GatewayError, UpstreamReply};

/// POST /proxy/v1/images/generations
pub async fn image_generations(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<UpstreamReply, GatewayError> {
    super::forward(
        &state,
        Route::ImageGenerations,
        method,
        headers,
        Default::default(),
        body?,
    )
    .await
}

/// POST /proxy/v1/messages
pub async fn messages(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<UpstreamReply, GatewayError> {
    super::forward(&state, Route::Messages, method, headers, Default::default(), body?).await
}

/// POST /proxy/flux/generate
///
/// Request body: `{"apiKey": "...", "params": {...}}`
pub async fn flux_generate(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<UpstreamReply, GatewayError> {
    super::forward(&state, Route::FluxGenerate, method, headers, Default::default(), body?).await
}
