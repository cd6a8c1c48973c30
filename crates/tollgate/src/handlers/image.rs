//! Remote image fetch handlers.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;

use crate::dispatch::Route;
use crate::server::AppState;
use crate::upstream::{GatewayError, UpstreamReply};

/// GET /fetch-image?url=<URL>
///
/// Buffered and size-capped; waits for an admission slot.
pub async fn fetch_image(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<UpstreamReply, GatewayError> {
    super::forward(&state, Route::FetchImage, method, headers, query, Bytes::new()).await
}

/// GET /proxy/image?url=<URL>
///
/// Pipes the upstream body through as it arrives.
pub async fn stream_image(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<UpstreamReply, GatewayError> {
    super::forward(&state, Route::StreamImage, method, headers, query, Bytes::new()).await
}
