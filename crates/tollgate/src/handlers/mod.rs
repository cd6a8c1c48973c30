//! HTTP request handlers.

mod health;
mod image;
mod proxy;

use std::collections::HashMap;

use axum::http::{HeaderMap, Method};
use bytes::Bytes;

use crate::dispatch::Route;
use crate::server::AppState;
use crate::upstream::{GatewayError, InboundRequest, UpstreamReply};

pub use health::{livez, readyz, root};
pub use image::{fetch_image, stream_image};
pub use proxy::{flux_generate, image_generations, messages};

async fn forward(
    state: &AppState,
    route: Route,
    method: Method,
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: Bytes,
) -> Result<UpstreamReply, GatewayError> {
    let request = InboundRequest::new(method, headers, query, body);
    state.dispatcher.dispatch(route, request).await
}
