//! fal.run Flux image generation.
//!
//! The caller embeds its fal.run key in the request body:
//!
//! ```json
//! { "apiKey": "...", "params": { "prompt": "..." } }
//! ```
//!
//! `fluxApiKey` is accepted as an alias for `apiKey`. The key becomes an
//! `Authorization: Key <key>` header and only `params` is sent upstream,
//! byte for byte.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, Method};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::value::RawValue;

use super::{
    Endpoint, GatewayError, InboundRequest, OutboundRequest, ResponseMode, UpstreamAdapter,
    UpstreamTarget,
};

pub struct FluxAdapter {
    target: UpstreamTarget,
}

#[derive(Deserialize)]
struct FluxRequest {
    #[serde(rename = "apiKey", alias = "fluxApiKey")]
    api_key: Option<String>,
    params: Option<Box<RawValue>>,
}

impl FluxAdapter {
    pub fn new(url: &str) -> Self {
        Self {
            target: UpstreamTarget {
                endpoint: Endpoint::Fixed(url.to_string()),
                method: Method::POST,
                forward_headers: Vec::new(),
                mode: ResponseMode::BufferedJson,
                max_body_bytes: None,
            },
        }
    }
}

#[async_trait]
impl UpstreamAdapter for FluxAdapter {
    fn name(&self) -> &'static str {
        "flux"
    }

    fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    fn prepare(&self, request: &InboundRequest) -> Result<OutboundRequest, GatewayError> {
        let parsed: FluxRequest = serde_json::from_slice(&request.body)
            .map_err(|e| GatewayError::client(format!("Invalid Flux request body: {e}")))?;

        let api_key = parsed
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GatewayError::client("Missing 'apiKey' in request body"))?;
        let params = parsed
            .params
            .ok_or_else(|| GatewayError::client("Missing 'params' in request body"))?;

        let mut authorization = HeaderValue::try_from(format!("Key {api_key}"))
            .map_err(|_| GatewayError::client("'apiKey' contains invalid characters"))?;
        authorization.set_sensitive(true);

        let mut outbound = OutboundRequest::for_target(&self.target, request)?
            .with_json_body(Bytes::copy_from_slice(params.get().as_bytes()));
        outbound.headers.insert(AUTHORIZATION, authorization);
        Ok(outbound)
    }
}
