//! OpenAI image generation.

use async_trait::async_trait;
use axum::http::Method;
use axum::http::header::AUTHORIZATION;

use super::{
    Endpoint, GatewayError, HeaderRule, InboundRequest, OutboundRequest, ResponseMode,
    UpstreamAdapter, UpstreamTarget,
};

/// Forwards the caller's `Authorization` header and JSON body to the images API.
pub struct ImageGenerationAdapter {
    target: UpstreamTarget,
}

impl ImageGenerationAdapter {
    pub const PATH: &'static str = "/v1/images/generations";

    pub fn new(base_url: &str) -> Self {
        Self {
            target: UpstreamTarget {
                endpoint: Endpoint::Fixed(format!(
                    "{}{}",
                    base_url.trim_end_matches('/'),
                    Self::PATH
                )),
                method: Method::POST,
                forward_headers: vec![HeaderRule::same(AUTHORIZATION)],
                mode: ResponseMode::BufferedJson,
                max_body_bytes: None,
            },
        }
    }
}

#[async_trait]
impl UpstreamAdapter for ImageGenerationAdapter {
    fn name(&self) -> &'static str {
        "openai-images"
    }

    fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    fn prepare(&self, request: &InboundRequest) -> Result<OutboundRequest, GatewayError> {
        let body = request.json_body()?;
        Ok(OutboundRequest::for_target(&self.target, request)?.with_json_body(body))
    }
}
