//! Anthropic messages API.

use async_trait::async_trait;
use axum::http::Method;
use axum::http::header::HeaderName;

use super::{
    Endpoint, GatewayError, HeaderRule, InboundRequest, OutboundRequest, ResponseMode,
    UpstreamAdapter, UpstreamTarget,
};

/// Forwards `x-api-key` and `anthropic-version` verbatim. `Authorization` is never sent.
pub struct MessagesAdapter {
    target: UpstreamTarget,
}

impl MessagesAdapter {
    pub const PATH: &'static str = "/v1/messages";

    pub fn new(base_url: &str) -> Self {
        Self {
            target: UpstreamTarget {
                endpoint: Endpoint::Fixed(format!(
                    "{}{}",
                    base_url.trim_end_matches('/'),
                    Self::PATH
                )),
                method: Method::POST,
                forward_headers: vec![
                    HeaderRule::same(HeaderName::from_static("x-api-key")),
                    HeaderRule::same(HeaderName::from_static("anthropic-version")),
                ],
                mode: ResponseMode::BufferedJson,
                max_body_bytes: None,
            },
        }
    }
}

#[async_trait]
impl UpstreamAdapter for MessagesAdapter {
    fn name(&self) -> &'static str {
        "anthropic-messages"
    }

    fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    fn prepare(&self, request: &InboundRequest) -> Result<OutboundRequest, GatewayError> {
        let body = request.json_body()?;
        Ok(OutboundRequest::for_target(&self.target, request)?.with_json_body(body))
    }
}
