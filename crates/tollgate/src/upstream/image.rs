//! Direct fetch of caller-supplied image URLs.

use async_trait::async_trait;
use axum::http::Method;

use super::{
    Endpoint, GatewayError, InboundRequest, OutboundRequest, ResponseMode, UpstreamAdapter,
    UpstreamTarget,
};

/// GETs the URL in the `url` query parameter. No caller headers are forwarded.
///
/// The buffered variant holds the whole image in memory up to a cap; the
/// streamed variant hands the body back as it arrives, uncapped.
pub struct ImageFetchAdapter {
    name: &'static str,
    target: UpstreamTarget,
}

impl ImageFetchAdapter {
    pub const URL_PARAM: &'static str = "url";

    pub fn buffered(max_bytes: usize) -> Self {
        Self::with_mode("image-fetch", ResponseMode::BufferedBinary, Some(max_bytes))
    }

    pub fn streamed() -> Self {
        Self::with_mode("image-stream", ResponseMode::Streamed, None)
    }

    fn with_mode(name: &'static str, mode: ResponseMode, max_body_bytes: Option<usize>) -> Self {
        Self {
            name,
            target: UpstreamTarget {
                endpoint: Endpoint::FromQuery(Self::URL_PARAM),
                method: Method::GET,
                forward_headers: Vec::new(),
                mode,
                max_body_bytes,
            },
        }
    }
}

#[async_trait]
impl UpstreamAdapter for ImageFetchAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    fn prepare(&self, request: &InboundRequest) -> Result<OutboundRequest, GatewayError> {
        OutboundRequest::for_target(&self.target, request)
    }
}
