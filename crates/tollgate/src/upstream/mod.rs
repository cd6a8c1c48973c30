//! Upstream adapters and the contract they share.
//!
//! An adapter turns an [`InboundRequest`] into an [`OutboundRequest`] for one
//! fixed [`UpstreamTarget`], then reads the upstream reply according to the
//! target's [`ResponseMode`]. Only headers named by the target's forwarding
//! rules cross the gateway, so hop-by-hop and host headers never leak through.

mod anthropic;
mod error;
mod flux;
mod image;
mod openai;

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::header::{CONTENT_TYPE, HeaderName};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use serde_json::value::RawValue;
use tracing::debug;
use url::Url;

pub use anthropic::MessagesAdapter;
pub use error::GatewayError;
pub use flux::FluxAdapter;
pub use image::ImageFetchAdapter;
pub use openai::ImageGenerationAdapter;

// ============================================================================
// Requests
// ============================================================================

/// A request as received by the gateway. Not modified once dispatch begins.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(
        method: Method,
        headers: HeaderMap,
        query: HashMap<String, String>,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            headers,
            query,
            body,
        }
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Check that the body is a JSON document, returning it unchanged.
    pub fn json_body(&self) -> Result<Bytes, GatewayError> {
        serde_json::from_slice::<&RawValue>(&self.body)
            .map_err(|e| GatewayError::client(format!("request body must be JSON: {e}")))?;
        Ok(self.body.clone())
    }
}

/// A fully built call against an upstream, ready to send.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    /// Resolve the target endpoint and copy the forwarded headers.
    pub fn for_target(
        target: &UpstreamTarget,
        request: &InboundRequest,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            method: target.method.clone(),
            url: target.endpoint.resolve(request)?,
            headers: target.forwarded_headers(&request.headers),
            body: None,
        })
    }

    pub fn with_json_body(mut self, body: Bytes) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(body);
        self
    }

    fn into_builder(self, client: &Client) -> reqwest::RequestBuilder {
        let builder = client
            .request(self.method, self.url)
            .headers(self.headers);
        match self.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }
}

// ============================================================================
// Targets
// ============================================================================

/// How the upstream reply is handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    BufferedJson,
    BufferedBinary,
    Streamed,
}

impl ResponseMode {
    fn default_content_type(self) -> HeaderValue {
        match self {
            ResponseMode::BufferedJson => HeaderValue::from_static("application/json"),
            ResponseMode::BufferedBinary | ResponseMode::Streamed => {
                HeaderValue::from_static("application/octet-stream")
            }
        }
    }
}

/// Where an adapter sends its call.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Fixed(String),
    /// Absolute http(s) URL supplied by the caller in the named query parameter.
    FromQuery(&'static str),
}

impl Endpoint {
    fn resolve(&self, request: &InboundRequest) -> Result<String, GatewayError> {
        match self {
            Endpoint::Fixed(url) => Ok(url.clone()),
            Endpoint::FromQuery(param) => {
                let raw = request
                    .query_param(param)
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| {
                        GatewayError::client(format!("Missing '{param}' query parameter"))
                    })?;
                let url = Url::parse(raw).map_err(|e| {
                    GatewayError::client(format!("Invalid '{param}' query parameter: {e}"))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(GatewayError::client(format!(
                        "Unsupported URL scheme '{}'",
                        url.scheme()
                    )));
                }
                Ok(url.into())
            }
        }
    }
}

/// Copy one inbound header to an outbound header, value untouched.
#[derive(Debug, Clone)]
pub struct HeaderRule {
    pub inbound: HeaderName,
    pub outbound: HeaderName,
}

impl HeaderRule {
    pub fn same(name: HeaderName) -> Self {
        Self {
            inbound: name.clone(),
            outbound: name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub endpoint: Endpoint,
    pub method: Method,
    pub forward_headers: Vec<HeaderRule>,
    pub mode: ResponseMode,
    /// Cap on any buffered body, error bodies included. Ignored for streamed
    /// success replies.
    pub max_body_bytes: Option<usize>,
}

impl UpstreamTarget {
    pub fn forwarded_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for rule in &self.forward_headers {
            if let Some(value) = inbound.get(&rule.inbound) {
                headers.insert(rule.outbound.clone(), value.clone());
            }
        }
        headers
    }
}

// ============================================================================
// Replies
// ============================================================================

/// A successful upstream reply.
#[derive(Debug)]
pub enum UpstreamReply {
    Buffered {
        status: StatusCode,
        content_type: HeaderValue,
        body: Bytes,
    },
    /// Headers received; the body is still on the wire.
    Streamed {
        status: StatusCode,
        content_type: HeaderValue,
        response: reqwest::Response,
    },
}

impl UpstreamReply {
    pub fn status(&self) -> StatusCode {
        match self {
            UpstreamReply::Buffered { status, .. } | UpstreamReply::Streamed { status, .. } => {
                *status
            }
        }
    }
}

// ============================================================================
// Adapter contract
// ============================================================================

#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn target(&self) -> &UpstreamTarget;

    /// Build the outbound call. Performs no I/O.
    fn prepare(&self, request: &InboundRequest) -> Result<OutboundRequest, GatewayError>;

    /// Send the prepared call and read the reply per the target's mode.
    async fn call(
        &self,
        client: &Client,
        request: &InboundRequest,
    ) -> Result<UpstreamReply, GatewayError> {
        let outbound = self.prepare(request)?;
        debug!(upstream = self.name(), url = %outbound.url, "Sending upstream request");
        let response = outbound.into_builder(client).send().await?;
        read_reply(response, self.target()).await
    }
}

async fn read_reply(
    response: reqwest::Response,
    target: &UpstreamTarget,
) -> Result<UpstreamReply, GatewayError> {
    let status = response.status();
    let content_type = response.headers().get(CONTENT_TYPE).cloned();

    if !status.is_success() {
        let body = match target.max_body_bytes {
            Some(limit) => read_capped(response, limit).await?,
            None => response.bytes().await?,
        };
        return Err(GatewayError::UpstreamHttp {
            status,
            content_type,
            body,
        });
    }

    let content_type = content_type.unwrap_or_else(|| target.mode.default_content_type());

    if target.mode == ResponseMode::Streamed {
        return Ok(UpstreamReply::Streamed {
            status,
            content_type,
            response,
        });
    }

    let body = match target.max_body_bytes {
        Some(limit) => read_capped(response, limit).await?,
        None => response.bytes().await?,
    };

    Ok(UpstreamReply::Buffered {
        status,
        content_type,
        body,
    })
}

/// Read a body chunk by chunk, giving up as soon as it exceeds `limit`.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> Result<Bytes, GatewayError> {
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(GatewayError::PayloadTooLarge { limit });
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}
