//! Gateway error types.

use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderValue, StatusCode};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while serving a request through an upstream.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed input from the caller
    #[error("{0}")]
    Client(String),

    /// Inbound body could not be read (over the size limit, aborted upload)
    #[error(transparent)]
    BodyRejected(#[from] BytesRejection),

    /// Upstream answered with a non-2xx status
    #[error("upstream returned status {status}")]
    UpstreamHttp {
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },

    /// No response reached the gateway (DNS, connect, timeout, dropped body)
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream body larger than the buffering cap
    #[error("upstream response exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn client(message: impl Into<String>) -> Self {
        GatewayError::Client(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal(message.into())
    }

    /// Stable identifier used in JSON error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Client(_) | GatewayError::BodyRejected(_) => "client_error",
            GatewayError::UpstreamHttp { .. } => "upstream_http_error",
            GatewayError::UpstreamUnreachable(_) => "upstream_unreachable",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Client(_) => StatusCode::BAD_REQUEST,
            GatewayError::BodyRejected(rejection) => rejection.status(),
            GatewayError::UpstreamHttp { status, .. } => *status,
            GatewayError::UpstreamUnreachable(_) | GatewayError::PayloadTooLarge { .. } => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            GatewayError::UpstreamUnreachable(err.to_string())
        } else {
            GatewayError::Internal(err.to_string())
        }
    }
}
