//! Outward response shapes.
//!
//! Gateway-originated errors are JSON `{"error": <kind>, "message": <text>}`.
//! Upstream error bodies are re-emitted unmodified with the upstream status.
//!
//! A streamed reply that fails after headers were sent cannot change its
//! status; the body stream ends with an error, which aborts the connection
//! and leaves the client with a truncated body.

use axum::Json;
use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use serde::Serialize;
use tracing::warn;

use crate::upstream::{GatewayError, UpstreamReply};

const UNREACHABLE_MESSAGE: &str = "Upstream service unreachable";
const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

pub fn error(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: kind.to_string(),
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

pub fn not_found(message: impl Into<String>) -> Response {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        match self {
            GatewayError::UpstreamHttp {
                status,
                content_type,
                body,
            } => match content_type {
                Some(content_type) => (status, [(CONTENT_TYPE, content_type)], body).into_response(),
                None => (status, body).into_response(),
            },
            GatewayError::UpstreamUnreachable(_) => error(status, kind, UNREACHABLE_MESSAGE),
            GatewayError::Internal(_) => error(status, kind, INTERNAL_MESSAGE),
            other => error(status, kind, other.to_string()),
        }
    }
}

impl IntoResponse for UpstreamReply {
    fn into_response(self) -> Response {
        match self {
            UpstreamReply::Buffered {
                status,
                content_type,
                body,
            } => (status, [(CONTENT_TYPE, content_type)], body).into_response(),
            UpstreamReply::Streamed {
                status,
                content_type,
                response,
            } => {
                let stream = response.bytes_stream().inspect_err(|e| {
                    warn!(error = %e, "Upstream stream failed after headers were sent, truncating");
                });
                (status, [(CONTENT_TYPE, content_type)], Body::from_stream(stream))
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use bytes::Bytes;
    use http_body_util::BodyExt;

    async fn body_bytes(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn client_error_is_400_json() {
        let response = GatewayError::client("Missing 'url' query parameter").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["error"], "client_error");
        assert_eq!(json["message"], "Missing 'url' query parameter");
    }

    #[tokio::test]
    async fn upstream_error_body_passes_through() {
        let response = GatewayError::UpstreamHttp {
            status: StatusCode::TOO_MANY_REQUESTS,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from_static(br#"{"type":"error"}"#),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_bytes(response).await, r#"{"type":"error"}"#);
    }

    #[tokio::test]
    async fn unreachable_hides_details() {
        let response =
            GatewayError::UpstreamUnreachable("dns error: no such host".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["error"], "upstream_unreachable");
        assert_eq!(json["message"], UNREACHABLE_MESSAGE);
    }

    #[tokio::test]
    async fn internal_error_is_500() {
        let response = GatewayError::internal("task aborted").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["message"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn buffered_reply_keeps_content_type() {
        let response = UpstreamReply::Buffered {
            status: StatusCode::OK,
            content_type: HeaderValue::from_static("image/png"),
            body: Bytes::from_static(b"\x89PNG"),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/png");
        assert_eq!(body_bytes(response).await, Bytes::from_static(b"\x89PNG"));
    }

    #[tokio::test]
    async fn not_found_is_json() {
        let response = not_found("No route for /nope");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["error"], "not_found");
    }
}
