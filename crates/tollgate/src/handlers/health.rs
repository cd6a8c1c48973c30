use axum::http::StatusCode;

/// GET /
pub async fn root() -> (StatusCode, &'static str) {
    (StatusCode::OK, "tollgate is running")
}

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

pub async fn readyz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
