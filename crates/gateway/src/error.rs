//! Error shapes for the admin HTTP surface (spec section 6).
//!
//! A send failure surfaces as a 500 with `{"error": <message>}`; a status
//! lookup against a tenant with no session surfaces as a 200 with
//! `{"tenantId": ..., "status": "not_found"}` rather than an HTTP 404 —
//! the client always gets a parseable status body back, the same way
//! `holler::mcp`'s JSON-RPC error envelope never relies on the transport
//! status code to carry meaning.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use signal::SendError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Wraps a [`SendError`] for the admin surface: every send failure maps
/// to a 500 regardless of `ErrorClass`, since by the time it reaches the
/// HTTP boundary the router has already exhausted retries and fallback.
pub struct ApiError(pub SendError);

impl From<SendError> for ApiError {
    fn from(err: SendError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: self.0.message })).into_response()
    }
}
