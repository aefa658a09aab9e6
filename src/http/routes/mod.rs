pub mod batch;
pub mod crawl;
pub mod map;
pub mod scrape;
pub mod stubs;
pub mod watch;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::WebPeelError;

/// Shared error envelope: `{"error": "<kind>", "message": "<human>", "detail"?: "<debug>"}`.
/// `detail` is only populated outside production (section 7).
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

pub(crate) fn error_response(err: &WebPeelError, production: bool) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let detail = (!production).then(|| format!("{err:?}"));
    let body = ErrorBody { error: err.kind().to_string(), message: err.to_string(), detail };
    (status, axum::Json(body)).into_response()
}

pub(crate) fn not_implemented(collaborator: &str) -> Response {
    let body = ErrorBody {
        error: "not_implemented".to_string(),
        message: format!("{collaborator} is an external collaborator not implemented by this core"),
        detail: None,
    };
    (StatusCode::NOT_IMPLEMENTED, axum::Json(body)).into_response()
}
