use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jobdex_core::Error;

/// Error body returned by every endpoint: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self { ApiError(StatusCode::UNAUTHORIZED, msg.into()) }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateDocumentId(_) => StatusCode::CONFLICT,
            Error::UnsupportedModel(_) | Error::InvalidResultCount(_) => StatusCode::BAD_REQUEST,
            Error::IndexBuildFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::QueryTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::IncompatibleFormat { .. } | Error::CorruptIndex(_) | Error::Io(_) | Error::Encode(_) | Error::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}
