use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::engine::EngineError;
use crate::observability::error_label;

/// JSON error body: `{"error": message, "code": code}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", "admin only")
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Forbidden => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Capacity { .. }
            | EngineError::AlreadyCancelled(_)
            | EngineError::AlreadyExists(_) => StatusCode::CONFLICT,
            EngineError::LimitExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::WalError(_) => {
                tracing::error!("engine fault: {err}");
                return Self::new(StatusCode::INTERNAL_SERVER_ERROR, error_label(&err), "internal error");
            }
        };
        Self::new(status, error_label(&err), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message, "code": self.code }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn engine_errors_map_to_codes() {
        let cases = [
            (EngineError::Validation("x".into()), 400, "validation"),
            (EngineError::Forbidden, 403, "forbidden"),
            (EngineError::NotFound(Ulid::new()), 404, "not_found"),
            (EngineError::Capacity { room_type_id: Ulid::new() }, 409, "capacity"),
            (EngineError::AlreadyCancelled(Ulid::new()), 409, "already_cancelled"),
            (EngineError::AlreadyExists("room 101".into()), 409, "conflict"),
            (EngineError::LimitExceeded("x"), 422, "limit_exceeded"),
            (EngineError::Transient("busy"), 503, "transient"),
            (EngineError::WalError("disk full".into()), 500, "internal"),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status.as_u16(), status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn internal_errors_hide_detail() {
        let api = ApiError::from(EngineError::WalError("/var/data: disk full".into()));
        assert_eq!(api.message, "internal error");
    }
}
