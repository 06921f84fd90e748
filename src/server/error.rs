use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// 错误响应
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// 错误码，例如 DECODE_ERROR
    pub code: String,
    pub message: String,
}

/// API错误类型
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    body: ErrorBody,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self { status, body: ErrorBody { code: code.to_owned(), message: message.into() } }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing or invalid bearer token")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// 错误对应的 HTTP 状态码
pub fn status_of(err: &Error) -> StatusCode {
    match err {
        Error::Decode(_) | Error::DimensionMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Extraction(_) if err.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Extraction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Timeout(..) => StatusCode::GATEWAY_TIMEOUT,
        Error::Storage(_) | Error::Migrate(_) | Error::Task(_) | Error::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self::new(status_of(&err), err.code(), err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::Decode("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::DimensionMismatch { expected: 1, actual: 2 }, StatusCode::UNPROCESSABLE_ENTITY),
            (Error::Decode("x".into()).into_extraction(), StatusCode::UNPROCESSABLE_ENTITY),
            (
                Error::Io(std::io::Error::other("disk")).into_extraction(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (Error::NotFound("a".into()), StatusCode::NOT_FOUND),
            (Error::Timeout("query", Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }
}
