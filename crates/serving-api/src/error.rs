//! Coded error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serving_lib::pipeline::{CodedError, ErrorClass};
use serving_lib::ErrorResponse;

/// HTTP status for a failure class
pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::ClientInput => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Conflict => StatusCode::CONFLICT,
        ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Computation | ErrorClass::Store => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Failure answered with `{"status": "<code>", "message": ...}`
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: u16,
    message: String,
}

impl ApiError {
    pub fn from_coded<E: CodedError>(err: &E) -> Self {
        Self {
            status: status_for(err.class()),
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: 400,
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: 500,
            message: "Internal error".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
