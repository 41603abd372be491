use application::{ApplicationError, AuthError};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::response::Envelope;

const GENERIC_FAILURE: &str = "Something went wrong.";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Envelope,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: Envelope::failure(message, false),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 鉴权已通过之后的失败，响应中保留 is_authenticated=true
    pub fn authenticated(mut self) -> Self {
        self.body.is_authenticated = true;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Validation(message) | ApplicationError::Protocol(message) => {
                ApiError::bad_request(message)
            }
            ApplicationError::Unauthorized(message) => {
                ApiError::new(StatusCode::UNAUTHORIZED, message)
            }
            ApplicationError::NotFound(message) => ApiError::new(StatusCode::NOT_FOUND, message),
            ApplicationError::Forbidden(message) => ApiError::new(StatusCode::FORBIDDEN, message),
            ApplicationError::Conflict(message) => ApiError::new(StatusCode::CONFLICT, message),
            ApplicationError::TransientStore(detail) => {
                tracing::error!(error = %detail, "store failure while handling request");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
            }
            ApplicationError::Password(err) => {
                tracing::error!(error = %err, "password hasher failure");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        tracing::info!(reason = %error, "request authentication rejected");
        ApplicationError::from(error).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
