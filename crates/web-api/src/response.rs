use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// 所有 HTTP 响应共用的外层结构
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub ok: bool,
    pub is_authenticated: bool,
    pub message: String,
    pub details: Value,
    pub meta_info: Value,
}

impl Envelope {
    pub fn success(message: impl Into<String>, is_authenticated: bool, details: Value) -> Self {
        Self {
            ok: true,
            is_authenticated,
            message: message.into(),
            details,
            meta_info: Value::Object(Default::default()),
        }
    }

    pub fn failure(message: impl Into<String>, is_authenticated: bool) -> Self {
        Self {
            ok: false,
            is_authenticated,
            message: message.into(),
            details: Value::Null,
            meta_info: Value::Object(Default::default()),
        }
    }
}

/// 带状态码的成功响应
#[derive(Debug)]
pub struct ApiResponse {
    status: StatusCode,
    body: Envelope,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>, is_authenticated: bool, details: impl Serialize) -> Self {
        Self::with_status(StatusCode::OK, message, is_authenticated, details)
    }

    pub fn with_status(
        status: StatusCode,
        message: impl Into<String>,
        is_authenticated: bool,
        details: impl Serialize,
    ) -> Self {
        let details = match serde_json::to_value(details) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize response details");
                Value::Null
            }
        };
        Self {
            status,
            body: Envelope::success(message, is_authenticated, details),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
