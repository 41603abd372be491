//! 设备身份鉴权的两个入口：普通请求与实时连接握手。
//! 两者共用 `AuthGuard` 的校验核心，只是失败时的回应方式不同。

use application::{AuthError, AuthenticatedAccount};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::{error::ApiError, state::AppState};

/// 已通过设备鉴权的请求方
#[derive(Debug, Clone)]
pub struct RequestAccount(pub AuthenticatedAccount);

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

impl FromRequestParts<AppState> for RequestAccount {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let account = state
            .auth_guard
            .authenticate(|name| header(headers, name))
            .await?;
        Ok(RequestAccount(account))
    }
}

/// 握手阶段的鉴权；失败原因只写日志，由调用方以 1008 关闭连接
pub async fn authenticate_connection(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AuthenticatedAccount, AuthError> {
    state
        .auth_guard
        .authenticate(|name| header(headers, name))
        .await
}
