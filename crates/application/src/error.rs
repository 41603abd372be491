use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;

/// 应用层错误分类
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 输入缺失或格式错误，在访问存储前拒绝
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// 账户存在但未激活或邮箱未验证
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    /// 持久化存储或缓存的 I/O 失败
    #[error("transient store error: {0}")]
    TransientStore(String),
    /// 实时通道中的非法帧
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
}

impl ApplicationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        ApplicationError::Validation(value.to_string())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ApplicationError::NotFound("record not found".into()),
            RepositoryError::Conflict => ApplicationError::Conflict("record already exists".into()),
            RepositoryError::Storage { message } => ApplicationError::TransientStore(message),
        }
    }
}
