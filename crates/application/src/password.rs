//! 登录凭据校验所需的密码哈希抽象。账户注册不在本服务内，这里主要使用 `verify`。

use async_trait::async_trait;
use domain::PasswordHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordHasherError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("failed to verify password: {0}")]
    Verify(String),
    /// 后台计算任务被取消或 panic
    #[error("password worker failed: {0}")]
    Worker(String),
}

impl PasswordHasherError {
    pub fn hash_error(message: impl Into<String>) -> Self {
        Self::Hash(message.into())
    }

    pub fn verify_error(message: impl Into<String>) -> Self {
        Self::Verify(message.into())
    }

    pub fn worker_error(message: impl Into<String>) -> Self {
        Self::Worker(message.into())
    }
}

#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError>;

    /// 口令不匹配返回 `Ok(false)`；存储的哈希本身无法解析时返回 `Verify` 错误。
    async fn verify(
        &self,
        plaintext: &str,
        stored: &PasswordHash,
    ) -> Result<bool, PasswordHasherError>;
}
