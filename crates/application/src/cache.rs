use std::time::Duration;

use async_trait::async_trait;
use domain::RepositoryError;

/// 历史分页的字符串键值缓存，仅按 TTL 过期，不做主动失效
#[async_trait]
pub trait HistoryCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RepositoryError>;
}
