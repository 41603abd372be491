use std::time::Duration;

use application::HistoryCache;
use async_trait::async_trait;
use domain::RepositoryError;
use redis::{aio::ConnectionManager, AsyncCommands};

/// Redis 字符串缓存，`SET key value EX ttl`
#[derive(Clone)]
pub struct RedisHistoryCache {
    connection: ConnectionManager,
}

impl RedisHistoryCache {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self { connection })
    }
}

fn map_redis_err(err: redis::RedisError) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

#[async_trait]
impl HistoryCache for RedisHistoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(map_redis_err)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RepositoryError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(map_redis_err)
    }
}
