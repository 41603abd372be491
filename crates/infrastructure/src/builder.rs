use std::sync::Arc;

use application::{HistoryCache, PasswordHasher};
use config::AppConfig;
use domain::{AccountRepository, ChatRoomRepository, MessageRepository};
use thiserror::Error;
use tracing::info;

use crate::{
    cache::RedisHistoryCache,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgAccountRepository, PgChatRoomRepository, PgMessageRepository},
};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// 已连接好的全部外部适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub accounts: Arc<dyn AccountRepository>,
    pub rooms: Arc<dyn ChatRoomRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub history_cache: Arc<dyn HistoryCache>,
    pub password_hasher: Arc<dyn PasswordHasher>,
}

impl Infrastructure {
    /// 连接 PostgreSQL 与 Redis，并执行数据库迁移
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        info!(database = %config.sanitized_database_url(), "database migrated");

        let history_cache = RedisHistoryCache::connect(&config.redis.url).await?;
        info!("redis connection established");

        Ok(Self {
            accounts: Arc::new(PgAccountRepository::new(pool.clone())),
            rooms: Arc::new(PgChatRoomRepository::new(pool.clone())),
            messages: Arc::new(PgMessageRepository::new(pool)),
            history_cache: Arc::new(history_cache),
            password_hasher: Arc::new(BcryptPasswordHasher::default()),
        })
    }
}
