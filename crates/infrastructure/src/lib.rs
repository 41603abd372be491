//! 外部适配器：PostgreSQL 仓储、Redis 历史缓存与 bcrypt 密码哈希。

pub mod builder;
pub mod cache;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError, MIGRATOR};
pub use cache::RedisHistoryCache;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgAccountRepository, PgChatRoomRepository, PgMessageRepository,
};
