//! 历史消息分页读取，先查缓存再查存储。
//!
//! 缓存只按 TTL 过期，新消息写入后旧分页最多滞后一个 TTL。

use std::sync::Arc;
use std::time::Duration;

use domain::{HistoryRow, MessageRepository, RoomId};
use tracing::{debug, warn};

use crate::{cache::HistoryCache, error::ApplicationError};

pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(15 * 60);

pub fn history_cache_key(room_id: RoomId, page: u32, size: u32) -> String {
    format!("chat_list:{room_id}:page:{page}:size:{size}")
}

pub struct HistoryService {
    messages: Arc<dyn MessageRepository>,
    cache: Arc<dyn HistoryCache>,
    ttl: Duration,
}

impl HistoryService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        cache: Arc<dyn HistoryCache>,
        ttl: Duration,
    ) -> Self {
        Self {
            messages,
            cache,
            ttl,
        }
    }

    pub async fn get_history(
        &self,
        room_id: RoomId,
        page: u32,
        size: u32,
    ) -> Result<Vec<HistoryRow>, ApplicationError> {
        if page < 1 {
            return Err(ApplicationError::validation("page must be at least 1"));
        }
        if size < 1 {
            return Err(ApplicationError::validation("size must be at least 1"));
        }

        let key = history_cache_key(room_id, page, size);
        if let Some(rows) = self.cached(&key).await {
            debug!(room_id = %room_id, page, size, "history served from cache");
            return Ok(rows);
        }

        let skip = u64::from(page - 1) * u64::from(size);
        let rows = match self
            .messages
            .list_history(room_id, skip, u64::from(size))
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                warn!(room_id = %room_id, page, size, error = %err, "history query failed");
                return Ok(Vec::new());
            }
        };

        match serde_json::to_string(&rows) {
            Ok(serialized) => {
                if let Err(err) = self.cache.set(&key, serialized, self.ttl).await {
                    warn!(key = %key, error = %err, "failed to cache history page");
                }
            }
            Err(err) => warn!(key = %key, error = %err, "failed to serialize history page"),
        }

        Ok(rows)
    }

    /// 缓存读取失败或内容无法解析都按未命中处理
    async fn cached(&self, key: &str) -> Option<Vec<HistoryRow>> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key = %key, error = %err, "history cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(rows) => Some(rows),
            Err(err) => {
                warn!(key = %key, error = %err, "discarding undecodable history cache entry");
                None
            }
        }
    }
}
