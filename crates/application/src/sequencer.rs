//! 房间内消息的串行化
//!
//! 同一房间的 "持久化 -> 广播" 在一把房间锁下完成，
//! 因此在线收到的顺序与历史记录中的插入顺序一致。不同房间互不阻塞。

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use domain::RoomId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 持有期间本房间的其它发送者等待
pub type RoomTurn = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct RoomSequencer {
    /// 只存弱引用，没有发送者时锁随之释放
    locks: Mutex<HashMap<RoomId, Weak<Mutex<()>>>>,
}

impl RoomSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    async fn room_lock(&self, room_id: RoomId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(&room_id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(room_id, Arc::downgrade(&lock));
        lock
    }

    /// 排队直到轮到本次发送。FIFO，与 tokio `Mutex` 的公平性一致。
    pub async fn enter(&self, room_id: RoomId) -> RoomTurn {
        self.room_lock(room_id).await.lock_owned().await
    }

    /// 仍有发送者持有或等待的房间数
    pub async fn active_rooms(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}
