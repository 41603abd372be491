//! 实时连接注册表
//!
//! 房间 ID -> 该房间内所有在线连接。每个房间一把锁，外层映射锁只在查找、插入、
//! 回收房间条目时短暂持有。加锁顺序固定为 映射锁 -> 房间锁，从不反向。
//!
//! 广播只把帧放进各连接的有界发送队列，真正的 socket 写入由连接自己的写任务完成，
//! 因此任何锁都不会跨越网络 I/O。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use domain::{AccountId, RoomId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 注册表持有的连接句柄。发送端只存在于注册表中，句柄被移除后写任务的接收端随即结束。
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub account_id: AccountId,
    sender: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(account_id: AccountId, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::generate(),
                account_id,
                sender,
            },
            receiver,
        )
    }
}

/// 连接在注册表中的成员资格，释放时自动离开房间。
/// 连接任务无论正常结束、出错还是被取消，都会经由 Drop 走到 `leave`。
#[derive(Debug)]
pub struct RegistryMembership {
    registry: Arc<ConnectionRegistry>,
    room_id: RoomId,
    connection_id: ConnectionId,
}

impl RegistryMembership {
    pub fn id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Drop for RegistryMembership {
    fn drop(&mut self) {
        self.registry.leave(self.room_id, self.connection_id);
    }
}

#[derive(Debug, Default)]
struct RoomConnections {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    /// 已从映射中摘除，后来者必须重新插入新条目
    retired: bool,
}

type RoomSlot = Arc<Mutex<RoomConnections>>;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<RoomId, RoomSlot>>,
}

fn lock_room(slot: &RoomSlot) -> MutexGuard<'_, RoomConnections> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, room_id: RoomId) -> Option<RoomSlot> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&room_id)
            .cloned()
    }

    fn slot_or_insert(&self, room_id: RoomId) -> RoomSlot {
        if let Some(slot) = self.slot(room_id) {
            return slot;
        }
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(room_id)
            .or_default()
            .clone()
    }

    /// 注册连接，首个加入者创建房间条目。
    pub fn join(&self, room_id: RoomId, handle: ConnectionHandle) -> ConnectionId {
        let connection_id = handle.id;
        let mut handle = Some(handle);

        loop {
            let slot = self.slot_or_insert(room_id);
            let mut room = lock_room(&slot);
            if room.retired {
                // 条目刚被回收，重新取一次
                continue;
            }
            if let Some(handle) = handle.take() {
                debug!(room_id = %room_id, connection_id = %connection_id, account_id = %handle.account_id, "connection joined");
                room.connections.insert(connection_id, handle);
            }
            return connection_id;
        }
    }

    /// 与 `join` 相同，但返回的成员资格在释放时自动调用 `leave`。
    pub fn join_scoped(self: &Arc<Self>, room_id: RoomId, handle: ConnectionHandle) -> RegistryMembership {
        let connection_id = self.join(room_id, handle);
        RegistryMembership {
            registry: Arc::clone(self),
            room_id,
            connection_id,
        }
    }

    /// 移除连接，房间为空时回收条目。重复调用无副作用。
    pub fn leave(&self, room_id: RoomId, connection_id: ConnectionId) {
        let Some(slot) = self.slot(room_id) else {
            return;
        };

        let now_empty = {
            let mut room = lock_room(&slot);
            if room.connections.remove(&connection_id).is_some() {
                debug!(room_id = %room_id, connection_id = %connection_id, "connection left");
            }
            room.connections.is_empty()
        };

        if now_empty {
            self.retire_if_empty(room_id);
        }
    }

    fn retire_if_empty(&self, room_id: RoomId) {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = rooms.get(&room_id).cloned() else {
            return;
        };
        let mut room = lock_room(&slot);
        if room.connections.is_empty() {
            room.retired = true;
            rooms.remove(&room_id);
            debug!(room_id = %room_id, "room retired");
        }
    }

    /// 向调用时刻已注册的每个连接投递一帧，返回成功入队的数量。
    /// 队列已满或已关闭的连接当场剔除；本方法从不失败。
    pub fn broadcast(&self, room_id: RoomId, payload: &str) -> usize {
        let Some(slot) = self.slot(room_id) else {
            return 0;
        };

        let (delivered, now_empty) = {
            let mut room = lock_room(&slot);
            let mut delivered = 0;
            let mut broken = Vec::new();

            for (id, handle) in room.connections.iter() {
                match handle.sender.try_send(payload.to_owned()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(room_id = %room_id, connection_id = %id, "outbound queue full, dropping connection");
                        broken.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(room_id = %room_id, connection_id = %id, "outbound queue closed, pruning connection");
                        broken.push(*id);
                    }
                }
            }

            for id in &broken {
                room.connections.remove(id);
            }
            (delivered, !broken.is_empty() && room.connections.is_empty())
        };

        if now_empty {
            self.retire_if_empty(room_id);
        }
        delivered
    }

    pub fn connection_count(&self, room_id: RoomId) -> usize {
        self.slot(room_id)
            .map(|slot| lock_room(&slot).connections.len())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
