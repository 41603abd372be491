use async_trait::async_trait;

use crate::account::{Account, DeviceRecord};
use crate::chat_room::ChatRoom;
use crate::errors::RepositoryError;
use crate::message::{HistoryRow, Message};
use crate::value_objects::{AccountId, DeviceId, RoomId, Timestamp, UserEmail};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// `accounts` 集合（内嵌 `device_info` 设备数组）
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: AccountId) -> RepositoryResult<Option<Account>>;
    async fn find_by_email(&self, email: &UserEmail) -> RepositoryResult<Option<Account>>;
    /// 按设备 ID 查找拥有该设备的账户
    async fn find_by_device_id(&self, device_id: &DeviceId) -> RepositoryResult<Option<Account>>;
    /// 存在则更新，否则追加到账户的设备列表
    async fn upsert_device(
        &self,
        account_id: AccountId,
        device: DeviceRecord,
    ) -> RepositoryResult<()>;
    async fn mark_device_logged_in(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> RepositoryResult<()>;
}

/// `chat_room` 集合
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    /// 房间 ID 已存在时返回 `RepositoryError::Conflict`
    async fn create(&self, room: ChatRoom) -> RepositoryResult<ChatRoom>;
    async fn find_by_id(&self, id: RoomId) -> RepositoryResult<Option<ChatRoom>>;
}

/// `user_messages` 集合
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加一条消息；不按消息 ID 去重
    async fn append(&self, message: Message) -> RepositoryResult<()>;

    /// 房间消息与发送者邮箱联表，按插入顺序跳过 `skip` 条后取 `limit` 条
    async fn list_history(
        &self,
        room_id: RoomId,
        skip: u64,
        limit: u64,
    ) -> RepositoryResult<Vec<HistoryRow>>;
}
