//! 聊天系统核心领域模型
//!
//! 包含账户、设备记录、聊天室、消息等核心实体，设备身份哈希与确定性房间 ID 推导，
//! 以及持久化仓储接口。

pub mod account;
pub mod chat_room;
pub mod errors;
pub mod identity;
pub mod message;
pub mod repository;
pub mod value_objects;

// 重新导出常用类型
pub use account::{Account, DeviceRecord};
pub use chat_room::ChatRoom;
pub use errors::{DomainError, RepositoryError};
pub use identity::{derive_room_id, device_hash, room_hash, validation_hash};
pub use message::{HistoryRow, Message};
pub use repository::{AccountRepository, ChatRoomRepository, MessageRepository};
pub use value_objects::{
    AccountId, DeviceId, MessageContent, MessageId, PasswordHash, RoomId, Timestamp, UserEmail,
};

#[cfg(feature = "testing")]
pub use repository::{MockAccountRepository, MockChatRoomRepository, MockMessageRepository};
