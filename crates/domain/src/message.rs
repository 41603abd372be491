use serde::{Deserialize, Serialize};

use crate::value_objects::{AccountId, MessageContent, MessageId, RoomId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: AccountId,
    pub content: MessageContent,
    pub is_read: bool,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        sender_id: AccountId,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            content,
            is_read: false,
            created_at,
        }
    }
}

/// 历史消息分页中的一行：消息与发送者邮箱的联表投影。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub message_id: MessageId,
    #[serde(rename = "message")]
    pub body: String,
    pub is_read: bool,
    pub sent_at: Timestamp,
    #[serde(rename = "sent_by")]
    pub sender_email: String,
}
