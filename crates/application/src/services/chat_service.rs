use std::sync::Arc;

use domain::{
    identity::parse_member_ids, AccountId, AccountRepository, ChatRoom, ChatRoomRepository,
    Message, MessageContent, MessageId, MessageRepository, RepositoryError, RoomId,
};
use tracing::{info, warn};

use crate::{clock::Clock, error::ApplicationError};

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    /// 客户端提交的成员账户 ID，字符串形式
    pub members: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoomCreation {
    pub room: ChatRoom,
    /// false 表示房间已存在
    pub created: bool,
}

pub struct ChatServiceDependencies {
    pub account_repository: Arc<dyn AccountRepository>,
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 幂等创建：同一成员集合总是得到同一个房间。
    pub async fn create_or_get_room(
        &self,
        request: CreateRoomRequest,
    ) -> Result<RoomCreation, ApplicationError> {
        let members = parse_member_ids(request.members.as_slice())?;
        let room = ChatRoom::for_members(
            &members,
            request.name,
            request.description,
            self.deps.clock.now(),
        )?;

        for member in &room.members {
            self.ensure_account_exists(*member).await?;
        }

        if let Some(existing) = self.deps.room_repository.find_by_id(room.id).await? {
            return Ok(RoomCreation {
                room: existing,
                created: false,
            });
        }

        let room_id = room.id;
        match self.deps.room_repository.create(room).await {
            Ok(room) => {
                info!(room_id = %room_id, members = room.members.len(), "chat room created");
                Ok(RoomCreation {
                    room,
                    created: true,
                })
            }
            Err(RepositoryError::Conflict) => {
                // 并发创建时另一方先写入
                let room = self
                    .deps
                    .room_repository
                    .find_by_id(room_id)
                    .await?
                    .ok_or_else(|| ApplicationError::not_found("Chat room not found."))?;
                Ok(RoomCreation {
                    room,
                    created: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<ChatRoom, ApplicationError> {
        self.deps
            .room_repository
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Chat room not found."))
    }

    pub async fn append(&self, message: Message) -> Result<(), ApplicationError> {
        let message_id = message.id;
        let room_id = message.room_id;
        self.deps
            .message_repository
            .append(message)
            .await
            .map_err(|err| {
                warn!(room_id = %room_id, message_id = %message_id, error = %err, "failed to persist message");
                ApplicationError::from(err)
            })
    }

    /// 服务端盖章发送者、房间与时间后持久化。客户端未提供消息 ID 时重新生成。
    pub async fn post_message(
        &self,
        room_id: RoomId,
        sender_id: AccountId,
        client_message_id: Option<MessageId>,
        body: String,
    ) -> Result<Message, ApplicationError> {
        let content = MessageContent::new(body)?;
        let message = Message::new(
            client_message_id.unwrap_or_else(MessageId::generate),
            room_id,
            sender_id,
            content,
            self.deps.clock.now(),
        );
        self.append(message.clone()).await?;
        Ok(message)
    }

    async fn ensure_account_exists(&self, account_id: AccountId) -> Result<(), ApplicationError> {
        match self.deps.account_repository.find_by_id(account_id).await? {
            Some(_) => Ok(()),
            None => Err(ApplicationError::not_found(format!(
                "Account {account_id} does not exist."
            ))),
        }
    }
}
