//! 进程内的仓储与缓存实现，用于测试与本地开发。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain::{
    repository::RepositoryResult, Account, AccountId, AccountRepository, ChatRoom,
    ChatRoomRepository, DeviceId, DeviceRecord, HistoryRow, Message, MessageRepository,
    RepositoryError, RoomId, Timestamp, UserEmail,
};
use tokio::sync::RwLock;

use crate::cache::HistoryCache;

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册流程不在本服务内，测试直接写入账户
    pub async fn insert(&self, account: Account) {
        self.accounts.write().await.insert(account.id, account);
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_id(&self, id: AccountId) -> RepositoryResult<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> RepositoryResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|account| &account.email == email)
            .cloned())
    }

    async fn find_by_device_id(&self, device_id: &DeviceId) -> RepositoryResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.device(device_id).is_some())
            .cloned())
    }

    async fn upsert_device(
        &self,
        account_id: AccountId,
        device: DeviceRecord,
    ) -> RepositoryResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&account_id)
            .ok_or(RepositoryError::NotFound)?;
        account.upsert_device(device);
        Ok(())
    }

    async fn mark_device_logged_in(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> RepositoryResult<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&account_id)
            .ok_or(RepositoryError::NotFound)?;
        if account.mark_device_logged_in(device_id, at) {
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

#[derive(Default)]
pub struct InMemoryChatRoomRepository {
    rooms: RwLock<HashMap<RoomId, ChatRoom>>,
}

impl InMemoryChatRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRoomRepository for InMemoryChatRoomRepository {
    async fn create(&self, room: ChatRoom) -> RepositoryResult<ChatRoom> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.id) {
            return Err(RepositoryError::Conflict);
        }
        rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn find_by_id(&self, id: RoomId) -> RepositoryResult<Option<ChatRoom>> {
        Ok(self.rooms.read().await.get(&id).cloned())
    }
}

/// 消息按插入顺序保存在一个向量里，历史查询时与账户仓储联表取发送者邮箱
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
    accounts: Arc<InMemoryAccountRepository>,
}

impl InMemoryMessageRepository {
    pub fn new(accounts: Arc<InMemoryAccountRepository>) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            accounts,
        }
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: Message) -> RepositoryResult<()> {
        self.messages.write().await.push(message);
        Ok(())
    }

    async fn list_history(
        &self,
        room_id: RoomId,
        skip: u64,
        limit: u64,
    ) -> RepositoryResult<Vec<HistoryRow>> {
        let messages = self.messages.read().await;
        let accounts = self.accounts.accounts.read().await;

        // 与 SQL 的内连接一致：找不到发送者的消息不出现在结果里
        let rows = messages
            .iter()
            .filter(|message| message.room_id == room_id)
            .filter_map(|message| {
                accounts.get(&message.sender_id).map(|sender| HistoryRow {
                    message_id: message.id,
                    body: message.content.as_str().to_owned(),
                    is_read: message.is_read,
                    sent_at: message.created_at,
                    sender_email: sender.email.as_str().to_owned(),
                })
            })
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryHistoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryHistoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryCache for InMemoryHistoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RepositoryError> {
        self.entries
            .write()
            .await
            .insert(key.to_owned(), (value, Instant::now() + ttl));
        Ok(())
    }
}
