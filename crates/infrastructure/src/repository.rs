use chrono::{DateTime, Utc};
use domain::{
    repository::RepositoryResult, Account, AccountId, AccountRepository, ChatRoom,
    ChatRoomRepository, DeviceId, DeviceRecord, HistoryRow, Message, MessageId,
    MessageRepository, PasswordHash, RepositoryError, RoomId, Timestamp, UserEmail,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().is_some_and(|code| code == UNIQUE_VIOLATION) => {
            RepositoryError::Conflict
        }
        sqlx::Error::Database(db_err)
            if db_err.code().is_some_and(|code| code == FOREIGN_KEY_VIOLATION) =>
        {
            RepositoryError::NotFound
        }
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[derive(Debug, FromRow)]
struct AccountRecord {
    id: Uuid,
    email: String,
    password_hash: String,
    is_activated: bool,
    is_email_verified: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DeviceRow {
    device_id: String,
    device_name: String,
    os: String,
    browser: String,
    device_type: String,
    is_logged_in: bool,
    random_device_uuid: String,
    last_seen_at: Option<DateTime<Utc>>,
}

impl From<DeviceRow> for DeviceRecord {
    fn from(value: DeviceRow) -> Self {
        DeviceRecord {
            device_id: DeviceId::new(value.device_id),
            device_name: value.device_name,
            os: value.os,
            browser: value.browser,
            device_type: value.device_type,
            is_logged_in: value.is_logged_in,
            random_device_uuid: value.random_device_uuid,
            last_seen_at: value.last_seen_at,
        }
    }
}

impl AccountRecord {
    fn into_account(self, devices: Vec<DeviceRow>) -> Result<Account, RepositoryError> {
        let email = UserEmail::parse(self.email).map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(self.password_hash).map_err(|err| invalid_data(err.to_string()))?;

        Ok(Account {
            id: AccountId::from(self.id),
            email,
            password,
            is_activated: self.is_activated,
            is_email_verified: self.is_email_verified,
            device_info: devices.into_iter().map(DeviceRecord::from).collect(),
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    name: Option<String>,
    description: Option<String>,
    members: Vec<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<RoomRecord> for ChatRoom {
    fn from(value: RoomRecord) -> Self {
        ChatRoom {
            id: RoomId::from(value.id),
            name: value.name,
            description: value.description,
            members: value.members.into_iter().map(AccountId::from).collect(),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct HistoryRecord {
    message_id: Uuid,
    message: String,
    is_read: bool,
    sent_at: DateTime<Utc>,
    sent_by: String,
}

impl From<HistoryRecord> for HistoryRow {
    fn from(value: HistoryRecord) -> Self {
        HistoryRow {
            message_id: MessageId::from(value.message_id),
            body: value.message,
            is_read: value.is_read,
            sent_at: value.sent_at,
            sender_email: value.sent_by,
        }
    }
}

/// `accounts` 表与子表 `device_info`
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, record: Option<AccountRecord>) -> RepositoryResult<Option<Account>> {
        let Some(record) = record else {
            return Ok(None);
        };

        let devices = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT device_id, device_name, os, browser, device_type, is_logged_in,
                   random_device_uuid, last_seen_at
            FROM device_info
            WHERE account_id = $1
            ORDER BY position
            "#,
        )
        .bind(record.id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.into_account(devices).map(Some)
    }
}

#[async_trait::async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_id(&self, id: AccountId) -> RepositoryResult<Option<Account>> {
        let record = sqlx::query_as::<_, AccountRecord>(
            r#"
            SELECT id, email, password_hash, is_activated, is_email_verified, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        self.hydrate(record).await
    }

    async fn find_by_email(&self, email: &UserEmail) -> RepositoryResult<Option<Account>> {
        let record = sqlx::query_as::<_, AccountRecord>(
            r#"
            SELECT id, email, password_hash, is_activated, is_email_verified, created_at
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        self.hydrate(record).await
    }

    async fn find_by_device_id(&self, device_id: &DeviceId) -> RepositoryResult<Option<Account>> {
        let record = sqlx::query_as::<_, AccountRecord>(
            r#"
            SELECT a.id, a.email, a.password_hash, a.is_activated, a.is_email_verified, a.created_at
            FROM accounts a
            JOIN device_info d ON d.account_id = a.id
            WHERE d.device_id = $1
            LIMIT 1
            "#,
        )
        .bind(device_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        self.hydrate(record).await
    }

    async fn upsert_device(
        &self,
        account_id: AccountId,
        device: DeviceRecord,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_info (account_id, device_id, device_name, os, browser, device_type,
                                     is_logged_in, random_device_uuid, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (account_id, device_id) DO UPDATE
            SET device_name = EXCLUDED.device_name,
                os = EXCLUDED.os,
                browser = EXCLUDED.browser,
                device_type = EXCLUDED.device_type,
                is_logged_in = EXCLUDED.is_logged_in,
                random_device_uuid = EXCLUDED.random_device_uuid,
                last_seen_at = EXCLUDED.last_seen_at
            "#,
        )
        .bind(Uuid::from(account_id))
        .bind(device.device_id.as_str())
        .bind(&device.device_name)
        .bind(&device.os)
        .bind(&device.browser)
        .bind(&device.device_type)
        .bind(device.is_logged_in)
        .bind(&device.random_device_uuid)
        .bind(device.last_seen_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn mark_device_logged_in(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
        at: Timestamp,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE device_info
            SET is_logged_in = TRUE, last_seen_at = $3
            WHERE account_id = $1 AND device_id = $2
            "#,
        )
        .bind(Uuid::from(account_id))
        .bind(device_id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn create(&self, room: ChatRoom) -> RepositoryResult<ChatRoom> {
        let members: Vec<Uuid> = room.members.iter().copied().map(Uuid::from).collect();
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO chat_room (id, name, description, members, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, description, members, created_at
            "#,
        )
        .bind(Uuid::from(room.id))
        .bind(&room.name)
        .bind(&room.description)
        .bind(&members)
        .bind(room.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.into())
    }

    async fn find_by_id(&self, id: RoomId) -> RepositoryResult<Option<ChatRoom>> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, name, description, members, created_at
            FROM chat_room
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(ChatRoom::from))
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: Message) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_messages (message_id, room_id, sender_id, message, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.room_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.is_read)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn list_history(
        &self,
        room_id: RoomId,
        skip: u64,
        limit: u64,
    ) -> RepositoryResult<Vec<HistoryRow>> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT m.message_id, m.message, m.is_read, m.created_at AS sent_at, a.email AS sent_by
            FROM user_messages m
            JOIN accounts a ON a.id = m.sender_id
            WHERE m.room_id = $1
            ORDER BY m.seq
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(Uuid::from(room_id))
        .bind(to_i64(skip))
        .bind(to_i64(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(HistoryRow::from).collect())
    }
}
