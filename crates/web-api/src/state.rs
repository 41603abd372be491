use std::sync::Arc;
use std::time::Duration;

use application::{
    AuthGuard, ChatService, ChatServiceDependencies, Clock, ConnectionRegistry,
    DeviceLoginService, DeviceLoginServiceDependencies, HistoryCache, HistoryService,
    PasswordHasher, RoomSequencer,
};
use config::ChatConfig;
use domain::{AccountRepository, ChatRoomRepository, MessageRepository};

/// 组装 `AppState` 所需的外部适配器
pub struct AppDependencies {
    pub accounts: Arc<dyn AccountRepository>,
    pub rooms: Arc<dyn ChatRoomRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub history_cache: Arc<dyn HistoryCache>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
    pub chat: ChatConfig,
}

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub history_service: Arc<HistoryService>,
    pub device_login_service: Arc<DeviceLoginService>,
    pub auth_guard: Arc<AuthGuard>,
    pub registry: Arc<ConnectionRegistry>,
    pub sequencer: Arc<RoomSequencer>,
    pub chat: ChatConfig,
}

impl AppState {
    pub fn new(deps: AppDependencies) -> Self {
        let chat_service = ChatService::new(ChatServiceDependencies {
            account_repository: deps.accounts.clone(),
            room_repository: deps.rooms,
            message_repository: deps.messages.clone(),
            clock: deps.clock.clone(),
        });
        let history_service = HistoryService::new(
            deps.messages,
            deps.history_cache,
            Duration::from_secs(deps.chat.history_cache_ttl_secs),
        );
        let device_login_service = DeviceLoginService::new(DeviceLoginServiceDependencies {
            account_repository: deps.accounts.clone(),
            password_hasher: deps.password_hasher,
            clock: deps.clock.clone(),
        });
        let auth_guard = AuthGuard::new(deps.accounts, deps.clock);

        Self {
            chat_service: Arc::new(chat_service),
            history_service: Arc::new(history_service),
            device_login_service: Arc::new(device_login_service),
            auth_guard: Arc::new(auth_guard),
            registry: Arc::new(ConnectionRegistry::new()),
            sequencer: Arc::new(RoomSequencer::new()),
            chat: deps.chat,
        }
    }
}
