mod chat_service;
mod device_login_service;
mod history_service;

pub use chat_service::{ChatService, ChatServiceDependencies, CreateRoomRequest, RoomCreation};
pub use device_login_service::{
    CredentialLoginRequest, DeviceLogin, DeviceLoginService, DeviceLoginServiceDependencies,
};
pub use history_service::{history_cache_key, HistoryService, DEFAULT_HISTORY_TTL};
