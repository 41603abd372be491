//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：设备身份鉴权、实时连接注册表、
//! 消息持久化与带缓存的历史分页，以及对外部适配器（密码哈希、缓存）的抽象。

pub mod auth_guard;
pub mod cache;
pub mod clock;
pub mod device_profile;
pub mod error;
pub mod memory;
pub mod password;
pub mod registry;
pub mod sequencer;
pub mod services;

pub use auth_guard::{AuthError, AuthGuard, AuthenticatedAccount, DeviceCredentials};
pub use cache::HistoryCache;
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use password::{PasswordHasher, PasswordHasherError};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, RegistryMembership};
pub use sequencer::{RoomSequencer, RoomTurn};
pub use services::{
    ChatService, ChatServiceDependencies, CreateRoomRequest, CredentialLoginRequest,
    DeviceLogin, DeviceLoginService, DeviceLoginServiceDependencies, HistoryService,
    RoomCreation,
};
