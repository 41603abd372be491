//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给应用层的用例服务。

mod auth;
mod error;
mod response;
mod routes;
mod state;
mod ws_connection;

pub use auth::{authenticate_connection, RequestAccount};
pub use error::ApiError;
pub use response::{ApiResponse, Envelope};
pub use routes::router;
pub use state::{AppDependencies, AppState};
pub use ws_connection::{outbound_payload, parse_inbound, InboundFrame, OutboundFrame};
