use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::{CreateRoomRequest, CredentialLoginRequest};
use domain::RoomId;

use crate::{
    auth::RequestAccount,
    error::ApiError,
    response::ApiResponse,
    state::AppState,
    ws_connection::serve_connection,
};

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    members: Vec<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<i64>,
    size: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ws/chat/{room_id}", get(websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login-with-credentials", post(login_with_credentials))
        .route("/chat_room/create", post(create_room))
        .route("/chat_room/{room_id}/chats", get(chat_history))
}

async fn root() -> ApiResponse {
    ApiResponse::ok("Welcome to the chat service.", false, ())
}

async fn health() -> ApiResponse {
    ApiResponse::ok("ok", false, json!({ "status": "healthy" }))
}

async fn login_with_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(payload) = payload?;
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let login = state
        .device_login_service
        .login_with_credentials(CredentialLoginRequest {
            email: payload.email,
            password: payload.password,
            user_agent,
        })
        .await?;

    Ok(ApiResponse::ok("Logged-in successfully", true, login))
}

async fn create_room(
    State(state): State<AppState>,
    RequestAccount(_account): RequestAccount,
    payload: Result<Json<CreateRoomPayload>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(payload) = payload.map_err(|err| ApiError::from(err).authenticated())?;

    let outcome = state
        .chat_service
        .create_or_get_room(CreateRoomRequest {
            members: payload.members,
            name: payload.name,
            description: payload.description,
        })
        .await
        .map_err(|err| ApiError::from(err).authenticated())?;

    let details = json!({ "room_id": outcome.room.id.to_string() });
    if outcome.created {
        Ok(ApiResponse::with_status(
            StatusCode::CREATED,
            "Chat Room created successfully.",
            true,
            details,
        ))
    } else {
        Ok(ApiResponse::ok("Chat Room already exists.", true, details))
    }
}

fn paging_value(value: Option<i64>, default: u32, field: &str) -> Result<u32, ApiError> {
    let value = value.unwrap_or(i64::from(default));
    u32::try_from(value)
        .ok()
        .filter(|value| *value >= 1)
        .ok_or_else(|| ApiError::bad_request(format!("{field} must be at least 1")))
}

async fn chat_history(
    State(state): State<AppState>,
    RequestAccount(_account): RequestAccount,
    Path(room_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<ApiResponse, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::from(err).authenticated())?;
    let room_id = Uuid::parse_str(&room_id)
        .map(RoomId::from)
        .map_err(|_| ApiError::bad_request(format!("Invalid room id: {room_id}")).authenticated())?;

    let page = paging_value(query.page, 1, "page").map_err(ApiError::authenticated)?;
    let size = paging_value(query.size, state.chat.default_page_size, "size")
        .map_err(ApiError::authenticated)?;
    if size > state.chat.max_page_size {
        return Err(ApiError::bad_request(format!(
            "size must not exceed {}",
            state.chat.max_page_size
        ))
        .authenticated());
    }

    let rows = state
        .history_service
        .get_history(room_id, page, size)
        .await
        .map_err(|err| ApiError::from(err).authenticated())?;

    Ok(ApiResponse::ok("User Messages.", true, rows))
}

/// 升级后再鉴权，以便失败时能用关闭码告知客户端
async fn websocket_upgrade(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state, headers, room_id))
}
