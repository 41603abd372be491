//! 单个实时连接的生命周期
//!
//! 握手鉴权 -> 校验房间与成员身份 -> 注册到连接表 -> 读循环（解析、持久化、广播）
//! -> 退出时由成员资格的 Drop 从连接表注销，任务被取消也不例外。
//!
//! 写方向由独立任务负责：它消费注册表投递到本连接队列中的帧并写入 socket，
//! 读循环自身从不直接写 socket，除了最终的关闭帧。

use application::{ApplicationError, AuthenticatedAccount, ConnectionHandle};
use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket};
use axum::http::HeaderMap;
use domain::{MessageId, RoomId, Timestamp};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{auth::authenticate_connection, state::AppState};

/// 客户端上行帧。发送者、房间、时间与已读状态由服务端决定，客户端提供的值被忽略。
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub message: String,
    #[serde(default)]
    pub message_id: Option<Uuid>,
    #[serde(default)]
    pub room_id: Option<Value>,
    #[serde(default)]
    pub sent_by: Option<Value>,
    #[serde(default)]
    pub is_read: Option<Value>,
    #[serde(default)]
    pub sent_at: Option<Value>,
}

/// 广播给房间内所有连接的下行帧
#[derive(Debug, Serialize)]
pub struct OutboundFrame<'a> {
    pub message: &'a str,
    pub sent_by: &'a str,
    pub sent_at: Timestamp,
}

/// 连接终止原因
#[derive(Debug)]
enum Disconnect {
    /// 客户端发送了关闭帧
    ClientClosed,
    /// 底层连接中断
    TransportLost,
    /// 1003
    Malformed(String),
    /// 1011
    Internal(String),
}

impl Disconnect {
    fn close_frame(&self) -> Option<CloseFrame> {
        match self {
            Disconnect::ClientClosed | Disconnect::TransportLost => None,
            Disconnect::Malformed(_) => Some(close(close_code::UNSUPPORTED, "malformed frame")),
            Disconnect::Internal(_) => Some(close(close_code::ERROR, "internal error")),
        }
    }
}

fn close(code: u16, reason: &'static str) -> CloseFrame {
    CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }
}

pub fn parse_inbound(text: &str) -> Result<InboundFrame, ApplicationError> {
    serde_json::from_str(text).map_err(|err| ApplicationError::protocol(err.to_string()))
}

pub fn outbound_payload(body: &str, sender_email: &str, sent_at: Timestamp) -> Result<String, ApplicationError> {
    serde_json::to_string(&OutboundFrame {
        message: body,
        sent_by: sender_email,
        sent_at,
    })
    .map_err(|err| ApplicationError::protocol(err.to_string()))
}

/// 握手后的准入检查。任何失败都以 1008 关闭，数据层故障以 1011 关闭。
async fn admit(
    state: &AppState,
    headers: &HeaderMap,
    raw_room_id: &str,
) -> Result<(AuthenticatedAccount, RoomId), CloseFrame> {
    let account = authenticate_connection(state, headers).await.map_err(|err| {
        info!(reason = %err, "connection authentication rejected");
        match err {
            application::AuthError::Store(_) => close(close_code::ERROR, ""),
            _ => close(close_code::POLICY, ""),
        }
    })?;

    let room_id = Uuid::parse_str(raw_room_id).map(RoomId::from).map_err(|_| {
        info!(room_id = %raw_room_id, "connection rejected: invalid room id");
        close(close_code::POLICY, "")
    })?;

    let room = state.chat_service.get_room(room_id).await.map_err(|err| match err {
        ApplicationError::NotFound(_) => {
            info!(room_id = %room_id, "connection rejected: unknown room");
            close(close_code::POLICY, "")
        }
        other => {
            warn!(room_id = %room_id, error = %other, "room lookup failed");
            close(close_code::ERROR, "")
        }
    })?;

    if !room.has_member(account.id()) {
        info!(room_id = %room_id, account_id = %account.id(), "connection rejected: not a room member");
        return Err(close(close_code::POLICY, ""));
    }

    Ok((account, room_id))
}

/// 处理一个已升级的连接直到其结束
pub async fn serve_connection(
    mut socket: WebSocket,
    state: AppState,
    headers: HeaderMap,
    raw_room_id: String,
) {
    let (account, room_id) = match admit(&state, &headers, &raw_room_id).await {
        Ok(admitted) => admitted,
        Err(frame) => {
            let _ = socket.send(WsMessage::Close(Some(frame))).await;
            return;
        }
    };

    let (handle, outbound) =
        ConnectionHandle::new(account.id(), state.chat.outbound_queue_capacity);
    let membership = state.registry.join_scoped(room_id, handle);
    let connection_id = membership.id();
    info!(room_id = %room_id, account_id = %account.id(), connection_id = %connection_id, "connection established");

    let (sink, mut stream) = socket.split();
    let (close_tx, close_rx) = oneshot::channel();
    let mut writer = tokio::spawn(write_frames(sink, outbound, close_rx));

    let reason = tokio::select! {
        reason = read_frames(&state, &mut stream, room_id, &account) => Some(reason),
        _ = &mut writer => None,
    };

    match &reason {
        Some(Disconnect::Malformed(detail)) => {
            info!(connection_id = %connection_id, reason = %detail, "closing connection: malformed frame")
        }
        Some(Disconnect::Internal(detail)) => {
            warn!(connection_id = %connection_id, reason = %detail, "closing connection: internal error")
        }
        Some(_) => {}
        None => debug!(connection_id = %connection_id, "writer finished before reader"),
    }

    // 关闭帧先交给写任务，再注销，避免写任务因队列关闭而先发出其它关闭码
    if let Some(frame) = reason.as_ref().and_then(Disconnect::close_frame) {
        let _ = close_tx.send(frame);
    } else {
        drop(close_tx);
    }
    drop(membership);
    if reason.is_some() {
        let _ = writer.await;
    }

    info!(room_id = %room_id, connection_id = %connection_id, "connection closed");
}

async fn read_frames(
    state: &AppState,
    stream: &mut SplitStream<WebSocket>,
    room_id: RoomId,
    account: &AuthenticatedAccount,
) -> Disconnect {
    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(err) => {
                debug!(error = %err, "connection read failed");
                return Disconnect::TransportLost;
            }
        };

        match message {
            WsMessage::Text(text) => {
                if let Err(reason) = handle_text(state, room_id, account, text.as_str()).await {
                    return reason;
                }
            }
            WsMessage::Close(_) => return Disconnect::ClientClosed,
            // ping 由传输层自动应答，二进制帧忽略
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => {}
        }
    }
    Disconnect::TransportLost
}

async fn handle_text(
    state: &AppState,
    room_id: RoomId,
    account: &AuthenticatedAccount,
    text: &str,
) -> Result<(), Disconnect> {
    let frame = parse_inbound(text).map_err(|err| Disconnect::Malformed(err.to_string()))?;

    // 持久化与广播在同一轮次内完成，在线顺序与历史顺序一致
    let _turn = state.sequencer.enter(room_id).await;
    let message = state
        .chat_service
        .post_message(
            room_id,
            account.id(),
            frame.message_id.map(MessageId::from),
            frame.message,
        )
        .await
        .map_err(|err| match err {
            ApplicationError::Validation(detail) => Disconnect::Malformed(detail),
            other => Disconnect::Internal(other.to_string()),
        })?;

    let payload = outbound_payload(
        message.content.as_str(),
        account.account.email.as_str(),
        message.created_at,
    )
    .map_err(|err| Disconnect::Internal(err.to_string()))?;

    let delivered = state.registry.broadcast(room_id, &payload);
    debug!(room_id = %room_id, message_id = %message.id, delivered, "message broadcast");
    Ok(())
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<String>,
    mut close_rx: oneshot::Receiver<CloseFrame>,
) {
    loop {
        tokio::select! {
            biased;
            requested = &mut close_rx => {
                if let Ok(frame) = requested {
                    let _ = sink.send(WsMessage::Close(Some(frame))).await;
                }
                break;
            }
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        debug!("connection write failed");
                        break;
                    }
                }
                // 已被连接表剔除
                None => {
                    let _ = sink.send(WsMessage::Close(Some(close(close_code::POLICY, "too slow")))).await;
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn inbound_frame_needs_only_a_body() {
        let frame = parse_inbound(r#"{"message":"hello"}"#).unwrap();
        assert_eq!(frame.message, "hello");
        assert!(frame.message_id.is_none());
    }

    #[test]
    fn client_stamped_fields_are_accepted_but_not_required() {
        let frame = parse_inbound(
            r#"{"message":"hi","message_id":"6f1c1b9e-5e2a-4a4f-9d57-1f0a7f0b7e10","room_id":"x","sent_by":"spoof","is_read":true,"sent_at":"2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(
            frame.message_id.unwrap().to_string(),
            "6f1c1b9e-5e2a-4a4f-9d57-1f0a7f0b7e10"
        );
    }

    #[test]
    fn frames_without_body_are_protocol_errors() {
        assert!(matches!(
            parse_inbound(r#"{"text":"hello"}"#),
            Err(ApplicationError::Protocol(_))
        ));
        assert!(matches!(
            parse_inbound("not json"),
            Err(ApplicationError::Protocol(_))
        ));
    }

    #[test]
    fn outbound_frame_shape() {
        let sent_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let payload = outbound_payload("hello", "x@example.com", sent_at).unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["message"], "hello");
        assert_eq!(value["sent_by"], "x@example.com");
        assert_eq!(value["sent_at"], "2024-05-01T12:00:00Z");
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn close_codes() {
        assert!(Disconnect::ClientClosed.close_frame().is_none());
        assert_eq!(
            Disconnect::Malformed(String::new()).close_frame().unwrap().code,
            1003
        );
        assert_eq!(
            Disconnect::Internal(String::new()).close_frame().unwrap().code,
            1011
        );
    }
}
