#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use application::{
    memory::{
        InMemoryAccountRepository, InMemoryChatRoomRepository, InMemoryHistoryCache,
        InMemoryMessageRepository,
    },
    PasswordHasher, SystemClock,
};
use chrono::Utc;
use config::ChatConfig;
use domain::{validation_hash, Account, AccountId, PasswordHash, RoomId, UserEmail};
use futures_util::StreamExt;
use infrastructure::BcryptPasswordHasher;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;
use web_api::{router, AppDependencies, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0";
pub const SAFARI: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

pub struct TestServer {
    pub base_http: String,
    pub base_ws: String,
    pub client: Client,
    pub state: AppState,
    accounts: Arc<InMemoryAccountRepository>,
    hasher: Arc<BcryptPasswordHasher>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// 登录后客户端持有的设备凭据
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub account_id: String,
    pub email: String,
    pub device_id: String,
    pub nonce: String,
    /// 登录时使用的 User-Agent，之后每次请求都要原样带上
    pub user_agent: String,
}

impl DeviceSession {
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("device-id", self.device_id.clone()),
            ("user-id", self.account_id.clone()),
            ("random_device_uuid", self.nonce.clone()),
            (
                "device_identity_hash",
                validation_hash(&self.account_id, &self.device_id, &self.nonce),
            ),
            ("user-agent", self.user_agent.clone()),
        ]
    }

    /// 替换某个头部的值，其余头部不变
    pub fn headers_replacing(&self, name: &str, value: &str) -> Vec<(&'static str, String)> {
        self.headers()
            .into_iter()
            .map(|(header, current)| {
                if header == name {
                    (header, value.to_owned())
                } else {
                    (header, current)
                }
            })
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub async fn spawn_server() -> TestServer {
    let accounts = Arc::new(InMemoryAccountRepository::new());
    let hasher = Arc::new(BcryptPasswordHasher::new(Some(4)));
    let state = AppState::new(AppDependencies {
        accounts: accounts.clone(),
        rooms: Arc::new(InMemoryChatRoomRepository::new()),
        messages: Arc::new(InMemoryMessageRepository::new(accounts.clone())),
        history_cache: Arc::new(InMemoryHistoryCache::new()),
        password_hasher: hasher.clone(),
        clock: Arc::new(SystemClock),
        chat: ChatConfig::default(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        base_http: format!("http://{addr}"),
        base_ws: format!("ws://{addr}"),
        client: Client::new(),
        state,
        accounts,
        hasher,
        shutdown: Some(shutdown_tx),
    }
}

impl TestServer {
    /// 注册不在本服务范围内，直接写入账户
    pub async fn seed_account(&self, email: &str, password: &str, is_activated: bool, is_email_verified: bool) -> Account {
        let hashed: PasswordHash = self.hasher.hash(password).await.expect("hash");
        let account = Account {
            id: AccountId::new(Uuid::new_v4()),
            email: UserEmail::parse(email).expect("email"),
            password: hashed,
            is_activated,
            is_email_verified,
            device_info: Vec::new(),
            created_at: Utc::now(),
        };
        self.accounts.insert(account.clone()).await;
        account
    }

    pub async fn login(&self, email: &str, password: &str, user_agent: &str) -> DeviceSession {
        let response = self
            .client
            .post(format!("{}/api/v1/auth/login-with-credentials", self.base_http))
            .header("user-agent", user_agent)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request");
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.expect("login json");
        let details = &body["details"];

        DeviceSession {
            account_id: details["user_id"].as_str().expect("user_id").to_owned(),
            email: details["email"].as_str().expect("email").to_owned(),
            device_id: details["device_info"]["device_id"].as_str().expect("device_id").to_owned(),
            nonce: details["device_info"]["random_device_uuid"]
                .as_str()
                .expect("nonce")
                .to_owned(),
            user_agent: user_agent.to_owned(),
        }
    }

    pub async fn create_room<S: AsRef<str>>(&self, session: &DeviceSession, members: &[S]) -> reqwest::Response {
        let members: Vec<&str> = members.iter().map(AsRef::as_ref).collect();
        let mut request = self
            .client
            .post(format!("{}/api/v1/chat_room/create", self.base_http))
            .json(&json!({ "members": members, "name": "pair" }));
        for (name, value) in session.headers() {
            request = request.header(name, value);
        }
        request.send().await.expect("create room request")
    }

    pub async fn history(&self, session: &DeviceSession, room_id: &str, query: &str) -> reqwest::Response {
        let mut request = self
            .client
            .get(format!("{}/api/v1/chat_room/{room_id}/chats{query}", self.base_http));
        for (name, value) in session.headers() {
            request = request.header(name, value);
        }
        request.send().await.expect("history request")
    }

    pub async fn connect(&self, room_id: &str, headers: Vec<(&'static str, String)>) -> WsClient {
        let mut request = format!("{}/ws/chat/{room_id}", self.base_ws)
            .into_client_request()
            .expect("client request");
        for (name, value) in headers {
            request
                .headers_mut()
                .insert(name, value.parse().expect("header value"));
        }
        let (stream, _) = connect_async(request).await.expect("websocket handshake");
        stream
    }

    /// 两个已登录账户之间的房间
    pub async fn room_between(&self, creator: &DeviceSession, other: &DeviceSession) -> String {
        let created = self
            .create_room(creator, &[&creator.account_id, &other.account_id])
            .await;
        assert!(created.status().is_success());
        let body: Value = created.json().await.expect("room json");
        body["details"]["room_id"].as_str().expect("room_id").to_owned()
    }

    pub fn connections(&self, room_id: &str) -> usize {
        let room_id = RoomId::new(Uuid::parse_str(room_id).expect("room id"));
        self.state.registry.connection_count(room_id)
    }

    /// 等待房间内的在线连接数达到预期
    pub async fn wait_for_connections(&self, room_id: &str, expected: usize) {
        let room_id = RoomId::new(Uuid::parse_str(room_id).expect("room id"));
        for _ in 0..100 {
            if self.state.registry.connection_count(room_id) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("room never reached {expected} connections");
    }
}

pub async fn next_text(ws: &mut WsClient) -> String {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("frame error");
        match frame {
            Message::Text(text) => return text.to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// 读到关闭帧为止，返回关闭码
pub async fn close_code(ws: &mut WsClient) -> Option<u16> {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next()).await.ok()??;
        match frame {
            Ok(Message::Close(Some(frame))) => return Some(u16::from(frame.code)),
            Ok(Message::Close(None)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}
