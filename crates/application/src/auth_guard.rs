//! 设备身份鉴权
//!
//! 每个 HTTP 请求与每个实时连接握手都携带四个头部：
//! `device-id`、`user-id`、`random_device_uuid`、`device_identity_hash`，
//! 另外读取 `User-Agent` 用于重新推导设备 ID。
//! 服务端据此重新计算校验哈希，并与存储的设备记录比对。
//! 请求入口与连接入口共用 [`AuthGuard::verify`]，由各自的适配层决定失败时如何回应。

use std::sync::Arc;

use domain::{
    device_hash, validation_hash, Account, AccountId, AccountRepository, DeviceId,
    RepositoryError,
};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::device_profile::effective_user_agent;
use crate::error::ApplicationError;

pub const DEVICE_ID_HEADER: &str = "device-id";
pub const USER_ID_HEADER: &str = "user-id";
pub const NONCE_HEADER: &str = "random_device_uuid";
pub const IDENTITY_HASH_HEADER: &str = "device_identity_hash";
pub const USER_AGENT_HEADER: &str = "user-agent";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),
    #[error("device not registered")]
    DeviceNotRegistered,
    #[error("device identity hash mismatch")]
    HashMismatch,
    #[error("account id does not own the device")]
    AccountMismatch,
    #[error("device id does not match the client metadata")]
    DeviceMismatch,
    #[error("nonce was not issued for this device")]
    NonceMismatch,
    #[error("account is deactivated")]
    AccountDeactivated,
    #[error("email is not verified")]
    EmailNotVerified,
    #[error("store error: {0}")]
    Store(#[from] RepositoryError),
}

impl AuthError {
    /// 返回给客户端的提示文本
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingHeader(DEVICE_ID_HEADER) => "Device ID is required in headers.",
            AuthError::MissingHeader(USER_ID_HEADER) => "User ID is required in headers.",
            AuthError::MissingHeader(NONCE_HEADER) => {
                "Random device uuid ID is required in headers."
            }
            AuthError::MissingHeader(_) => "Device identity hash is required in headers.",
            AuthError::MalformedHeader(_)
            | AuthError::HashMismatch
            | AuthError::AccountMismatch
            | AuthError::DeviceMismatch
            | AuthError::NonceMismatch => "Unauthorized user.",
            AuthError::DeviceNotRegistered => "Device not registered.",
            AuthError::AccountDeactivated => "Account is deactivated.",
            AuthError::EmailNotVerified => "Email is not verified.",
            AuthError::Store(_) => "Something went wrong.",
        }
    }
}

impl From<AuthError> for ApplicationError {
    fn from(value: AuthError) -> Self {
        let message = value.message().to_string();
        match value {
            AuthError::MissingHeader(_)
            | AuthError::MalformedHeader(_)
            | AuthError::HashMismatch
            | AuthError::AccountMismatch
            | AuthError::DeviceMismatch
            | AuthError::NonceMismatch => ApplicationError::Unauthorized(message),
            AuthError::DeviceNotRegistered => ApplicationError::NotFound(message),
            AuthError::AccountDeactivated | AuthError::EmailNotVerified => {
                ApplicationError::Forbidden(message)
            }
            AuthError::Store(err) => err.into(),
        }
    }
}

fn same_secret(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}

/// 从请求头或握手头中提取出的鉴权输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCredentials {
    pub device_id: DeviceId,
    pub account_id: AccountId,
    /// 客户端原样提交的 user-id，参与哈希计算
    raw_account_id: String,
    pub nonce: String,
    pub identity_hash: String,
    /// 规范化后的 User-Agent，缺失时为 "Unknown"
    pub user_agent: String,
}

impl DeviceCredentials {
    /// 按固定顺序读取四个必需字段，空白值视为缺失。
    pub fn from_lookup<'a, F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&'static str) -> Option<&'a str>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or(AuthError::MissingHeader(name))
        };

        let device_id = require(DEVICE_ID_HEADER)?;
        let raw_account_id = require(USER_ID_HEADER)?;
        let nonce = require(NONCE_HEADER)?;
        let identity_hash = require(IDENTITY_HASH_HEADER)?;

        let account_id = AccountId::parse(raw_account_id)
            .map_err(|_| AuthError::MalformedHeader(USER_ID_HEADER))?;

        Ok(Self {
            device_id: DeviceId::new(device_id),
            account_id,
            raw_account_id: raw_account_id.to_owned(),
            nonce: nonce.to_owned(),
            identity_hash: identity_hash.to_owned(),
            user_agent: effective_user_agent(lookup(USER_AGENT_HEADER)).to_owned(),
        })
    }

    fn expected_hash(&self) -> String {
        validation_hash(&self.raw_account_id, self.device_id.as_str(), &self.nonce)
    }
}

/// 鉴权通过的账户以及本次使用的设备
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub account: Account,
    pub device_id: DeviceId,
}

impl AuthenticatedAccount {
    pub fn id(&self) -> AccountId {
        self.account.id
    }
}

pub struct AuthGuard {
    accounts: Arc<dyn AccountRepository>,
    clock: Arc<dyn Clock>,
}

impl AuthGuard {
    pub fn new(accounts: Arc<dyn AccountRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { accounts, clock }
    }

    /// 校验核心：设备查找 -> 哈希比对 -> 账户归属 -> 设备 ID 重新推导 ->
    /// 登录时签发的 nonce -> 激活与验证状态。
    /// 成功后把该设备标记为已登录，标记失败只记录日志。
    pub async fn verify(
        &self,
        credentials: &DeviceCredentials,
    ) -> Result<AuthenticatedAccount, AuthError> {
        let account = self
            .accounts
            .find_by_device_id(&credentials.device_id)
            .await?
            .ok_or(AuthError::DeviceNotRegistered)?;
        let device = account
            .device(&credentials.device_id)
            .ok_or(AuthError::DeviceNotRegistered)?;

        if !same_secret(&credentials.expected_hash(), &credentials.identity_hash) {
            return Err(AuthError::HashMismatch);
        }
        if account.id != credentials.account_id {
            return Err(AuthError::AccountMismatch);
        }
        let derived = device_hash(account.email.as_str(), &credentials.user_agent);
        if derived != credentials.device_id {
            return Err(AuthError::DeviceMismatch);
        }
        // 只有最近一次登录签发的 nonce 有效
        if !same_secret(&device.random_device_uuid, &credentials.nonce) {
            return Err(AuthError::NonceMismatch);
        }
        if !account.is_activated {
            return Err(AuthError::AccountDeactivated);
        }
        if !account.is_email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        if let Err(err) = self
            .accounts
            .mark_device_logged_in(account.id, &credentials.device_id, self.clock.now())
            .await
        {
            warn!(
                account_id = %account.id,
                device_id = %credentials.device_id,
                error = %err,
                "failed to mark device as logged in"
            );
        }

        debug!(account_id = %account.id, "device authenticated");
        Ok(AuthenticatedAccount {
            device_id: credentials.device_id.clone(),
            account,
        })
    }

    /// 解析头部并校验，缺失字段在访问存储前即被拒绝
    pub async fn authenticate<'a, F>(&self, lookup: F) -> Result<AuthenticatedAccount, AuthError>
    where
        F: Fn(&'static str) -> Option<&'a str>,
    {
        let credentials = DeviceCredentials::from_lookup(lookup)?;
        self.verify(&credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::InMemoryAccountRepository;
    use chrono::Utc;
    use domain::{DeviceRecord, MockAccountRepository, PasswordHash, UserEmail};
    use std::collections::HashMap;
    use uuid::Uuid;

    const NONCE: &str = "5f7e1a0c-0d51-4c43-9b1f-0f1f6a8e2b11";
    const EMAIL: &str = "x@example.com";
    const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0";

    fn device_id() -> DeviceId {
        device_hash(EMAIL, FIREFOX)
    }

    fn record(nonce: &str) -> DeviceRecord {
        DeviceRecord {
            device_id: device_id(),
            device_name: "Unknown Device".into(),
            os: "Linux".into(),
            browser: "Firefox".into(),
            device_type: "PC".into(),
            is_logged_in: false,
            random_device_uuid: nonce.into(),
            last_seen_at: None,
        }
    }

    fn account(is_activated: bool, is_email_verified: bool) -> Account {
        Account {
            id: AccountId::new(Uuid::new_v4()),
            email: UserEmail::parse(EMAIL).unwrap(),
            password: PasswordHash::new("hash").unwrap(),
            is_activated,
            is_email_verified,
            device_info: vec![record(NONCE)],
            created_at: Utc::now(),
        }
    }

    fn headers_with_nonce(account_id: AccountId, nonce: &str) -> HashMap<&'static str, String> {
        let user_id = account_id.to_string();
        let device_id = device_id().as_str().to_string();
        let hash = validation_hash(&user_id, &device_id, nonce);
        HashMap::from([
            (DEVICE_ID_HEADER, device_id),
            (USER_ID_HEADER, user_id),
            (NONCE_HEADER, nonce.to_string()),
            (IDENTITY_HASH_HEADER, hash),
            (USER_AGENT_HEADER, FIREFOX.to_string()),
        ])
    }

    fn headers(account_id: AccountId) -> HashMap<&'static str, String> {
        headers_with_nonce(account_id, NONCE)
    }

    fn guard(repo: MockAccountRepository) -> AuthGuard {
        AuthGuard::new(Arc::new(repo), Arc::new(FixedClock(Utc::now())))
    }

    fn repo_returning(account: Account) -> MockAccountRepository {
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_device_id()
            .returning(move |_| Ok(Some(account.clone())));
        repo.expect_mark_device_logged_in()
            .returning(|_, _, _| Ok(()));
        repo
    }

    #[tokio::test]
    async fn missing_header_is_rejected_without_storage_access() {
        for missing in [DEVICE_ID_HEADER, USER_ID_HEADER, NONCE_HEADER, IDENTITY_HASH_HEADER] {
            let mut repo = MockAccountRepository::new();
            repo.expect_find_by_device_id().times(0);
            repo.expect_mark_device_logged_in().times(0);
            let guard = guard(repo);

            let mut map = headers(AccountId::new(Uuid::new_v4()));
            map.remove(missing);

            let err = guard
                .authenticate(|name| map.get(name).map(String::as_str))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::MissingHeader(name) if name == missing));
        }
    }

    #[tokio::test]
    async fn blank_header_counts_as_missing() {
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_device_id().times(0);
        let guard = guard(repo);

        let mut map = headers(AccountId::new(Uuid::new_v4()));
        map.insert(NONCE_HEADER, "   ".into());

        let err = guard
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Random device uuid ID is required in headers.");
    }

    #[tokio::test]
    async fn malformed_user_id_is_rejected_before_lookup() {
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_device_id().times(0);
        let guard = guard(repo);

        let mut map = headers(AccountId::new(Uuid::new_v4()));
        map.insert(USER_ID_HEADER, "not-a-uuid".into());

        let err = guard
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader(_)));
    }

    #[test]
    fn absent_user_agent_reads_as_unknown() {
        let mut map = headers(AccountId::new(Uuid::new_v4()));
        map.remove(USER_AGENT_HEADER);

        let credentials =
            DeviceCredentials::from_lookup(|name| map.get(name).map(String::as_str)).unwrap();
        assert_eq!(credentials.user_agent, "Unknown");
    }

    #[tokio::test]
    async fn valid_credentials_authenticate_and_mark_device() {
        let account = account(true, true);
        let account_id = account.id;
        let mut repo = MockAccountRepository::new();
        let returned = account.clone();
        repo.expect_find_by_device_id()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));
        repo.expect_mark_device_logged_in()
            .withf(move |id, device, _| *id == account_id && device.as_str() == device_id().as_str())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let guard = guard(repo);

        let map = headers(account_id);
        let authenticated = guard
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap();

        assert_eq!(authenticated.id(), account_id);
        assert_eq!(authenticated.device_id, device_id());
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_device_id().returning(|_| Ok(None));
        let guard = guard(repo);

        let map = headers(AccountId::new(Uuid::new_v4()));
        let err = guard
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::DeviceNotRegistered));
        assert!(matches!(
            ApplicationError::from(err),
            ApplicationError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn tampered_hash_is_unauthorized() {
        let account = account(true, true);
        let mut map = headers(account.id);
        map.insert(IDENTITY_HASH_HEADER, "0".repeat(64));
        let guard = guard(repo_returning(account));

        let err = guard
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::HashMismatch));
    }

    #[tokio::test]
    async fn hash_for_another_account_is_unauthorized() {
        let account = account(true, true);
        // 哈希自洽，但 user-id 不是设备所属账户
        let map = headers(AccountId::new(Uuid::new_v4()));
        let guard = guard(repo_returning(account));

        let err = guard
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountMismatch));
        assert!(matches!(
            ApplicationError::from(err),
            ApplicationError::Unauthorized(_)
        ));
    }

    fn repo_never_marking(account: Account) -> MockAccountRepository {
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_device_id()
            .returning(move |_| Ok(Some(account.clone())));
        repo.expect_mark_device_logged_in().times(0);
        repo
    }

    #[tokio::test]
    async fn self_consistent_hash_with_forged_nonce_is_unauthorized() {
        let account = account(true, true);
        // 客户端自己编造 nonce 并据此算出自洽的哈希
        let map = headers_with_nonce(account.id, "00000000-0000-4000-8000-000000000000");

        let err = guard(repo_never_marking(account))
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NonceMismatch));
        assert_eq!(err.message(), "Unauthorized user.");
        assert!(matches!(
            ApplicationError::from(err),
            ApplicationError::Unauthorized(_)
        ));
    }

    #[tokio::test]
    async fn nonce_from_an_earlier_login_is_rejected() {
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let account = account(true, true);
        accounts.insert(account.clone()).await;
        let guard = AuthGuard::new(accounts.clone(), Arc::new(FixedClock(Utc::now())));

        let first = headers(account.id);
        guard
            .authenticate(|name| first.get(name).map(String::as_str))
            .await
            .unwrap();

        // 再次登录会替换设备上的 nonce
        let renewed = "9a0b3c4d-1e2f-4a5b-8c6d-7e8f9a0b1c2d";
        accounts.upsert_device(account.id, record(renewed)).await.unwrap();

        let err = guard
            .authenticate(|name| first.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NonceMismatch));

        let second = headers_with_nonce(account.id, renewed);
        let authenticated = guard
            .authenticate(|name| second.get(name).map(String::as_str))
            .await
            .unwrap();
        assert_eq!(authenticated.id(), account.id);
    }

    #[tokio::test]
    async fn user_agent_other_than_the_login_one_is_unauthorized() {
        let account = account(true, true);
        let mut map = headers(account.id);
        map.insert(USER_AGENT_HEADER, "curl/8.5.0".into());

        let err = guard(repo_never_marking(account.clone()))
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DeviceMismatch));

        // 登录时带了 User-Agent，鉴权时省略也不行
        map.remove(USER_AGENT_HEADER);
        let err = guard(repo_never_marking(account))
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DeviceMismatch));
        assert!(matches!(
            ApplicationError::from(err),
            ApplicationError::Unauthorized(_)
        ));
    }

    #[tokio::test]
    async fn inactive_or_unverified_account_is_forbidden() {
        let inactive = account(false, true);
        let map = headers(inactive.id);
        let err = guard(repo_returning(inactive))
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Account is deactivated.");

        let unverified = account(true, false);
        let map = headers(unverified.id);
        let err = guard(repo_returning(unverified))
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Email is not verified.");
        assert!(matches!(
            ApplicationError::from(err),
            ApplicationError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn failing_login_marker_does_not_reject() {
        let account = account(true, true);
        let map = headers(account.id);
        let returned = account.clone();
        let mut repo = MockAccountRepository::new();
        repo.expect_find_by_device_id()
            .returning(move |_| Ok(Some(returned.clone())));
        repo.expect_mark_device_logged_in()
            .returning(|_, _, _| Err(RepositoryError::storage("down")));

        let authenticated = guard(repo)
            .authenticate(|name| map.get(name).map(String::as_str))
            .await
            .unwrap();
        assert_eq!(authenticated.id(), account.id);
    }
}
