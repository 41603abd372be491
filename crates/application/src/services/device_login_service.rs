use std::sync::Arc;

use domain::{device_hash, AccountId, AccountRepository, DeviceRecord, UserEmail};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    clock::Clock,
    device_profile::{classify_user_agent, effective_user_agent},
    error::ApplicationError,
    password::PasswordHasher,
};

#[derive(Debug, Clone)]
pub struct CredentialLoginRequest {
    pub email: String,
    pub password: String,
    /// 缺失时按 "Unknown" 参与设备 ID 计算
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceLogin {
    pub device_info: DeviceRecord,
    pub email: UserEmail,
    pub user_id: AccountId,
}

pub struct DeviceLoginServiceDependencies {
    pub account_repository: Arc<dyn AccountRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct DeviceLoginService {
    deps: DeviceLoginServiceDependencies,
}

impl DeviceLoginService {
    pub fn new(deps: DeviceLoginServiceDependencies) -> Self {
        Self { deps }
    }

    /// 校验邮箱密码，为当前设备签发新的 nonce 并登记设备记录。
    pub async fn login_with_credentials(
        &self,
        request: CredentialLoginRequest,
    ) -> Result<DeviceLogin, ApplicationError> {
        let email = UserEmail::parse(request.email)?;
        let account = self
            .deps
            .account_repository
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ApplicationError::not_found("User does not exists."))?;

        let valid = self
            .deps
            .password_hasher
            .verify(&request.password, &account.password)
            .await?;
        if !valid {
            return Err(ApplicationError::Unauthorized("Invalid Credentials.".into()));
        }

        let user_agent = effective_user_agent(request.user_agent.as_deref());
        let profile = classify_user_agent(user_agent);

        let device = DeviceRecord {
            device_id: device_hash(account.email.as_str(), user_agent),
            device_name: profile.device_name,
            os: profile.os,
            browser: profile.browser,
            device_type: profile.device_type,
            is_logged_in: true,
            random_device_uuid: Uuid::new_v4().to_string(),
            last_seen_at: Some(self.deps.clock.now()),
        };

        self.deps
            .account_repository
            .upsert_device(account.id, device.clone())
            .await?;

        info!(account_id = %account.id, device_id = %device.device_id, "device logged in");
        Ok(DeviceLogin {
            device_info: device,
            email: account.email,
            user_id: account.id,
        })
    }
}
