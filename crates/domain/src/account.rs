use serde::{Deserialize, Serialize};

use crate::value_objects::{AccountId, DeviceId, PasswordHash, Timestamp, UserEmail};

/// 账户下的一台登录设备。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub device_name: String,
    pub os: String,
    pub browser: String,
    pub device_type: String,
    pub is_logged_in: bool,
    /// 每次登录签发的随机 nonce，客户端据此计算 device_identity_hash
    pub random_device_uuid: String,
    pub last_seen_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub email: UserEmail,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub is_activated: bool,
    pub is_email_verified: bool,
    pub device_info: Vec<DeviceRecord>,
    pub created_at: Timestamp,
}

impl Account {
    pub fn device(&self, device_id: &DeviceId) -> Option<&DeviceRecord> {
        self.device_info
            .iter()
            .find(|device| &device.device_id == device_id)
    }

    /// 存在同 device_id 的记录则原地替换，否则追加。保证每个 device_id 至多一条。
    pub fn upsert_device(&mut self, record: DeviceRecord) {
        match self
            .device_info
            .iter_mut()
            .find(|device| device.device_id == record.device_id)
        {
            Some(existing) => *existing = record,
            None => self.device_info.push(record),
        }
    }

    pub fn mark_device_logged_in(&mut self, device_id: &DeviceId, at: Timestamp) -> bool {
        match self
            .device_info
            .iter_mut()
            .find(|device| &device.device_id == device_id)
        {
            Some(device) => {
                device.is_logged_in = true;
                device.last_seen_at = Some(at);
                true
            }
            None => false,
        }
    }
}
