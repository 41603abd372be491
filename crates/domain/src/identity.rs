//! 设备身份与房间身份的哈希推导
//!
//! 全部为纯函数：相同输入永远得到相同输出，服务端无需保存会话即可重新计算。
//! 所有哈希均为 SHA-256，输出小写十六进制。

use data_encoding::HEXLOWER;
use ring::digest::{digest, SHA256};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::value_objects::{AccountId, DeviceId, RoomId};

const VALIDATION_ACCOUNT_SEPARATOR: &str = "leo";
const VALIDATION_DEVICE_SEPARATOR: &str = "chat";

fn sha256_hex(input: &str) -> String {
    HEXLOWER.encode(digest(&SHA256, input.as_bytes()).as_ref())
}

/// 由账户邮箱与客户端设备信息（User-Agent 等）推导设备 ID。
pub fn device_hash(email: &str, device_metadata: &str) -> DeviceId {
    DeviceId::new(sha256_hex(&format!("{email}{device_metadata}")))
}

/// 绑定账户、设备与本次登录 nonce 的校验哈希。
pub fn validation_hash(account_id: &str, device_id: &str, nonce: &str) -> String {
    sha256_hex(&format!(
        "{account_id}{VALIDATION_ACCOUNT_SEPARATOR}{device_id}{VALIDATION_DEVICE_SEPARATOR}{nonce}"
    ))
}

/// 对已排序并拼接的成员 ID 串求哈希。调用方负责排序。
pub fn room_hash(sorted_concatenated_member_ids: &str) -> String {
    sha256_hex(sorted_concatenated_member_ids)
}

/// 由成员集合推导房间 ID：去重、按规范字符串排序、拼接、哈希，取前 128 位。
pub fn derive_room_id(member_ids: &[AccountId]) -> Result<RoomId, DomainError> {
    let mut canonical: Vec<String> = member_ids.iter().map(|id| id.to_string()).collect();
    canonical.sort();
    canonical.dedup();

    if canonical.len() < 2 {
        return Err(DomainError::invalid_identifier(
            "a room needs at least two distinct members",
        ));
    }

    let hash = room_hash(&canonical.concat());
    Uuid::try_parse(&hash[..32])
        .map(RoomId::from)
        .map_err(|err| DomainError::invalid_identifier(err.to_string()))
}

pub fn parse_member_ids<S: AsRef<str>>(member_ids: &[S]) -> Result<Vec<AccountId>, DomainError> {
    member_ids
        .iter()
        .map(|raw| AccountId::parse(raw.as_ref()))
        .collect()
}
