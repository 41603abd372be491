use crate::errors::DomainError;
use crate::identity::derive_room_id;
use crate::value_objects::{AccountId, RoomId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub members: Vec<AccountId>,
    pub created_at: Timestamp,
}

impl ChatRoom {
    /// 根据成员集合创建房间，房间 ID 由成员集合确定性推导。
    pub fn for_members(
        members: &[AccountId],
        name: Option<String>,
        description: Option<String>,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        let id = derive_room_id(members)?;

        let mut members = members.to_vec();
        members.sort();
        members.dedup();

        Ok(Self {
            id,
            name: name.filter(|value| !value.trim().is_empty()),
            description: description.filter(|value| !value.trim().is_empty()),
            members,
            created_at,
        })
    }

    pub fn has_member(&self, account_id: AccountId) -> bool {
        self.members.contains(&account_id)
    }
}
