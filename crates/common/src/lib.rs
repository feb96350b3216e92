// ================
// common/src/lib.rs
// ================
//! Common types and structures
//! used for communication between Parley clients and the server.
//! This module defines the WebSocket protocol events and the persisted
//! document shapes that travel over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque user identifier
pub type UserId = String;
/// Room identifier, see [`room_id_for`]
pub type RoomId = String;

/// Prefix shared by every one-on-one room id
pub const ROOM_PREFIX: &str = "room_";
/// Author id used for server generated messages
pub const SYSTEM_USER_ID: &str = "system";
/// Display name used for server generated messages
pub const SYSTEM_DISPLAY_NAME: &str = "System";
/// Display name used when a claim or record carries none
pub const ANONYMOUS: &str = "Anonymous";

/// Deterministic room id for an unordered pair of users.
///
/// `room_id_for(a, b) == room_id_for(b, a)` for every pair. User ids never
/// contain `_`, so distinct pairs never share a room id.
pub fn room_id_for(a: &str, b: &str) -> RoomId {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{ROOM_PREFIX}{low}_{high}")
}

/// Role carried in an identity claim (`position` on the wire)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Admin,
    Employee,
    Manager,
    #[serde(rename = "CEO")]
    Ceo,
    #[serde(rename = "HR")]
    Hr,
    Client,
    TeamLeader,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
            Role::Employee => "Employee",
            Role::Manager => "Manager",
            Role::Ceo => "CEO",
            Role::Hr => "HR",
            Role::Client => "Client",
            Role::TeamLeader => "TeamLeader",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [Role; 8] = [
            Role::User,
            Role::Admin,
            Role::Employee,
            Role::Manager,
            Role::Ceo,
            Role::Hr,
            Role::Client,
            Role::TeamLeader,
        ];
        ALL.into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown role {s:?}"))
    }
}

/// Persisted one-on-one room
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: RoomId,
    /// Persisted members, sorted at creation
    pub members: Vec<UserId>,
    pub creator_id: UserId,
    pub company_id: String,
    pub is_one_on_one: bool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Build a fresh one-on-one room for `creator` and `other`
    pub fn one_on_one(creator: &str, other: &str, company_id: &str) -> Self {
        let mut members = vec![creator.to_string(), other.to_string()];
        members.sort();
        Self {
            room_id: room_id_for(creator, other),
            members,
            creator_id: creator.to_string(),
            company_id: company_id.to_string(),
            is_one_on_one: true,
            created_at: Utc::now(),
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    /// The member that is not `user_id`, if any
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        self.members
            .iter()
            .map(String::as_str)
            .find(|m| *m != user_id)
    }
}

/// Persisted chat message, also the payload of `newMessage`/`messageUpdated`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    #[serde(rename = "userId")]
    pub author_id: UserId,
    #[serde(rename = "username")]
    pub author_name: String,
    pub body: String,
    pub room_id: RoomId,
    pub company_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// User record as stored by the identity collaborator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: UserId,
    #[serde(rename = "firstName")]
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "position")]
    pub role: Role,
    pub company_id: String,
}

/// Events sent from client to server.
///
/// Every room scoped event names its room explicitly.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    SendMessage { room_id: RoomId, body: String },
    EditMessage {
        room_id: RoomId,
        message_id: String,
        new_body: String,
    },
    DeleteMessage { room_id: RoomId, message_id: String },
    Typing { room_id: RoomId },
    StopTyping { room_id: RoomId },
    StartChat { other_user_id: UserId },
    JoinChat { room_id: RoomId },
    LeaveChat { room_id: RoomId },
    DeleteChat { room_id: RoomId },
}

impl ClientEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SendMessage { .. } => "sendMessage",
            ClientEvent::EditMessage { .. } => "editMessage",
            ClientEvent::DeleteMessage { .. } => "deleteMessage",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::StopTyping { .. } => "stopTyping",
            ClientEvent::StartChat { .. } => "startChat",
            ClientEvent::JoinChat { .. } => "joinChat",
            ClientEvent::LeaveChat { .. } => "leaveChat",
            ClientEvent::DeleteChat { .. } => "deleteChat",
        }
    }

    /// Target room of the event; `None` only for `startChat`
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ClientEvent::SendMessage { room_id, .. }
            | ClientEvent::EditMessage { room_id, .. }
            | ClientEvent::DeleteMessage { room_id, .. }
            | ClientEvent::Typing { room_id }
            | ClientEvent::StopTyping { room_id }
            | ClientEvent::JoinChat { room_id }
            | ClientEvent::LeaveChat { room_id }
            | ClientEvent::DeleteChat { room_id } => Some(room_id),
            ClientEvent::StartChat { .. } => None,
        }
    }
}

/// Canonical room state announced to both parties
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatCreated {
    pub room_id: RoomId,
    pub other_user_id: UserId,
    pub users: Vec<UserId>,
    pub creator: UserId,
}

/// One entry of the online roster
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JoinConfirmation {
    pub room: RoomId,
    pub users: Vec<OnlineUser>,
}

/// Who did something in which room
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: UserId,
    pub username: String,
    pub room_id: RoomId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStoppedTyping {
    pub user_id: UserId,
    pub room_id: RoomId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatLeft {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatDeleted {
    pub room_id: RoomId,
    pub message: String,
}

/// Events sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    ChatCreated(ChatCreated),
    NewMessage(ChatMessage),
    MessageUpdated(ChatMessage),
    MessageDeleted(MessageDeleted),
    UserTyping(UserPresence),
    UserStoppedTyping(UserStoppedTyping),
    UserJoined(UserPresence),
    UserLeft(UserPresence),
    UserLeftChat(UserPresence),
    ChatLeft(ChatLeft),
    ChatDeleted(ChatDeleted),
    JoinConfirmation(JoinConfirmation),
    /// Rejection of an inbound event, sent to the originating connection only
    ErrorMessage(String),
}

impl ServerEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ChatCreated(_) => "chatCreated",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::MessageUpdated(_) => "messageUpdated",
            ServerEvent::MessageDeleted(_) => "messageDeleted",
            ServerEvent::UserTyping(_) => "userTyping",
            ServerEvent::UserStoppedTyping(_) => "userStoppedTyping",
            ServerEvent::UserJoined(_) => "userJoined",
            ServerEvent::UserLeft(_) => "userLeft",
            ServerEvent::UserLeftChat(_) => "userLeftChat",
            ServerEvent::ChatLeft(_) => "chatLeft",
            ServerEvent::ChatDeleted(_) => "chatDeleted",
            ServerEvent::JoinConfirmation(_) => "joinConfirmation",
            ServerEvent::ErrorMessage(_) => "errorMessage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_id_is_order_independent() {
        assert_eq!(room_id_for("u1", "u2"), "room_u1_u2");
        assert_eq!(room_id_for("u2", "u1"), "room_u1_u2");
        assert_eq!(room_id_for("b", "a"), room_id_for("a", "b"));
    }

    #[test]
    fn test_one_on_one_room_members_sorted() {
        let room = Room::one_on_one("zed", "amy", "c1");
        assert_eq!(room.room_id, "room_amy_zed");
        assert_eq!(room.members, vec!["amy".to_string(), "zed".to_string()]);
        assert_eq!(room.creator_id, "zed");
        assert_eq!(room.counterpart_of("zed"), Some("amy"));
        assert!(room.has_member("amy"));
        assert!(!room.has_member("bob"));
    }

    #[test]
    fn test_client_event_wire_format() {
        let raw = json!({
            "event": "editMessage",
            "data": { "roomId": "room_a_b", "messageId": "m1", "newBody": "hi there" }
        });
        let parsed: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            parsed,
            ClientEvent::EditMessage {
                room_id: "room_a_b".to_string(),
                message_id: "m1".to_string(),
                new_body: "hi there".to_string(),
            }
        );
        assert_eq!(parsed.kind(), "editMessage");
        assert_eq!(parsed.room_id(), Some("room_a_b"));

        let start: ClientEvent = serde_json::from_value(json!({
            "event": "startChat",
            "data": { "otherUserId": "u2" }
        }))
        .unwrap();
        assert_eq!(start.room_id(), None);
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        let raw = json!({ "event": "shout", "data": { "roomId": "room_a_b" } });
        assert!(serde_json::from_value::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn test_server_event_wire_format() {
        let err = serde_json::to_value(ServerEvent::ErrorMessage("Chat not found".into())).unwrap();
        assert_eq!(err, json!({ "event": "errorMessage", "data": "Chat not found" }));

        let typing = serde_json::to_value(ServerEvent::UserStoppedTyping(UserStoppedTyping {
            user_id: "u1".into(),
            room_id: "room_u1_u2".into(),
        }))
        .unwrap();
        assert_eq!(typing["event"], "userStoppedTyping");
        assert_eq!(typing["data"]["userId"], "u1");
        assert_eq!(typing["data"]["roomId"], "room_u1_u2");
    }

    #[test]
    fn test_chat_message_field_names() {
        let msg = ChatMessage {
            id: Uuid::new_v4(),
            author_id: "u1".into(),
            author_name: "Ann".into(),
            body: "hi".into(),
            room_id: "room_u1_u2".into(),
            company_id: "c1".into(),
            created_at: Utc::now(),
            updated_at: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["username"], "Ann");
        assert_eq!(value["roomId"], "room_u1_u2");
        assert!(value["updatedAt"].is_null());
    }

    #[test]
    fn test_role_wire_names() {
        let role: Role = serde_json::from_value(json!("CEO")).unwrap();
        assert_eq!(role, Role::Ceo);
        assert_eq!(Role::TeamLeader.to_string(), "TeamLeader");
        assert!(serde_json::from_value::<Role>(json!("Intern")).is_err());
        assert_eq!("HR".parse::<Role>(), Ok(Role::Hr));
        assert!("admin".parse::<Role>().is_err());
    }
}
