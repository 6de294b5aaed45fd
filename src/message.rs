//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enums
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::error::HubError;
use crate::types::{RoomName, Username};

/// A chat message as broadcast through a room
///
/// Immutable once constructed. `kind` is carried verbatim and only used for
/// routing; on the wire it is the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: String,
    username: String,
    content: String,
}

impl Message {
    /// Kind of user-authored chat messages
    pub const CHAT: &'static str = "message";
    /// Kind of room membership announcements
    pub const SYSTEM: &'static str = "system";

    pub fn new(
        kind: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            username: username.into(),
            content: content.into(),
        }
    }

    /// Create a user chat message
    pub fn chat(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Self::CHAT, username, content)
    }

    pub(crate) fn system(username: &Username, content: String) -> Self {
        Self::new(Self::SYSTEM, username.as_str(), content)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Check that kind, sender and content are all present
    pub fn validate(&self) -> Result<(), HubError> {
        if self.kind.is_empty() {
            return Err(HubError::InvalidArgument("message kind cannot be empty"));
        }
        if self.username.is_empty() {
            return Err(HubError::InvalidArgument("username cannot be empty"));
        }
        if self.content.is_empty() {
            return Err(HubError::InvalidArgument("message cannot be empty"));
        }
        Ok(())
    }
}

/// Client → Server message
///
/// All requests from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Broadcast to the current room; any `username` field is ignored
    Message { content: String },
    /// Create a room and move into it; an existing room is left as is and
    /// the sender stays where it was
    CreateRoom { room: String },
    /// Join an existing room
    JoinRoom { room: String },
    /// Leave the current room
    LeaveRoom,
    /// List live room names
    ListRooms,
    /// List the members of a room
    RoomUsers { room: String },
}

/// Server → Client replies and notifications
///
/// Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection registered
    Connected { username: Username, token: String },
    /// Room is live; `joined` is false when it already existed and the
    /// sender is not a member
    RoomCreated { room: RoomName, joined: bool },
    /// Room joined
    RoomJoined { room: RoomName },
    /// Room left
    RoomLeft { room: RoomName },
    /// Live rooms
    Rooms { rooms: Vec<RoomName> },
    /// Members of a room
    RoomUsers { room: RoomName, users: Vec<Username> },
    /// Request failed
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidArgument,
    DuplicateUser,
    UnknownUser,
    UnknownRoom,
    NotInRoom,
    /// Frame could not be decoded
    InvalidMessage,
}

/// Everything that travels through a client's mailbox
///
/// Chat messages keep their own `type` field, so the two shapes are
/// serialized side by side rather than under one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Chat(Message),
    Reply(ServerMessage),
}

impl From<Message> for Outbound {
    fn from(msg: Message) -> Self {
        Outbound::Chat(msg)
    }
}

impl From<ServerMessage> for Outbound {
    fn from(msg: ServerMessage) -> Self {
        Outbound::Reply(msg)
    }
}

/// Convert HubError to ServerMessage for client notification
impl From<HubError> for ServerMessage {
    fn from(err: HubError) -> Self {
        let code = match &err {
            HubError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            HubError::DuplicateUser(_) => ErrorCode::DuplicateUser,
            HubError::UnknownUser(_) => ErrorCode::UnknownUser,
            HubError::UnknownRoom(_) => ErrorCode::UnknownRoom,
            HubError::NotInRoom(_) => ErrorCode::NotInRoom,
        };
        ServerMessage::Error {
            code,
            message: err.to_string(),
        }
    }
}

impl ServerMessage {
    /// Error reply for a frame that failed to decode
    pub fn invalid_message(err: &serde_json::Error) -> Self {
        ServerMessage::Error {
            code: ErrorCode::InvalidMessage,
            message: format!("Invalid message format: {}", err),
        }
    }
}
