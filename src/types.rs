//! Basic type definitions for the chat hub
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: UUID-based identifier of one connection
//! - `RoomId`: UUID-based identifier of one room actor instance
//! - `Username`: non-empty user identity, the key of the client directory
//! - `RoomName`: non-empty room name, the key of the room directory

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HubError;

/// Unique connection identifier (newtype pattern)
///
/// A user who reconnects under the same name gets a new `ClientId`, which lets
/// a stale connection's cleanup tell itself apart from its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one room actor instance
///
/// A room recreated under the same name gets a fresh `RoomId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identity, as returned by the authenticator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Validate a raw identity
    ///
    /// Rejects empty and whitespace-only names; the name is otherwise kept verbatim.
    pub fn parse(raw: impl Into<String>) -> Result<Self, HubError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(HubError::InvalidArgument("username cannot be empty"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room name (unique among live rooms)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Validate a raw room name
    pub fn parse(raw: impl Into<String>) -> Result<Self, HubError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(HubError::InvalidArgument("room name cannot be empty"));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RoomName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
