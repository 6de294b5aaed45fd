//! Error types for the chat hub
//!
//! Defines hub operation failures, internal delivery failures, transport,
//! authentication and configuration errors, and the application-level error
//! that wraps them. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Failures returned by every `Hub` operation
///
/// None of these abort the calling task; the request layer maps each one to
/// an error frame for the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// Empty room name, username, content or kind
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Identity already registered
    #[error("user '{0}' already exists")]
    DuplicateUser(String),

    /// No client registered under this identity
    #[error("user '{0}' not found")]
    UnknownUser(String),

    /// No live room under this name
    #[error("room '{0}' not found")]
    UnknownRoom(String),

    /// Send or leave without a current room
    #[error("user '{0}' is not in a room")]
    NotInRoom(String),
}

/// Mailbox enqueue failures
///
/// Resolved by the room's backpressure policy, never reported to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The recipient's bounded mailbox is full
    #[error("mailbox saturated")]
    MailboxSaturated,

    /// The recipient's mailbox was retired
    #[error("mailbox retired")]
    Retired,
}

/// Transport collaborator errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The other side of the connection is gone
    #[error("transport closed")]
    Closed,
}

/// Authentication collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Neither a token nor a username was supplied
    #[error("missing credentials")]
    MissingCredentials,

    /// Token was never issued or was revoked
    #[error("invalid token")]
    InvalidToken,

    /// Token outlived its time-to-live
    #[error("token expired")]
    Expired,

    /// Token could not be signed
    #[error("token signing failed: {0}")]
    Signing(String),

    /// Login attempted with an unusable username
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] HubError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Application-level errors
///
/// Covers fatal connection errors and failures surfaced while setting up a
/// connection.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hub rejected the operation
    #[error("hub error: {0}")]
    Hub(#[from] HubError),

    /// Handshake credentials rejected
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
