//! Multi-room WebSocket Chat Hub Library
//!
//! A group chat server built with tokio-tungstenite. Users connect, join
//! named rooms and broadcast text messages to everyone currently in the room.
//!
//! # Features
//! - JWT or username login during the WebSocket handshake
//! - Room creation (idempotent), joining and leaving
//! - Broadcast to all room members, with optional echo to the sender
//! - Join/leave announcements
//! - Slow consumer handling (eviction or per-recipient drop)
//! - Automatic teardown of empty rooms
//!
//! # Architecture
//! - `Hub` is the directory of clients and rooms behind one `RwLock`; its
//!   operations run on the caller's task
//! - Each `Room` is an actor task owning its membership, fed by register,
//!   unregister and broadcast channels
//! - Each connection has a read pump and a write pump sharing a bounded
//!   `Mailbox`
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use room_hub::{handle_connection, Hub, JwtAuthenticator, DEFAULT_TOKEN_TTL};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let hub = Hub::default();
//!     let auth = Arc::new(JwtAuthenticator::new(b"secret", DEFAULT_TOKEN_TTL));
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, hub.clone(), auth.clone()));
//!     }
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod mailbox;
pub mod message;
pub mod room;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use auth::{Authenticator, JwtAuthenticator};
pub use client::Client;
pub use config::{BackpressurePolicy, HubConfig, ServerConfig, DEFAULT_TOKEN_TTL};
pub use error::{AppError, AuthError, ConfigError, DeliveryError, HubError, TransportError};
pub use handler::handle_connection;
pub use hub::Hub;
pub use mailbox::Mailbox;
pub use message::{ClientMessage, ErrorCode, Message, Outbound, ServerMessage};
pub use room::RoomHandle;
pub use transport::{FrameSink, FrameSource};
pub use types::{ClientId, RoomId, RoomName, Username};
