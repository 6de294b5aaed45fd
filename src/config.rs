//! Runtime configuration
//!
//! Hub tuning knobs and server settings. Values come from the first command
//! line argument (bind address) and `ROOM_HUB_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::error::ConfigError;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default token lifetime (24 hours)
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What a room does when a member's mailbox is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressurePolicy {
    /// Remove the member from the room and retire its mailbox
    #[default]
    Evict,
    /// Drop the message for that member and count it
    Drop,
}

impl FromStr for BackpressurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evict" => Ok(Self::Evict),
            "drop" => Ok(Self::Drop),
            _ => Err(()),
        }
    }
}

/// Hub and room tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Outbound frames queued per client
    pub mailbox_capacity: usize,
    /// Pending register/unregister requests per room
    pub membership_capacity: usize,
    /// Pending broadcasts per room
    pub broadcast_capacity: usize,
    pub backpressure: BackpressurePolicy,
    /// Deliver a broadcast back to its sender
    pub echo_to_sender: bool,
    /// Tell room members when someone joins or leaves
    pub announce_membership: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 32,
            membership_capacity: 10,
            broadcast_capacity: 1000,
            backpressure: BackpressurePolicy::Evict,
            echo_to_sender: false,
            announce_membership: true,
        }
    }
}

/// Process-level settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub token_ttl: Duration,
    /// HS256 signing secret for session tokens
    pub jwt_secret: String,
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            // Per-process secret: tokens do not survive a restart
            jwt_secret: Uuid::new_v4().simple().to_string(),
            hub: HubConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the process arguments and environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env::args().nth(1), |key| env::var(key).ok())
    }

    /// Build from an explicit address argument and variable lookup
    ///
    /// The address argument wins over `ROOM_HUB_ADDR`.
    pub fn from_lookup<F>(addr_arg: Option<String>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = addr_arg.or_else(|| lookup("ROOM_HUB_ADDR")) {
            config.addr = addr;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ROOM_HUB_TOKEN_TTL_SECS")? {
            config.token_ttl = Duration::from_secs(secs);
        }
        if let Some(secret) = lookup("ROOM_HUB_JWT_SECRET") {
            if secret.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "ROOM_HUB_JWT_SECRET",
                    value: secret,
                });
            }
            config.jwt_secret = secret;
        }

        let hub = &mut config.hub;
        if let Some(n) = parse_capacity(&lookup, "ROOM_HUB_MAILBOX_CAPACITY")? {
            hub.mailbox_capacity = n;
        }
        if let Some(n) = parse_capacity(&lookup, "ROOM_HUB_MEMBERSHIP_CAPACITY")? {
            hub.membership_capacity = n;
        }
        if let Some(n) = parse_capacity(&lookup, "ROOM_HUB_BROADCAST_CAPACITY")? {
            hub.broadcast_capacity = n;
        }
        if let Some(policy) = parse_var(&lookup, "ROOM_HUB_BACKPRESSURE")? {
            hub.backpressure = policy;
        }
        if let Some(echo) = parse_var(&lookup, "ROOM_HUB_ECHO_SENDER")? {
            hub.echo_to_sender = echo;
        }
        if let Some(announce) = parse_var(&lookup, "ROOM_HUB_ANNOUNCE")? {
            hub.announce_membership = announce;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn parse_capacity<F>(lookup: &F, key: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<usize, _>(lookup, key)? {
        Some(0) => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        other => Ok(other),
    }
}
