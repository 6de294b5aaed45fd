//! Shared helpers for hub integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use room_hub::transport::memory::{self, RemotePeer};
use room_hub::{Client, FrameSink, Hub, HubConfig, TransportError};

/// Upper bound for anything that is eventually consistent.
pub const SETTLE: Duration = Duration::from_secs(2);

/// Poll `condition` against `hub` until it holds, failing the test after
/// `SETTLE`.
pub async fn eventually<F, Fut>(hub: &Hub, what: &str, condition: F)
where
    F: Fn(Hub) -> Fut,
    Fut: Future<Output = bool>,
{
    let polled = tokio::time::timeout(SETTLE, async {
        while !condition(hub.clone()).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for: {}", what);
}

/// Hub without join/leave announcements, so peers only see chat traffic.
pub fn quiet_hub() -> Hub {
    Hub::new(HubConfig {
        announce_membership: false,
        ..HubConfig::default()
    })
}

/// Register `name` over an in-memory transport.
pub async fn connect(hub: &Hub, name: &str) -> (Client, RemotePeer) {
    let (source, sink, peer) = memory::channel();
    let client = hub
        .register_user(name, source, sink)
        .await
        .expect("registration failed");
    (client, peer)
}

/// Next frame written to `peer`, decoded.
pub async fn next_frame(peer: &mut RemotePeer) -> serde_json::Value {
    let frame = tokio::time::timeout(SETTLE, peer.recv())
        .await
        .expect("no frame within timeout")
        .expect("connection closed");
    serde_json::from_str(&frame).expect("frame is not JSON")
}

/// Assert nothing more arrives within a short grace period.
pub async fn assert_silent(peer: &mut RemotePeer) {
    let extra = tokio::time::timeout(Duration::from_millis(100), peer.recv()).await;
    assert!(extra.is_err(), "unexpected frame: {:?}", extra);
}

/// Sink whose writes never complete, like a peer that stopped reading.
pub struct StalledSink;

#[async_trait]
impl FrameSink for StalledSink {
    async fn send_frame(&mut self, _frame: String) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn close(&mut self) {}
}
