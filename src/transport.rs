//! Transport seam
//!
//! The hub only needs a message-oriented duplex connection: a source of
//! inbound text frames and a sink for outbound ones. `ws` adapts a split
//! tokio-tungstenite stream; `memory` is an in-process pair used by tests and
//! embedders.

use async_trait::async_trait;

use crate::error::TransportError;

/// Inbound half of a connection, owned by the read pump
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Next inbound frame; `Ok(None)` once the peer has closed the connection
    async fn receive_frame(&mut self) -> Result<Option<String>, TransportError>;
}

/// Outbound half of a connection, owned by the write pump
#[async_trait]
pub trait FrameSink: Send + 'static {
    async fn send_frame(&mut self, frame: String) -> Result<(), TransportError>;

    /// Close the connection; errors are ignored
    async fn close(&mut self);
}

pub mod ws {
    //! WebSocket transport over tokio-tungstenite

    use async_trait::async_trait;
    use futures_util::stream::{SplitSink, SplitStream};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::WebSocketStream;
    use tracing::{debug, warn};

    use super::{FrameSink, FrameSource};
    use crate::error::TransportError;

    pub struct WsSource(SplitStream<WebSocketStream<TcpStream>>);

    pub struct WsSink(SplitSink<WebSocketStream<TcpStream>, WsMessage>);

    /// Split an accepted WebSocket into its two halves
    pub fn split(stream: WebSocketStream<TcpStream>) -> (WsSource, WsSink) {
        let (sink, source) = stream.split();
        (WsSource(source), WsSink(sink))
    }

    #[async_trait]
    impl FrameSource for WsSource {
        async fn receive_frame(&mut self) -> Result<Option<String>, TransportError> {
            while let Some(msg) = self.0.next().await {
                match msg? {
                    WsMessage::Text(text) => return Ok(Some(text.to_string())),
                    WsMessage::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => return Ok(Some(text)),
                        Err(_) => warn!("Ignoring non UTF-8 binary frame"),
                    },
                    WsMessage::Close(_) => {
                        debug!("Peer sent close frame");
                        return Ok(None);
                    }
                    // Pong is handled automatically by tungstenite
                    _ => {}
                }
            }
            Ok(None)
        }
    }

    #[async_trait]
    impl FrameSink for WsSink {
        async fn send_frame(&mut self, frame: String) -> Result<(), TransportError> {
            self.0.send(WsMessage::Text(frame.into())).await?;
            Ok(())
        }

        async fn close(&mut self) {
            let _ = self.0.close().await;
        }
    }
}

pub mod memory {
    //! In-process transport backed by unbounded channels

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{FrameSink, FrameSource};
    use crate::error::TransportError;

    /// Create a connected transport and the remote end that drives it
    pub fn channel() -> (MemorySource, MemorySink, RemotePeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        (
            MemorySource(inbound_rx),
            MemorySink(Some(outbound_tx)),
            RemotePeer {
                tx: Some(inbound_tx),
                rx: outbound_rx,
            },
        )
    }

    pub struct MemorySource(mpsc::UnboundedReceiver<String>);

    pub struct MemorySink(Option<mpsc::UnboundedSender<String>>);

    /// The far side of a memory transport
    #[derive(Debug)]
    pub struct RemotePeer {
        tx: Option<mpsc::UnboundedSender<String>>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl RemotePeer {
        /// Send a frame to the server; false once disconnected
        pub fn send(&self, frame: impl Into<String>) -> bool {
            self.tx
                .as_ref()
                .is_some_and(|tx| tx.send(frame.into()).is_ok())
        }

        /// Next frame written by the server; `None` once the server closed
        pub async fn recv(&mut self) -> Option<String> {
            self.rx.recv().await
        }

        /// Frame already written by the server, if any
        pub fn try_recv(&mut self) -> Option<String> {
            self.rx.try_recv().ok()
        }

        /// Hang up the inbound direction, as a dropped connection would
        pub fn disconnect(&mut self) {
            self.tx = None;
        }
    }

    #[async_trait]
    impl FrameSource for MemorySource {
        async fn receive_frame(&mut self) -> Result<Option<String>, TransportError> {
            Ok(self.0.recv().await)
        }
    }

    #[async_trait]
    impl FrameSink for MemorySink {
        async fn send_frame(&mut self, frame: String) -> Result<(), TransportError> {
            let tx = self.0.as_ref().ok_or(TransportError::Closed)?;
            tx.send(frame).map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) {
            self.0 = None;
        }
    }

}
