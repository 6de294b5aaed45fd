//! Client pumps
//!
//! Each registered connection runs two tasks sharing only the mailbox:
//! - the read pump turns inbound frames into hub operations and queues the
//!   replies on the client's own mailbox
//! - the write pump drains the mailbox into the transport
//!
//! Disconnect on either side ends both pumps: a dead transport stops the read
//! pump, which unregisters the client, which retires the mailbox, which stops
//! the write pump. A failed write retires the mailbox directly.

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::HubError;
use crate::hub::Hub;
use crate::mailbox::{Mailbox, MailboxReceiver};
use crate::message::{ClientMessage, Message, Outbound, ServerMessage};
use crate::transport::{FrameSink, FrameSource};
use crate::types::{ClientId, RoomName, Username};

/// A registered connection
///
/// Returned by `Hub::register_user`; dropping it does not disconnect the
/// client, the pumps keep running until the transport goes away.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    username: Username,
    mailbox: Mailbox,
    read_pump: JoinHandle<()>,
    write_pump: JoinHandle<()>,
}

impl Client {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn is_retired(&self) -> bool {
        self.mailbox.is_retired()
    }

    /// Broadcasts dropped for this client under the `Drop` policy
    pub fn dropped_messages(&self) -> u64 {
        self.mailbox.dropped()
    }

    /// Wait until both pumps have finished
    pub async fn closed(self) {
        let _ = self.read_pump.await;
        let _ = self.write_pump.await;
    }
}

/// Start the pumps for a freshly registered client
pub(crate) fn spawn<S, K>(
    hub: Hub,
    id: ClientId,
    username: Username,
    mailbox: Mailbox,
    receiver: MailboxReceiver,
    source: S,
    sink: K,
) -> Client
where
    S: FrameSource,
    K: FrameSink,
{
    let write_pump = tokio::spawn(write_pump(
        id,
        mailbox.clone(),
        receiver,
        sink,
    ));
    let read_pump = tokio::spawn(read_pump(
        hub,
        id,
        username.clone(),
        mailbox.clone(),
        source,
    ));

    Client {
        id,
        username,
        mailbox,
        read_pump,
        write_pump,
    }
}

/// Turn away a connection that could not be registered
///
/// Sends one error frame, closes the transport and hands the error back.
pub(crate) async fn reject<K: FrameSink>(sink: &mut K, err: HubError) -> HubError {
    warn!("Rejecting connection: {}", err);
    let reply = Outbound::from(ServerMessage::from(err.clone()));
    if let Ok(json) = serde_json::to_string(&reply) {
        let _ = sink.send_frame(json).await;
    }
    sink.close().await;
    err
}

/// Transport → hub
async fn read_pump<S: FrameSource>(
    hub: Hub,
    id: ClientId,
    username: Username,
    mailbox: Mailbox,
    mut source: S,
) {
    let mut retirement = mailbox.retirement();

    loop {
        let frame = tokio::select! {
            frame = source.receive_frame() => frame,
            _ = retirement.wait() => {
                debug!("Mailbox of {} retired, ending read pump", username);
                break;
            }
        };

        match frame {
            Ok(Some(text)) => {
                let reply = handle_frame(&hub, &username, &text).await;
                if let Some(reply) = reply {
                    if let Err(e) = mailbox.try_deliver(reply) {
                        warn!("Could not queue reply for {}: {}", username, e);
                    }
                }
            }
            Ok(None) => {
                debug!("Client {} closed the connection", username);
                break;
            }
            Err(e) => {
                warn!("Transport error for {}: {}", username, e);
                break;
            }
        }
    }

    match hub.unregister_client(&username, id).await {
        Ok(()) => info!("Client {} ({}) disconnected", username, id),
        Err(_) => debug!("Client {} ({}) was already unregistered", username, id),
    }
    debug!("Read pump ended for {}", username);
}

/// Mailbox → transport
async fn write_pump<K: FrameSink>(
    id: ClientId,
    mailbox: Mailbox,
    mut receiver: MailboxReceiver,
    mut sink: K,
) {
    while let Some(msg) = receiver.recv().await {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if let Err(e) = sink.send_frame(json).await {
                    debug!("Send to {} failed, ending write pump: {}", id, e);
                    mailbox.retire();
                    break;
                }
            }
            Err(e) => {
                // Continue - a single bad frame doesn't end the connection
                warn!("Failed to serialize message: {}", e);
            }
        }
    }

    sink.close().await;
    debug!("Write pump ended for {}", id);
}

/// Decode one inbound frame and run it against the hub
///
/// Returns the reply for the sender, if any. Chat messages are answered only
/// on failure; their delivery is the room's business.
async fn handle_frame(hub: &Hub, username: &Username, text: &str) -> Option<Outbound> {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid JSON from {}: {}", username, e);
            return Some(ServerMessage::invalid_message(&e).into());
        }
    };

    match dispatch(hub, username, request).await {
        Ok(reply) => reply.map(Outbound::from),
        Err(err) => {
            debug!("Request from {} failed: {}", username, err);
            Some(ServerMessage::from(err).into())
        }
    }
}

async fn dispatch(
    hub: &Hub,
    username: &Username,
    request: ClientMessage,
) -> Result<Option<ServerMessage>, HubError> {
    let who = username.as_str();
    let reply = match request {
        ClientMessage::Message { content } => {
            hub.send_message(Message::chat(who, content)).await?;
            return Ok(None);
        }
        ClientMessage::CreateRoom { room } => {
            let room = hub.create_room(who, &room).await?.name().clone();
            let joined = hub.current_room(who).await?.as_ref() == Some(&room);
            ServerMessage::RoomCreated { room, joined }
        }
        ClientMessage::JoinRoom { room } => {
            hub.join_room(who, &room).await?;
            ServerMessage::RoomJoined {
                room: RoomName::parse(room)?,
            }
        }
        ClientMessage::LeaveRoom => ServerMessage::RoomLeft {
            room: hub.leave_room(who).await?,
        },
        ClientMessage::ListRooms => ServerMessage::Rooms {
            rooms: hub.list_rooms().await,
        },
        ClientMessage::RoomUsers { room } => {
            let users = hub.get_room_users(&room).await?;
            let room = RoomName::parse(room)?;
            ServerMessage::RoomUsers { room, users }
        }
    };
    Ok(Some(reply))
}
