//! Hub: the process-wide directory of clients and rooms
//!
//! The hub has no task of its own. Its operations run on the caller's task
//! under one `RwLock` protecting both directories: lookups take the read
//! lock, anything that adds, removes or moves an entry takes the write lock.
//!
//! Every submission into a room's channels is made while the lock is held.
//! A room deregisters itself under the write lock, so it can never miss a
//! request that was submitted to it (see `Room::drain`).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};

use crate::client::{self, Client};
use crate::config::HubConfig;
use crate::error::HubError;
use crate::mailbox::{self, Mailbox};
use crate::message::{Message, Outbound};
use crate::room::{Room, RoomHandle};
use crate::transport::{FrameSink, FrameSource};
use crate::types::{ClientId, RoomId, RoomName, Username};

/// Directory entry for one connected user
#[derive(Debug)]
struct ClientEntry {
    id: ClientId,
    mailbox: Mailbox,
    current_room: Option<RoomName>,
}

/// Both directories, guarded together by the hub lock
#[derive(Debug, Default)]
pub(crate) struct Directory {
    clients: HashMap<Username, ClientEntry>,
    rooms: HashMap<RoomName, RoomHandle>,
}

impl Directory {
    /// Remove a room that just emptied
    ///
    /// Only called by the room actor itself, with the write lock held. A
    /// newer room that took over the name is left alone.
    pub(crate) fn close_room(&mut self, name: &RoomName, id: RoomId) -> bool {
        match self.rooms.entry(name.clone()) {
            Entry::Occupied(entry) if entry.get().id() == id => {
                entry.remove();
                debug!("Room {} removed from directory", name);
                true
            }
            _ => false,
        }
    }

    /// Move a client into `target`, leaving its previous room first
    ///
    /// Waits for the previous room to acknowledge the removal, so the client
    /// is never a member of two rooms at once.
    async fn move_client(&mut self, username: &Username, target: &RoomName) -> Result<(), HubError> {
        let Directory { clients, rooms } = self;
        let entry = clients
            .get_mut(username)
            .ok_or_else(|| HubError::UnknownUser(username.to_string()))?;
        let room = rooms
            .get(target)
            .ok_or_else(|| HubError::UnknownRoom(target.to_string()))?;

        if let Some(previous) = entry.current_room.take() {
            if &previous != target {
                if let Some(old) = rooms.get(&previous) {
                    await_removal(old.unregister(username.clone()).await).await;
                }
            }
        }

        room.register(username.clone(), entry.mailbox.clone()).await?;
        entry.current_room = Some(target.clone());
        Ok(())
    }
}

/// Wait for a room to confirm a removal
///
/// A room that is already gone holds no membership, which counts as done.
async fn await_removal(ack: Result<oneshot::Receiver<()>, HubError>) {
    if let Ok(ack) = ack {
        let _ = ack.await;
    }
}

/// State shared by all hub handles; rooms only keep a weak reference to it
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) directory: RwLock<Directory>,
    config: HubConfig,
}

/// Process-wide registry of clients and rooms
///
/// Cheap to clone; all clones share the same directories.
#[derive(Debug, Clone)]
pub struct Hub {
    shared: Arc<Shared>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                directory: RwLock::new(Directory::default()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    /// Register a connection under `username` and start its pumps
    ///
    /// On `DuplicateUser` the transport is sent an error frame and closed.
    pub async fn register_user<S, K>(
        &self,
        username: &str,
        source: S,
        sink: K,
    ) -> Result<Client, HubError>
    where
        S: FrameSource,
        K: FrameSink,
    {
        self.register(username, source, sink, None).await
    }

    /// Like `register_user`, with `greeting` queued as the very first frame
    ///
    /// The greeting is in the mailbox before the read pump starts, so no
    /// reply can overtake it.
    pub async fn register_user_with_greeting<S, K>(
        &self,
        username: &str,
        source: S,
        sink: K,
        greeting: impl Into<Outbound>,
    ) -> Result<Client, HubError>
    where
        S: FrameSource,
        K: FrameSink,
    {
        self.register(username, source, sink, Some(greeting.into()))
            .await
    }

    async fn register<S, K>(
        &self,
        username: &str,
        source: S,
        mut sink: K,
        greeting: Option<Outbound>,
    ) -> Result<Client, HubError>
    where
        S: FrameSource,
        K: FrameSink,
    {
        let username = match Username::parse(username) {
            Ok(username) => username,
            Err(err) => return Err(client::reject(&mut sink, err).await),
        };
        let (mailbox, receiver) = mailbox::channel(self.shared.config.mailbox_capacity);
        let id = ClientId::new();
        if let Some(greeting) = greeting {
            // Fresh mailbox, not yet reachable by any room.
            let _ = mailbox.try_deliver(greeting);
        }

        {
            let mut directory = self.shared.directory.write().await;
            if directory.clients.contains_key(&username) {
                drop(directory);
                let err = HubError::DuplicateUser(username.to_string());
                return Err(client::reject(&mut sink, err).await);
            }
            directory.clients.insert(
                username.clone(),
                ClientEntry {
                    id,
                    mailbox: mailbox.clone(),
                    current_room: None,
                },
            );
            debug!(
                "Total clients: {}, Total rooms: {}",
                directory.clients.len(),
                directory.rooms.len()
            );
        }

        info!("Client {} registered as {}", id, username);
        Ok(client::spawn(self.clone(), id, username, mailbox, receiver, source, sink))
    }

    /// Remove a user, taking them out of their room first
    pub async fn unregister_user(&self, username: &str) -> Result<(), HubError> {
        let username = Username::parse(username)?;
        self.remove_client(&username, None).await
    }

    /// Cleanup for one specific connection
    ///
    /// Does nothing to a newer connection that reused the name.
    pub(crate) async fn unregister_client(
        &self,
        username: &Username,
        id: ClientId,
    ) -> Result<(), HubError> {
        self.remove_client(username, Some(id)).await
    }

    async fn remove_client(
        &self,
        username: &Username,
        expected: Option<ClientId>,
    ) -> Result<(), HubError> {
        let (entry, ack) = {
            let mut directory = self.shared.directory.write().await;
            let entry = match directory.clients.entry(username.clone()) {
                Entry::Occupied(entry) if expected.map_or(true, |id| entry.get().id == id) => {
                    entry.remove()
                }
                _ => return Err(HubError::UnknownUser(username.to_string())),
            };
            let ack = match entry
                .current_room
                .as_ref()
                .and_then(|name| directory.rooms.get(name))
            {
                Some(room) => Some(room.unregister(username.clone()).await),
                None => None,
            };
            (entry, ack)
        };

        // The room may still hold this mailbox until it has processed the
        // removal; only retire it afterwards.
        if let Some(ack) = ack {
            await_removal(ack).await;
        }
        entry.mailbox.retire();

        info!("Client {} ({}) unregistered", entry.id, username);
        Ok(())
    }

    /// Create a room and move the creator into it
    ///
    /// An existing room of the same name is returned as is.
    pub async fn create_room(&self, username: &str, room: &str) -> Result<RoomHandle, HubError> {
        let name = RoomName::parse(room)?;
        let username = Username::parse(username)?;

        let mut directory = self.shared.directory.write().await;
        if !directory.clients.contains_key(&username) {
            return Err(HubError::UnknownUser(username.to_string()));
        }
        if let Some(existing) = directory.rooms.get(&name) {
            return Ok(existing.clone());
        }

        let handle = Room::spawn(name.clone(), Arc::downgrade(&self.shared), self.shared.config);
        directory.rooms.insert(name.clone(), handle.clone());
        info!("{} created room {}", username, name);

        directory.move_client(&username, &name).await?;
        Ok(handle)
    }

    /// Move a user into an existing room
    pub async fn join_room(&self, username: &str, room: &str) -> Result<(), HubError> {
        let username = Username::parse(username)?;
        let name = RoomName::parse(room).map_err(|_| HubError::UnknownRoom(room.to_string()))?;

        let mut directory = self.shared.directory.write().await;
        directory.move_client(&username, &name).await
    }

    /// Take a user out of their current room
    pub async fn leave_room(&self, username: &str) -> Result<RoomName, HubError> {
        let username = Username::parse(username)?;

        let mut directory = self.shared.directory.write().await;
        let Directory { clients, rooms } = &mut *directory;
        let entry = clients
            .get_mut(&username)
            .ok_or_else(|| HubError::UnknownUser(username.to_string()))?;
        let name = entry
            .current_room
            .take()
            .ok_or_else(|| HubError::NotInRoom(username.to_string()))?;

        if let Some(room) = rooms.get(&name) {
            await_removal(room.unregister(username.clone()).await).await;
        }
        Ok(name)
    }

    /// Broadcast to the sender's current room
    ///
    /// Waits only for space in the room's bounded broadcast channel.
    pub async fn send_message(&self, message: Message) -> Result<(), HubError> {
        message.validate()?;

        let directory = self.shared.directory.read().await;
        let entry = directory
            .clients
            .get(message.username())
            .ok_or_else(|| HubError::UnknownUser(message.username().to_string()))?;
        let room = entry
            .current_room
            .as_ref()
            .and_then(|name| directory.rooms.get(name))
            .ok_or_else(|| HubError::NotInRoom(message.username().to_string()))?;

        room.broadcast(message).await
    }

    /// Sorted snapshot of live room names
    pub async fn list_rooms(&self) -> Vec<RoomName> {
        let directory = self.shared.directory.read().await;
        let mut rooms: Vec<RoomName> = directory.rooms.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Sorted snapshot of a room's members
    pub async fn get_room_users(&self, room: &str) -> Result<Vec<Username>, HubError> {
        let directory = self.shared.directory.read().await;
        directory
            .rooms
            .get(room)
            .map(RoomHandle::members)
            .ok_or_else(|| HubError::UnknownRoom(room.to_string()))
    }

    /// The room a user is currently in
    pub async fn current_room(&self, username: &str) -> Result<Option<RoomName>, HubError> {
        let directory = self.shared.directory.read().await;
        directory
            .clients
            .get(username)
            .map(|entry| entry.current_room.clone())
            .ok_or_else(|| HubError::UnknownUser(username.to_string()))
    }

    pub async fn is_online(&self, username: &str) -> bool {
        self.shared.directory.read().await.clients.contains_key(username)
    }

    pub async fn client_count(&self) -> usize {
        self.shared.directory.read().await.clients.len()
    }

    pub async fn room_count(&self) -> usize {
        self.shared.directory.read().await.rooms.len()
    }
}
