//! Room actor
//!
//! Each live room is one tokio task that owns its membership outright. The
//! task is driven by three bounded channels (register, unregister, broadcast)
//! and is the only code that ever mutates the membership map; everyone else
//! talks to it through a [`RoomHandle`].
//!
//! A read-only copy of the member names is published through a `watch`
//! channel after every change, so snapshots never touch actor state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Weak;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::{BackpressurePolicy, HubConfig};
use crate::error::{DeliveryError, HubError};
use crate::hub::Shared;
use crate::mailbox::Mailbox;
use crate::message::Message;
use crate::types::{RoomId, RoomName, Username};

/// Add a member (or replace its mailbox)
#[derive(Debug)]
pub(crate) struct Registration {
    pub username: Username,
    pub mailbox: Mailbox,
}

/// Remove a member; `ack` fires once the removal has been applied
#[derive(Debug)]
pub(crate) struct Departure {
    pub username: Username,
    pub ack: Option<oneshot::Sender<()>>,
}

/// Lifecycle of a room actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomState {
    /// Serving its channels
    Active,
    /// Membership just reached zero; waiting to deregister
    Draining,
    /// Deregistered, task exiting
    Closed,
}

/// Cloneable handle to a running room actor
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    name: RoomName,
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Departure>,
    broadcast_tx: mpsc::Sender<Message>,
    members: watch::Receiver<BTreeSet<Username>>,
}

impl RoomHandle {
    /// Identity of this actor instance
    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    /// Sorted snapshot of the current members
    pub fn members(&self) -> Vec<Username> {
        self.members.borrow().iter().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.borrow().len()
    }

    /// True once the actor has exited
    pub fn is_closed(&self) -> bool {
        self.broadcast_tx.is_closed()
    }

    /// Resolves when the actor exits
    pub async fn closed(&self) {
        self.broadcast_tx.closed().await
    }

    pub(crate) async fn register(
        &self,
        username: Username,
        mailbox: Mailbox,
    ) -> Result<(), HubError> {
        self.register_tx
            .send(Registration { username, mailbox })
            .await
            .map_err(|_| self.gone())
    }

    /// Submit a removal and return the acknowledgement to wait on
    pub(crate) async fn unregister(
        &self,
        username: Username,
    ) -> Result<oneshot::Receiver<()>, HubError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.unregister_tx
            .send(Departure {
                username,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| self.gone())?;
        Ok(ack_rx)
    }

    pub(crate) async fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.broadcast_tx
            .send(message)
            .await
            .map_err(|_| self.gone())
    }

    fn gone(&self) -> HubError {
        HubError::UnknownRoom(self.name.to_string())
    }
}

/// The actor state, owned by its task
pub(crate) struct Room {
    id: RoomId,
    name: RoomName,
    hub: Weak<Shared>,
    config: HubConfig,
    state: RoomState,
    members: HashMap<Username, Mailbox>,
    published: watch::Sender<BTreeSet<Username>>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::Receiver<Departure>,
    broadcast_rx: mpsc::Receiver<Message>,
}

impl Room {
    /// Start a room actor and return its handle
    ///
    /// `hub` is only used to deregister the room once it empties; a dangling
    /// weak reference makes the room simply exit instead.
    pub(crate) fn spawn(name: RoomName, hub: Weak<Shared>, config: HubConfig) -> RoomHandle {
        let (register_tx, register_rx) = mpsc::channel(config.membership_capacity.max(1));
        let (unregister_tx, unregister_rx) = mpsc::channel(config.membership_capacity.max(1));
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_capacity.max(1));
        let (published, members) = watch::channel(BTreeSet::new());
        let id = RoomId::new();

        let room = Room {
            id,
            name: name.clone(),
            hub,
            config,
            state: RoomState::Active,
            members: HashMap::new(),
            published,
            register_rx,
            unregister_rx,
            broadcast_rx,
        };
        tokio::spawn(room.run());

        RoomHandle {
            id,
            name,
            register_tx,
            unregister_tx,
            broadcast_tx,
            members,
        }
    }

    /// Run the room event loop until the room closes
    async fn run(mut self) {
        info!("Room {} ({}) started", self.name, self.id);

        loop {
            match self.state {
                RoomState::Active => self.serve().await,
                RoomState::Draining => self.drain().await,
                RoomState::Closed => break,
            }
        }

        info!("Room {} ({}) closed", self.name, self.id);
    }

    /// Process one request; membership changes win over broadcasts
    async fn serve(&mut self) {
        tokio::select! {
            biased;
            Some(registration) = self.register_rx.recv() => self.handle_register(registration),
            Some(departure) = self.unregister_rx.recv() => self.handle_unregister(departure),
            Some(message) = self.broadcast_rx.recv() => self.handle_broadcast(message),
            else => {
                debug!("Room {}: every handle dropped", self.name);
                self.state = RoomState::Closed;
            }
        }
    }

    /// Empty room: deregister under the directory write lock
    ///
    /// Every submission into a room channel is made while holding the
    /// directory lock, so once the write lock is held nothing can be in
    /// flight and whatever was submitted is already queued. The channels keep
    /// being served while waiting, which keeps lock holders that are blocked
    /// on a full channel from deadlocking against us.
    async fn drain(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            self.state = RoomState::Closed;
            return;
        };

        tokio::select! {
            biased;
            Some(registration) = self.register_rx.recv() => self.handle_register(registration),
            Some(departure) = self.unregister_rx.recv() => self.handle_unregister(departure),
            Some(message) = self.broadcast_rx.recv() => {
                debug!("Room {}: no members for message from {}", self.name, message.username());
            }
            mut directory = hub.directory.write() => {
                while let Ok(registration) = self.register_rx.try_recv() {
                    self.handle_register(registration);
                }
                while let Ok(departure) = self.unregister_rx.try_recv() {
                    self.handle_unregister(departure);
                }
                if self.members.is_empty() {
                    directory.close_room(&self.name, self.id);
                    self.register_rx.close();
                    self.unregister_rx.close();
                    self.broadcast_rx.close();
                    self.state = RoomState::Closed;
                }
            }
        }
    }

    fn handle_register(&mut self, registration: Registration) {
        let Registration { username, mailbox } = registration;
        let is_new = self.members.insert(username.clone(), mailbox).is_none();
        self.state = RoomState::Active;

        if is_new {
            info!("{} joined room {}", username, self.name);
            self.publish();
            if self.config.announce_membership {
                let notice = Message::system(&username, format!("{} joined {}", username, self.name));
                self.fan_out(&notice, Some(username.as_str()));
            }
        }
    }

    fn handle_unregister(&mut self, departure: Departure) {
        let Departure { username, ack } = departure;
        let removed = self.members.remove(&username).is_some();
        if removed {
            self.publish();
        }
        // Snapshot first: whoever waits on the ack reads it next.
        if let Some(ack) = ack {
            let _ = ack.send(());
        }

        if removed {
            info!("{} left room {}", username, self.name);
            if self.config.announce_membership {
                let notice = Message::system(&username, format!("{} left {}", username, self.name));
                self.fan_out(&notice, None);
            }
        }
        self.check_empty();
    }

    fn handle_broadcast(&mut self, message: Message) {
        let skip = if self.config.echo_to_sender {
            None
        } else {
            Some(message.username())
        };
        self.fan_out(&message, skip);
    }

    /// Deliver to every member except `skip` without ever waiting
    fn fan_out(&mut self, message: &Message, skip: Option<&str>) {
        let mut removed = Vec::new();

        for (username, mailbox) in &self.members {
            if skip == Some(username.as_str()) {
                continue;
            }
            match mailbox.try_deliver(message.clone()) {
                Ok(()) => {}
                Err(DeliveryError::MailboxSaturated) => match self.config.backpressure {
                    BackpressurePolicy::Drop => {
                        let dropped = mailbox.record_drop();
                        warn!(
                            "Room {}: mailbox of {} full, dropped message ({} so far)",
                            self.name, username, dropped
                        );
                    }
                    BackpressurePolicy::Evict => {
                        warn!("Room {}: mailbox of {} full, evicting", self.name, username);
                        mailbox.retire();
                        removed.push(username.clone());
                    }
                },
                Err(DeliveryError::Retired) => {
                    debug!("Room {}: pruning retired member {}", self.name, username);
                    removed.push(username.clone());
                }
            }
        }

        if !removed.is_empty() {
            for username in &removed {
                self.members.remove(username);
            }
            self.publish();
            self.check_empty();
        }
    }

    fn check_empty(&mut self) {
        if self.members.is_empty() && self.state == RoomState::Active {
            debug!("Room {} is empty, draining", self.name);
            self.state = RoomState::Draining;
        }
    }

    fn publish(&self) {
        self.published
            .send_replace(self.members.keys().cloned().collect());
    }
}

/// Room actor with no hub behind it; exits as soon as it empties
#[cfg(test)]
pub(crate) fn spawn_detached(name: &str, config: HubConfig) -> RoomHandle {
    let name = RoomName::parse(name).expect("valid room name");
    Room::spawn(name, Weak::<Shared>::new(), config)
}
