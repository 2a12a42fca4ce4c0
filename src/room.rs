//! One live room: a single task owns the member set and every mailbox sender.
//!
//! Registration, departure and fan-out all travel through the room's command
//! channel, so the member set is only ever touched by [`RoomActor::run`]. A
//! member's mailbox is closed by dropping its sender, which only the actor
//! holds once the member is registered.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::RoomGone, protocol::Payload};

pub type SessionId = Uuid;

/// Sending half of a session's outbound queue.
pub type Mailbox = mpsc::Sender<Payload>;

pub fn mailbox(capacity: usize) -> (Mailbox, mpsc::Receiver<Payload>) {
    mpsc::channel(capacity)
}

#[derive(Debug)]
pub struct Member {
    pub id:      SessionId,
    pub mailbox: Mailbox,
}

#[derive(Debug)]
enum Command {
    Register   { member: Member, respond_to: oneshot::Sender<usize> },
    Unregister { id: SessionId, respond_to: oneshot::Sender<usize> },
    Broadcast(Payload),
    Count      { respond_to: oneshot::Sender<usize> },
}

#[derive(Debug)]
struct RoomInfo {
    id:     String,
    anchor: String,
}

/// Cheap, cloneable address of a running room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    info: Arc<RoomInfo>,
    tx:   mpsc::Sender<Command>,
}

impl RoomHandle {
    pub fn id(&self) -> &str { &self.info.id }

    pub fn anchor(&self) -> &str { &self.info.anchor }

    /// Whether both handles address the same room task.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        Arc::ptr_eq(&self.info, &other.info)
    }

    /// Adds the member and returns the room size after the add.
    pub async fn register(&self, member: Member) -> Result<usize, RoomGone> {
        self.ask(|respond_to| Command::Register { member, respond_to }).await
    }

    /// Drops the member (closing its mailbox) and returns the room size after.
    /// Unknown ids are ignored.
    pub async fn unregister(&self, id: SessionId) -> Result<usize, RoomGone> {
        self.ask(|respond_to| Command::Unregister { id, respond_to }).await
    }

    pub async fn broadcast(&self, payload: Payload) -> Result<(), RoomGone> {
        self.tx.send(Command::Broadcast(payload)).await.map_err(|_| self.gone())
    }

    pub async fn member_count(&self) -> Result<usize, RoomGone> {
        self.ask(|respond_to| Command::Count { respond_to }).await
    }

    async fn ask<F>(&self, make: F) -> Result<usize, RoomGone>
    where
        F: FnOnce(oneshot::Sender<usize>) -> Command,
    {
        let (respond_to, rx) = oneshot::channel();
        self.tx.send(make(respond_to)).await.map_err(|_| self.gone())?;
        rx.await.map_err(|_| self.gone())
    }

    fn gone(&self) -> RoomGone {
        RoomGone(self.info.id.clone())
    }
}

pub struct RoomActor {
    info:    Arc<RoomInfo>,
    members: HashMap<SessionId, Mailbox>,
    rx:      mpsc::Receiver<Command>,
}

impl RoomActor {
    /// Starts the control loop on its own task and returns its address.
    /// No directory of hosts exists, so the anchor name is derived from the id.
    pub fn spawn(id: impl Into<String>, intake: usize) -> RoomHandle {
        let id = id.into();
        let info = Arc::new(RoomInfo { anchor: format!("host-{id}"), id });
        let (tx, rx) = mpsc::channel(intake);

        let actor = RoomActor { info: info.clone(), members: HashMap::new(), rx };
        tokio::spawn(actor.run());
        RoomHandle { info, tx }
    }

    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
        debug!(room = %self.info.id, "room loop finished");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Register { member, respond_to } => {
                self.members.insert(member.id, member.mailbox);
                respond_to.send(self.members.len()).ok();
            }
            Command::Unregister { id, respond_to } => {
                self.members.remove(&id);
                respond_to.send(self.members.len()).ok();
            }
            Command::Broadcast(payload) => self.fan_out(payload),
            Command::Count { respond_to } => {
                respond_to.send(self.members.len()).ok();
            }
        }
    }

    /// Never waits on a member: a full or closed mailbox costs the member its seat.
    fn fan_out(&mut self, payload: Payload) {
        let room = &self.info.id;
        self.members.retain(|id, mailbox| match mailbox.try_send(payload.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%room, session = %id, "mailbox full, dropping slow member");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%room, session = %id, "mailbox receiver gone, dropping member");
                false
            }
        });
    }
}
