use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::info;

use crate::room::{RoomActor, RoomHandle};

/* ------------ process-wide room table ------------ */

/// Room id → running room. Rooms are created on first reference and live as
/// long as the process; nothing is ever removed.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms:  Arc<RwLock<HashMap<String, RoomHandle>>>,
    intake: usize,
}

impl RoomRegistry {
    /// `intake` is the command channel capacity given to each new room.
    pub fn new(intake: usize) -> Self {
        Self { rooms: Arc::default(), intake }
    }

    pub async fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Look up or start the room. Check and insert happen under one write
    /// lock, so racing callers for a new id all get the same room.
    pub async fn get_or_create(&self, room_id: &str) -> RoomHandle {
        if let Some(room) = self.get(room_id).await {
            return room;
        }

        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }
        let room = RoomActor::spawn(room_id, self.intake);
        info!(room = %room_id, anchor = %room.anchor(), "room created");
        rooms.insert(room_id.to_owned(), room.clone());
        room
    }

    /// Snapshot of every room, for announcements that go everywhere.
    pub async fn all(&self) -> Vec<RoomHandle> {
        self.rooms.read().await.values().cloned().collect()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{mailbox, Member};
    use uuid::Uuid;

    #[tokio::test]
    async fn same_id_same_room() {
        let reg = RoomRegistry::new(8);
        let a = reg.get_or_create("r1").await;
        let b = reg.get_or_create("r1").await;
        let c = reg.get_or_create("r2").await;
        assert!(a.same_room(&b));
        assert!(!a.same_room(&c));
        assert_eq!(reg.len().await, 2);
        assert!(reg.get("r3").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_reference_creates_one_room() {
        let reg = RoomRegistry::new(8);
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let reg = reg.clone();
            tasks.push(tokio::spawn(async move {
                let room = reg.get_or_create("fresh").await;
                let (mailbox, rx) = mailbox(4);
                room.register(Member { id: Uuid::new_v4(), mailbox }).await.unwrap();
                (room, rx)
            }));
        }

        let mut joined = Vec::new();
        for t in tasks {
            joined.push(t.await.unwrap());
        }
        assert_eq!(reg.len().await, 1);
        let first = &joined[0].0;
        assert!(joined.iter().all(|(room, _)| room.same_room(first)));
        assert_eq!(first.member_count().await.unwrap(), 32);
    }
}
