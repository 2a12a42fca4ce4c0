//! Live-room chat relay: viewers join a room over a websocket and every entry,
//! chat line and gift is fanned out to the room (top-tier gifts to all rooms).
//!
//! Each room is a task that owns its member set; each viewer is a reader task
//! plus a writer task sharing a bounded mailbox.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod room;
pub mod routes;
pub mod session;
pub mod state;
