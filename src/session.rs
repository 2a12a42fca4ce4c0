//! One connected viewer: a reader that owns the inbound half of the socket and
//! a writer that owns the outbound half.
//!
//! The two halves only meet through the mailbox and through shutdown: when the
//! writer stops, the reader stops; when the reader stops, it leaves the room,
//! which closes the mailbox and makes the writer send a close frame.

use std::{fmt::Display, future::Future, io::ErrorKind, sync::Arc, time::Duration};

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    sync::mpsc,
    time::{interval_at, sleep, timeout, Instant},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::{Config, Liveness},
    dispatch,
    error::WriteErr,
    protocol::{Event, Identity, Payload},
    room::{self, Mailbox, RoomHandle, SessionId},
    state::RoomRegistry,
};

pub struct Session {
    pub(crate) id:   SessionId,
    /// Set by the first successful ENTER, never changed afterwards.
    pub(crate) room: Option<RoomHandle>,
    pub(crate) user: Option<Identity>,
    /// Held here until the session joins a room, which then owns it.
    mailbox: Option<Mailbox>,
}

impl Session {
    pub fn new(mailbox: Mailbox) -> Self {
        Session { id: Uuid::new_v4(), room: None, user: None, mailbox: Some(mailbox) }
    }

    pub fn id(&self) -> SessionId { self.id }

    pub fn room(&self) -> Option<&RoomHandle> { self.room.as_ref() }

    /// Anonymous viewers have an empty name on the wire.
    pub fn username(&self) -> &str {
        self.user.as_ref().map(|u| u.username.as_str()).unwrap_or_default()
    }

    pub(crate) fn take_mailbox(&mut self) -> Option<Mailbox> {
        self.mailbox.take()
    }

    /// Teardown: leave the room, tell the others, close the mailbox.
    pub async fn leave(mut self) {
        // never joined: dropping the sender closes the mailbox
        self.mailbox = None;
        let Some(room) = self.room.take() else { return };

        let clientnum = match room.unregister(self.id).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, session = %self.id, "could not leave room");
                return;
            }
        };
        let name = self.user.as_ref().map(|u| u.username.as_str());
        info!(room = %room.id(), user = name.unwrap_or("guest"), clientnum, "left");

        let sent = match Event::left(name, clientnum).encode() {
            Ok(payload) => room.broadcast(payload).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = sent {
            warn!(room = %room.id(), error = %e, "departure notice lost");
        }
    }
}

/// Runs one upgraded connection to completion.
pub async fn serve(socket: WebSocket, rooms: RoomRegistry, cfg: Arc<Config>) {
    let (sink, stream) = socket.split();
    let (mailbox, outbox) = room::mailbox(cfg.mailbox);
    let live = cfg.liveness();

    let session = Session::new(mailbox);
    debug!(session = %session.id, "connected");

    let writer = tokio::spawn(write_loop(sink, outbox, live));
    read_loop(stream, session, &rooms, live.pong_wait, writer).await;
}

/// The only reader of the connection. Exits on close, transport error, a missed
/// pong, or when `writer_done` resolves; then runs [`Session::leave`].
pub async fn read_loop<St, E, W>(
    mut stream: St,
    mut session: Session,
    rooms: &RoomRegistry,
    pong_wait: Duration,
    mut writer_done: W,
) where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: std::error::Error + 'static,
    W: Future + Unpin,
{
    let deadline = sleep(pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(raw))) => on_frame(&mut session, &raw, rooms).await,
                Some(Ok(Message::Binary(raw))) => match std::str::from_utf8(&raw) {
                    Ok(raw) => on_frame(&mut session, raw, rooms).await,
                    Err(_) => debug!(session = %session.id, "non-utf8 frame dropped"),
                },
                Some(Ok(Message::Pong(_))) => deadline.as_mut().reset(Instant::now() + pong_wait),
                // answered by the websocket layer
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    log_close(session.id, frame.as_ref());
                    break;
                }
                Some(Err(e)) => {
                    if is_abnormal_closure(&e) {
                        debug!(session = %session.id, error = %e, "connection dropped");
                    } else {
                        warn!(session = %session.id, error = %e, "read failed");
                    }
                    break;
                }
                None => break,
            },
            _ = &mut deadline => {
                debug!(session = %session.id, "no pong in time");
                break;
            }
            _ = &mut writer_done => {
                debug!(session = %session.id, "writer stopped");
                break;
            }
        }
    }

    session.leave().await;
}

async fn on_frame(session: &mut Session, raw: &str, rooms: &RoomRegistry) {
    if let Err(e) = dispatch::handle_frame(session, raw, rooms).await {
        debug!(session = %session.id, error = %e, "frame dropped");
    }
}

/// The only writer of the connection. Queued messages are joined with `\n`
/// into one text frame; a closed mailbox ends the loop with a close frame.
pub async fn write_loop<S>(mut sink: S, mut outbox: mpsc::Receiver<Payload>, live: Liveness)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = interval_at(Instant::now() + live.ping_period, live.ping_period);

    loop {
        tokio::select! {
            biased;

            next = outbox.recv() => {
                let Some(first) = next else {
                    send_within(&mut sink, Message::Close(None), live.write_wait).await.ok();
                    return;
                };
                let mut frame = String::from(&*first);
                for _ in 0..outbox.len() {
                    match outbox.try_recv() {
                        Ok(more) => {
                            frame.push('\n');
                            frame.push_str(&more);
                        }
                        Err(_) => break,
                    }
                }
                if let Err(e) = send_within(&mut sink, Message::Text(frame), live.write_wait).await {
                    debug!(error = %e, "write failed");
                    return;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = send_within(&mut sink, Message::Ping(Vec::new()), live.write_wait).await {
                    debug!(error = %e, "ping failed");
                    return;
                }
            }
        }
    }
}

async fn send_within<S>(sink: &mut S, msg: Message, wait: Duration) -> Result<(), WriteErr>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(wait, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteErr::Sink(e.to_string())),
        Err(_) => Err(WriteErr::Timeout(wait)),
    }
}

fn log_close(session: SessionId, frame: Option<&CloseFrame<'_>>) {
    match frame {
        None => debug!(%session, "closed"),
        Some(f) if matches!(f.code, close_code::NORMAL | close_code::AWAY | close_code::ABNORMAL) => {
            debug!(%session, code = f.code, "closed")
        }
        Some(f) => warn!(%session, code = f.code, reason = %f.reason, "closed unexpectedly"),
    }
}

/// Peers that vanish without a close handshake are routine (tab closed,
/// network gone) and not worth a warning.
fn is_abnormal_closure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur = Some(err);
    while let Some(e) = cur {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        // tungstenite's ProtocolError::ResetWithoutClosingHandshake carries no io
        // error; its Display is "Connection reset without closing handshake"
        if e.to_string().contains("without closing handshake") {
            return true;
        }
        cur = e.source();
    }
    false
}
