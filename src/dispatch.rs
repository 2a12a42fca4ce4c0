use tracing::{debug, info, warn};

use crate::{
    error::DispatchErr,
    protocol::{Event, Request, GLOBAL_GIFT_LEVEL},
    room::Member,
    session::Session,
    state::RoomRegistry,
};

pub async fn handle_frame(session: &mut Session, raw: &str, rooms: &RoomRegistry) -> Result<(), DispatchErr> {
    let req = Request::decode(raw)?;
    dispatch(session, req, rooms).await
}

/// Apply `req` for `session`. Every branch broadcasts exactly one event: to
/// the sender's room, or for a top-tier gift to every room instead.
pub async fn dispatch(session: &mut Session, req: Request, rooms: &RoomRegistry) -> Result<(), DispatchErr> {
    match req {
        Request::Enter { room_id, user } => {
            let room = match &session.room {
                Some(r) if r.id() != room_id => return Err(DispatchErr::OtherRoom(r.id().to_owned())),
                Some(r) => r.clone(),
                None => rooms.get_or_create(&room_id).await,
            };

            // first ENTER hands the mailbox over; a repeat only re-announces
            let clientnum = match session.take_mailbox() {
                Some(mailbox) => room.register(Member { id: session.id, mailbox }).await?,
                None => room.member_count().await?,
            };
            session.room = Some(room.clone());

            let name = user.as_ref().map(|u| u.username.clone());
            if user.is_some() {
                session.user = user;
            }
            info!(room = %room.id(), user = name.as_deref().unwrap_or("guest"), clientnum, "entered");

            room.broadcast(Event::entered(name.as_deref(), clientnum).encode()?).await?;
        }

        Request::Chat { text } => {
            let room = session.room.as_ref().ok_or(DispatchErr::NotInRoom)?;
            debug!(room = %room.id(), user = session.username(), msg = %text, "chat");

            let ev = Event::Chat { username: session.username().to_owned(), text };
            room.broadcast(ev.encode()?).await?;
        }

        Request::Gift { level } => {
            let room = session.room.as_ref().ok_or(DispatchErr::NotInRoom)?;
            debug!(room = %room.id(), user = session.username(), level, "gift");

            let global = level == GLOBAL_GIFT_LEVEL;
            let ev = Event::Gift {
                username: session.username().to_owned(),
                level,
                anchor: global.then(|| room.anchor().to_owned()),
            };
            let payload = ev.encode()?;

            if !global {
                room.broadcast(payload).await?;
                return Ok(());
            }

            // one task per room so a congested room never stalls this reader
            for target in rooms.all().await {
                let payload = payload.clone();
                tokio::spawn(async move {
                    if let Err(e) = target.broadcast(payload).await {
                        warn!(error = %e, "global gift not delivered");
                    }
                });
            }
        }
    }
    Ok(())
}
