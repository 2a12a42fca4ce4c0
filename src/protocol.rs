//! Wire format of the room relay.
//!
//! Every logical message is one JSON object tagged by `msgtype`. Inbound objects
//! are loosely shaped, so they are first read into [`WireIn`] and then validated
//! into a [`Request`]; anything that does not fit is a per-message
//! [`DispatchErr`]. Outbound messages are built as an [`Event`] and flattened
//! into [`WireOut`] for encoding.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchErr;

pub const ENTER: u8 = 1;
pub const CHAT: u8 = 2;
pub const GIFT: u8 = 3;
pub const LEAVE: u8 = 4;

/// Gifts of this level are announced in every room, signed with the anchor.
pub const GLOBAL_GIFT_LEVEL: i64 = 2;

/// One encoded outbound message, shared by every mailbox it is queued in.
pub type Payload = Arc<str>;

/* ------------ inbound -------------- */

#[derive(Debug, Default, Deserialize)]
struct WireIn {
    msgtype:   Option<Value>,
    roomid:    Option<Value>,
    userid:    Option<Value>,
    username:  Option<Value>,
    msg:       Option<Value>,
    giftlevel: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id:  String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `user` is `None` for an anonymous viewer.
    Enter { room_id: String, user: Option<Identity> },
    Chat { text: String },
    Gift { level: i64 },
}

impl Request {
    pub fn decode(raw: &str) -> Result<Self, DispatchErr> {
        let w: WireIn = serde_json::from_str(raw)?;
        let kind = int(w.msgtype.as_ref(), "msgtype")?;

        match kind {
            k if k == i64::from(ENTER) => {
                let room_id = string(w.roomid.as_ref(), "roomid")?;
                if room_id.is_empty() {
                    return Err(DispatchErr::BadField("roomid"));
                }
                let user_id = match w.userid {
                    None => String::new(),
                    Some(v) => v.as_str().map(str::to_owned).ok_or(DispatchErr::BadField("userid"))?,
                };
                let user = if user_id.is_empty() {
                    None
                } else {
                    let username = string(w.username.as_ref(), "username")?;
                    Some(Identity { user_id, username })
                };
                Ok(Request::Enter { room_id, user })
            }
            k if k == i64::from(CHAT) => Ok(Request::Chat { text: string(w.msg.as_ref(), "msg")? }),
            k if k == i64::from(GIFT) => Ok(Request::Gift { level: int(w.giftlevel.as_ref(), "giftlevel")? }),
            other => Err(DispatchErr::UnknownType(other)),
        }
    }
}

fn string(v: Option<&Value>, field: &'static str) -> Result<String, DispatchErr> {
    match v {
        None => Err(DispatchErr::Missing(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DispatchErr::BadField(field)),
    }
}

/// Integers may arrive as `2` or `2.0`; browsers do not tell them apart.
fn int(v: Option<&Value>, field: &'static str) -> Result<i64, DispatchErr> {
    let v = v.ok_or(DispatchErr::Missing(field))?;
    if let Some(i) = v.as_i64() {
        return Ok(i);
    }
    match v.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
        _ => Err(DispatchErr::BadField(field)),
    }
}

/* ------------ outbound -------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Enter { notice: Option<String>, clientnum: usize },
    Leave { notice: Option<String>, clientnum: usize },
    Chat { username: String, text: String },
    /// `anchor` is only set for the global tier.
    Gift { username: String, level: i64, anchor: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireOut {
    pub msgtype: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clientnum: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub giftlevel: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

impl Event {
    /// Entry notice; anonymous viewers only move the counter.
    pub fn entered(username: Option<&str>, clientnum: usize) -> Self {
        Event::Enter { notice: username.map(|u| format!("{u} entered the room")), clientnum }
    }

    pub fn left(username: Option<&str>, clientnum: usize) -> Self {
        Event::Leave { notice: username.map(|u| format!("{u} left the room")), clientnum }
    }

    pub fn msgtype(&self) -> u8 {
        match self {
            Event::Enter { .. } => ENTER,
            Event::Leave { .. } => LEAVE,
            Event::Chat { .. } => CHAT,
            Event::Gift { .. } => GIFT,
        }
    }

    pub fn encode(&self) -> Result<Payload, DispatchErr> {
        Ok(serde_json::to_string(&WireOut::from(self))?.into())
    }

    #[cfg(test)]
    pub fn decode(raw: &str) -> Result<Self, DispatchErr> {
        serde_json::from_str::<WireOut>(raw)?.try_into()
    }
}

impl From<&Event> for WireOut {
    fn from(ev: &Event) -> Self {
        let msgtype = ev.msgtype();
        match ev.clone() {
            Event::Enter { notice, clientnum } | Event::Leave { notice, clientnum } => {
                WireOut { msgtype, msg: notice, clientnum: Some(clientnum), ..Default::default() }
            }
            Event::Chat { username, text } => {
                WireOut { msgtype, msg: Some(text), username: Some(username), ..Default::default() }
            }
            Event::Gift { username, level, anchor } => {
                WireOut { msgtype, username: Some(username), giftlevel: Some(level), anchor, ..Default::default() }
            }
        }
    }
}

#[cfg(test)]
impl TryFrom<WireOut> for Event {
    type Error = DispatchErr;

    fn try_from(w: WireOut) -> Result<Self, Self::Error> {
        let ev = match w.msgtype {
            ENTER => Event::Enter { notice: w.msg, clientnum: w.clientnum.ok_or(DispatchErr::Missing("clientnum"))? },
            LEAVE => Event::Leave { notice: w.msg, clientnum: w.clientnum.ok_or(DispatchErr::Missing("clientnum"))? },
            CHAT => Event::Chat {
                username: w.username.ok_or(DispatchErr::Missing("username"))?,
                text:     w.msg.ok_or(DispatchErr::Missing("msg"))?,
            },
            GIFT => Event::Gift {
                username: w.username.ok_or(DispatchErr::Missing("username"))?,
                level:    w.giftlevel.ok_or(DispatchErr::Missing("giftlevel"))?,
                anchor:   w.anchor,
            },
            other => return Err(DispatchErr::UnknownType(i64::from(other))),
        };
        Ok(ev)
    }
}
