use std::fmt::Display;

pub type AppResult<T> = Result<T, AppErr>;

/// Process-level failures: anything that stops the relay from starting.
#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-message failures. The frame is dropped, the session keeps reading.
#[derive(thiserror::Error, Debug)]
pub enum DispatchErr {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown msgtype {0}")]
    UnknownType(i64),

    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("field `{0}` has the wrong shape")]
    BadField(&'static str),

    #[error("session has not entered a room")]
    NotInRoom,

    #[error("session already belongs to room {0}")]
    OtherRoom(String),

    #[error(transparent)]
    RoomGone(#[from] RoomGone),
}

/// The control loop of a room stopped (it panicked); its handle is dead.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("room {0} is no longer running")]
pub struct RoomGone(pub String);

/// A frame could not be written to the peer; the writer gives up.
#[derive(thiserror::Error, Debug)]
pub enum WriteErr {
    #[error("write timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("write failed: {0}")]
    Sink(String),
}

/* ── helper: wrap a bad env value ── */
pub fn config<E: Display>(var: &str, e: E) -> AppErr {
    AppErr::Config(format!("{var}: {e}"))
}
