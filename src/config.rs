use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::error::{config, AppErr, AppResult};

pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_MAILBOX: usize = 256;
pub const DEFAULT_ROOM_INTAKE: usize = 64;
pub const DEFAULT_PONG_WAIT_SECS: u64 = 60;
pub const DEFAULT_WRITE_WAIT_SECS: u64 = 10;
pub const DEFAULT_MAX_MESSAGE: usize = 512;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    /// Outbound queue depth per session; a full queue gets the session dropped.
    pub mailbox: usize,
    /// Pending register/unregister/broadcast requests per room.
    pub room_intake: usize,
    pub pong_wait: Duration,
    pub write_wait: Duration,
    /// Largest inbound frame accepted, in bytes.
    pub max_message: usize,
}

/// Keepalive timing shared by the two loops of a session.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(get: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr: SocketAddr = parse(&get, "RELAY_ADDR", Config::default().addr)?;
        let static_dir = get("RELAY_STATIC_DIR").map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        let cfg = Config {
            addr,
            static_dir,
            mailbox:     positive(&get, "RELAY_MAILBOX", DEFAULT_MAILBOX)?,
            room_intake: positive(&get, "RELAY_ROOM_INTAKE", DEFAULT_ROOM_INTAKE)?,
            pong_wait:   Duration::from_secs(positive(&get, "RELAY_PONG_WAIT_SECS", DEFAULT_PONG_WAIT_SECS)?),
            write_wait:  Duration::from_secs(positive(&get, "RELAY_WRITE_WAIT_SECS", DEFAULT_WRITE_WAIT_SECS)?),
            max_message: positive(&get, "RELAY_MAX_MESSAGE", DEFAULT_MAX_MESSAGE)?,
        };
        Ok(cfg)
    }

    pub fn liveness(&self) -> Liveness {
        Liveness {
            pong_wait:   self.pong_wait,
            ping_period: self.pong_wait * 9 / 10,
            write_wait:  self.write_wait,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr:        SocketAddr::from(([0, 0, 0, 0], 8080)),
            static_dir:  PathBuf::from(DEFAULT_STATIC_DIR),
            mailbox:     DEFAULT_MAILBOX,
            room_intake: DEFAULT_ROOM_INTAKE,
            pong_wait:   Duration::from_secs(DEFAULT_PONG_WAIT_SECS),
            write_wait:  Duration::from_secs(DEFAULT_WRITE_WAIT_SECS),
            max_message: DEFAULT_MAX_MESSAGE,
        }
    }
}

fn parse<F, T>(get: &F, var: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw.trim().parse().map_err(|e| config(var, e)),
        None => Ok(default),
    }
}

fn positive<F, T>(get: &F, var: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let v = parse(get, var, default)?;
    if v == T::default() {
        return Err(AppErr::Config(format!("{var}: must be greater than zero")));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.addr.port(), 8080);
        assert_eq!(cfg.mailbox, 256);
        assert_eq!(cfg.max_message, 512);
        assert_eq!(cfg.static_dir, PathBuf::from("static"));
    }

    #[test]
    fn ping_period_is_nine_tenths_of_the_window() {
        let cfg = Config::from_lookup(lookup(&[("RELAY_PONG_WAIT_SECS", "10")])).unwrap();
        let live = cfg.liveness();
        assert_eq!(live.pong_wait, Duration::from_secs(10));
        assert_eq!(live.ping_period, Duration::from_secs(9));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = Config::from_lookup(lookup(&[
            ("RELAY_ADDR", "127.0.0.1:9000"),
            ("RELAY_MAILBOX", " 8 "),
            ("RELAY_STATIC_DIR", "pages"),
        ]))
        .unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.mailbox, 8);
        assert_eq!(cfg.static_dir, PathBuf::from("pages"));
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = Config::from_lookup(lookup(&[("RELAY_MAILBOX", "lots")])).unwrap_err();
        assert!(err.to_string().contains("RELAY_MAILBOX"));

        let err = Config::from_lookup(lookup(&[("RELAY_PONG_WAIT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, AppErr::Config(ref m) if m.contains("RELAY_PONG_WAIT_SECS")));
    }
}
