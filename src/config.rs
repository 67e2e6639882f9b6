use std::{env, fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Absent means the in-memory backend.
    pub database_url: Option<String>,
    pub ws_ping_interval: Duration,
    pub ws_pong_timeout: Duration,
    pub sse_keep_alive: Duration,
    pub session_inactivity: Duration,
}

impl Config {
    /// Reads the environment, falling back to defaults on missing or bad values.
    pub fn load() -> Self {
        let host: String = try_load("BIND_ADDR", "0.0.0.0");
        let port: u16 = try_load("PORT", "8080");
        let bind_addr = format!("{host}:{port}").parse().unwrap_or_else(|e| {
            warn!("Invalid bind address {host}:{port}: {e}, using 0.0.0.0:{port}");
            SocketAddr::from(([0, 0, 0, 0], port))
        });

        Self {
            bind_addr,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            ws_ping_interval: try_load_secs("WS_PING_INTERVAL_SECS", 30),
            ws_pong_timeout: try_load_secs("WS_PONG_TIMEOUT_SECS", 10),
            sse_keep_alive: try_load_secs("SSE_KEEP_ALIVE_SECS", 30),
            session_inactivity: try_load_secs("SESSION_INACTIVITY_SECS", 360),
        }
    }

    /// Replaces zero durations with the defaults. Applied to every config the
    /// server runs with, including ones built in code.
    pub fn validated(self) -> Self {
        let defaults = Config::default();
        Self {
            ws_ping_interval: nonzero(
                "ws_ping_interval",
                self.ws_ping_interval,
                defaults.ws_ping_interval,
            ),
            ws_pong_timeout: nonzero(
                "ws_pong_timeout",
                self.ws_pong_timeout,
                defaults.ws_pong_timeout,
            ),
            sse_keep_alive: nonzero(
                "sse_keep_alive",
                self.sse_keep_alive,
                defaults.sse_keep_alive,
            ),
            session_inactivity: nonzero(
                "session_inactivity",
                self.session_inactivity,
                defaults.session_inactivity,
            ),
            ..self
        }
    }
}

fn nonzero(name: &str, value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        warn!("{name} must be greater than zero, using default: {default:?}");
        default
    } else {
        value
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            ws_ping_interval: Duration::from_secs(30),
            ws_pong_timeout: Duration::from_secs(10),
            sse_keep_alive: Duration::from_secs(30),
            session_inactivity: Duration::from_secs(360),
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let fallback = || {
        default
            .parse::<T>()
            .unwrap_or_else(|e| panic!("default for {key} does not parse: {e}"))
    };

    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            fallback()
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            fallback()
        }
    }
}

/// Seconds from the environment. Zero is rejected: every duration here
/// drives a timer that must tick.
fn try_load_secs(key: &str, default: u64) -> Duration {
    let secs: u64 = try_load(key, &default.to_string());
    if secs == 0 {
        warn!("{key} must be greater than zero, using default: {default}");
        return Duration::from_secs(default);
    }
    Duration::from_secs(secs)
}
