use crate::event_log::DEFAULT_EVENT_LOG_CAPACITY;
use ferve_core::wire::DEFAULT_MAX_FRAME_BYTES;
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_DAEMON_URL: &str = "ws://localhost:8765";
pub const DEFAULT_LOG_DIR: &str = ".ferve/logs";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid daemon url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported daemon url scheme {0:?} (expected ws or wss)")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub daemon_url: Url,
    pub reconnect_delay: Duration,
    pub max_frame_bytes: usize,
    pub outbound_capacity: usize,
    pub event_log_capacity: usize,
}

impl ClientConfig {
    pub fn new(daemon_url: Url) -> Self {
        Self {
            daemon_url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        // the literal default is a valid ws url
        let url = parse_daemon_url(DEFAULT_DAEMON_URL)
            .unwrap_or_else(|_| unreachable!("default daemon url is valid"));
        Self::new(url)
    }
}

/// Delays used by the correlation adapters to fake request/response over a
/// protocol that has no reply ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterTimings {
    pub terminal_busy_timeout: Duration,
    pub chat_reply_timeout: Option<Duration>,
    pub task_refresh_delay: Duration,
    pub git_status_delay: Duration,
    pub pomodoro_poll_interval: Duration,
}

impl Default for AdapterTimings {
    fn default() -> Self {
        Self {
            terminal_busy_timeout: Duration::from_secs(5),
            chat_reply_timeout: None,
            task_refresh_delay: Duration::from_millis(200),
            git_status_delay: Duration::from_millis(500),
            pomodoro_poll_interval: Duration::from_secs(5),
        }
    }
}

pub fn parse_daemon_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

pub fn resolve_daemon_url(flag: &str) -> Result<Url, ConfigError> {
    if !flag.trim().is_empty() {
        return parse_daemon_url(flag);
    }
    if let Ok(value) = env::var("FERVE_DAEMON_URL") {
        if !value.trim().is_empty() {
            return parse_daemon_url(&value);
        }
    }
    parse_daemon_url(DEFAULT_DAEMON_URL)
}

pub fn resolve_log_dir(flag: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = env::var("FERVE_LOG_DIR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    DEFAULT_LOG_DIR.to_string()
}

pub fn resolve_log_level(debug: bool) -> String {
    if debug {
        return "debug".to_string();
    }
    match env::var("FERVE_LOG_LEVEL") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => "info".to_string(),
    }
}

/// Stdout logging is on unless `FERVE_LOG_STDOUT` says otherwise.
pub fn resolve_log_stdout() -> bool {
    match env::var("FERVE_LOG_STDOUT") {
        Ok(value) if env_false(&value) => false,
        _ => true,
    }
}

fn env_false(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
