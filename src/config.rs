//! Hub configuration
//!
//! Values come from environment variables; anything missing falls back to the
//! defaults below. Invalid values are a [`ConfigError`] and stop startup.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

/// Which application model the hub serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Per-client cursor positions keyed by session id
    Cursors,
    /// Shared todo list
    Todos,
}

impl ModelKind {
    /// Broadcast policy the model was designed around
    pub fn default_mode(self) -> BroadcastMode {
        match self {
            ModelKind::Cursors => BroadcastMode::Interval,
            ModelKind::Todos => BroadcastMode::EventDriven,
        }
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cursors" | "cursor" => Ok(ModelKind::Cursors),
            "todos" | "todo" => Ok(ModelKind::Todos),
            _ => Err("expected 'cursors' or 'todos'".to_string()),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Cursors => write!(f, "cursors"),
            ModelKind::Todos => write!(f, "todos"),
        }
    }
}

/// When snapshots are broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// One snapshot per fixed period
    Interval,
    /// One snapshot right after every state change
    EventDriven,
}

impl FromStr for BroadcastMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interval" | "poll" => Ok(BroadcastMode::Interval),
            "event" | "event_driven" | "event-driven" => Ok(BroadcastMode::EventDriven),
            _ => Err("expected 'interval' or 'event'".to_string()),
        }
    }
}

impl fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastMode::Interval => write!(f, "interval"),
            BroadcastMode::EventDriven => write!(f, "event_driven"),
        }
    }
}

/// What to do with well-formed operations the state rejects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Log and drop
    #[default]
    Ignore,
    /// Answer the sender with an `error` message
    Report,
}

impl FromStr for ValidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" | "silent" => Ok(ValidationPolicy::Ignore),
            "report" => Ok(ValidationPolicy::Report),
            _ => Err("expected 'ignore' or 'report'".to_string()),
        }
    }
}

/// Hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Application model
    pub model: ModelKind,
    /// Broadcast policy
    pub broadcast_mode: BroadcastMode,
    /// Period between interval broadcasts
    pub broadcast_interval: Duration,
    /// Per-connection outbound queue capacity
    pub outbound_capacity: usize,
    /// Period between server pings
    pub ping_interval: Duration,
    /// Inactivity after which a session is closed
    pub idle_timeout: Duration,
    /// Handling of validation errors
    pub validation_policy: ValidationPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9002,
            model: ModelKind::Cursors,
            broadcast_mode: BroadcastMode::Interval,
            broadcast_interval: Duration::from_millis(1000),
            outbound_capacity: 256,
            ping_interval: Duration::from_secs(54),
            idle_timeout: Duration::from_secs(60),
            validation_policy: ValidationPolicy::Ignore,
        }
    }
}

impl HubConfig {
    /// Default config for a given model, using that model's broadcast mode
    pub fn for_model(model: ModelKind) -> Self {
        Self {
            model,
            broadcast_mode: model.default_mode(),
            ..Default::default()
        }
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through a key lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let model: ModelKind = parse_var(&lookup, "HUB_MODEL")?.unwrap_or(ModelKind::Cursors);
        let mut config = Self::for_model(model);

        if let Some(host) = lookup("HUB_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }

        // HUB_PORT wins over the conventional PORT
        let port = match parse_var::<u16, _>(&lookup, "HUB_PORT")? {
            Some(port) => Some(port),
            None => parse_var(&lookup, "PORT")?,
        };
        if let Some(port) = port {
            config.port = port;
        }

        if let Some(mode) = parse_var(&lookup, "HUB_BROADCAST_MODE")? {
            config.broadcast_mode = mode;
        }
        if let Some(ms) = parse_positive(&lookup, "HUB_BROADCAST_INTERVAL_MS")? {
            config.broadcast_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse_positive(&lookup, "HUB_OUTBOUND_CAPACITY")? {
            config.outbound_capacity = capacity as usize;
        }
        if let Some(ms) = parse_positive(&lookup, "HUB_PING_INTERVAL_MS")? {
            config.ping_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_positive(&lookup, "HUB_IDLE_TIMEOUT_MS")? {
            config.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = parse_var(&lookup, "HUB_VALIDATION_POLICY")? {
            config.validation_policy = policy;
        }

        Ok(config)
    }

    /// Resolve the listen host to socket addresses. Accepts IPv4 and IPv6
    /// literals as well as host names such as `localhost`.
    pub async fn listen_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: "HUB_HOST",
            value: self.host.clone(),
            reason,
        };
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| invalid(e.to_string()))?
            .collect();
        if addrs.is_empty() {
            return Err(invalid("host resolved to no addresses".to_string()));
        }
        Ok(addrs)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn parse_positive<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<u64, _>(lookup, key)? {
        Some(0) => Err(ConfigError::Zero(key)),
        other => Ok(other),
    }
}
