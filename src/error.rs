//! Error taxonomy for the hub
//!
//! Per-connection errors ([`ProtocolError`], [`ValidationError`],
//! [`TransportError`]) stay inside the session that produced them. Only
//! [`ConfigError`] is fatal, and only at startup.

use thiserror::Error;

/// Result type for hub operations
pub type HubResult<T> = Result<T, HubError>;

/// Top-level error wrapping every error family
#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed or unparsable inbound message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message format: {0}")]
    Malformed(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("invalid payload for '{action}': {reason}")]
    InvalidPayload { action: &'static str, reason: String },

    /// Frame could not be read as text at all; the connection is closed.
    #[error("frame is not valid UTF-8 text")]
    Framing,
}

impl ProtocolError {
    /// Whether the error breaks framing and must close the connection
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::Framing)
    }
}

/// Well-formed operation that cannot be applied to the current state
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// `add` with blank or whitespace-only text. Plain todo clients accept any
    /// string; the hub does not. Only logged unless the policy is `report`.
    #[error("todo text must not be empty")]
    EmptyText,

    #[error("'{operation}' is not supported by the {model} model")]
    Unsupported {
        operation: &'static str,
        model: &'static str,
    },

    #[error("session '{0}' has no state entry")]
    UnknownSession(String),
}

/// Send or receive failure on one connection
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("session '{0}' is not registered")]
    NotRegistered(String),

    #[error("outbound queue for session '{0}' is full")]
    SlowConsumer(String),

    #[error("connection for session '{0}' is closed")]
    Closed(String),
}

impl TransportError {
    /// Session the failure belongs to
    pub fn session_id(&self) -> &str {
        match self {
            TransportError::NotRegistered(id)
            | TransportError::SlowConsumer(id)
            | TransportError::Closed(id) => id,
        }
    }
}

/// Unrecoverable startup configuration failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
