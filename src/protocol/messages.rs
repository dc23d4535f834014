//! Outbound messages

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::SessionId;

/// A serialized outbound message, shared by every recipient of a broadcast
pub type Frame = Arc<str>;

/// Messages sent from the hub to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum ServerMessage<S> {
    /// First message of every session
    Init(InitPayload<S>),
    /// Full snapshot (todo list flavour)
    State(S),
    /// Full snapshot (cursor board flavour)
    SyncData(S),
    /// Payload of an `echo` request
    Echo(Value),
    /// Human-readable error
    Error(String),
}

/// Payload of the `init` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitPayload<S> {
    pub session_id: SessionId,
    pub state: S,
}

/// Which outbound action carries a model's snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotAction {
    State,
    SyncData,
}

impl<S> ServerMessage<S> {
    /// Wrap a snapshot in the given action
    pub fn snapshot(action: SnapshotAction, state: S) -> Self {
        match action {
            SnapshotAction::State => ServerMessage::State(state),
            SnapshotAction::SyncData => ServerMessage::SyncData(state),
        }
    }

    pub fn init(session_id: SessionId, state: S) -> Self {
        ServerMessage::Init(InitPayload { session_id, state })
    }
}

impl<S: Serialize> ServerMessage<S> {
    /// Serialize into a shareable frame
    pub fn encode(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

/// Build an `error` frame. Falls back to a fixed text if encoding fails.
pub fn error_frame(message: impl Into<String>) -> Frame {
    ServerMessage::<()>::Error(message.into())
        .encode()
        .unwrap_or_else(|_| Frame::from(r#"{"action":"error","data":"internal error"}"#))
}
