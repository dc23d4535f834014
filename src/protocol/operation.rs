//! Inbound operations
//!
//! Raw text is parsed in two steps: first into the `{action, data}` envelope,
//! then the `data` payload into the typed [`Operation`] for that action.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Wire envelope shared by both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

/// A validated client request
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Ask for the current snapshot
    Query,
    /// Append a todo
    Add { text: String },
    /// Delete a todo by id
    Remove { id: String },
    /// Flip a todo's completion flag
    Toggle { id: String },
    /// Move the sender's cursor
    UpdatePos { pos: [f64; 2], nick: String },
    /// Send the payload straight back to the sender
    Echo(Value),
}

#[derive(Deserialize)]
struct AddPayload {
    text: String,
}

#[derive(Deserialize)]
struct TargetPayload {
    id: String,
}

#[derive(Deserialize)]
struct PositionPayload {
    pos: [f64; 2],
    #[serde(default)]
    nick: String,
}

impl Operation {
    /// Parse a raw text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    /// Turn an already decoded envelope into an operation
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope { action, data } = envelope;
        match action.as_str() {
            "query" => Ok(Operation::Query),
            "add" => {
                let payload: AddPayload = payload("add", data)?;
                Ok(Operation::Add { text: payload.text })
            }
            "remove" => {
                let payload: TargetPayload = payload("remove", data)?;
                Ok(Operation::Remove { id: payload.id })
            }
            "toggle" => {
                let payload: TargetPayload = payload("toggle", data)?;
                Ok(Operation::Toggle { id: payload.id })
            }
            "update_pos" => {
                let payload: PositionPayload = payload("update_pos", data)?;
                if !payload.pos.iter().all(|c| c.is_finite()) {
                    return Err(ProtocolError::InvalidPayload {
                        action: "update_pos",
                        reason: "pos must hold finite numbers".to_string(),
                    });
                }
                Ok(Operation::UpdatePos {
                    pos: payload.pos,
                    nick: payload.nick,
                })
            }
            "echo" => Ok(Operation::Echo(data)),
            _ => Err(ProtocolError::UnknownAction(action)),
        }
    }

    /// Wire name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Add { .. } => "add",
            Operation::Remove { .. } => "remove",
            Operation::Toggle { .. } => "toggle",
            Operation::UpdatePos { .. } => "update_pos",
            Operation::Echo(_) => "echo",
        }
    }
}

fn payload<T: DeserializeOwned>(action: &'static str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        action,
        reason: e.to_string(),
    })
}
