//! Cursor record for the shared cursor board

use serde::{Deserialize, Serialize};

/// Pointer position and nickname of one connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Cursor {
    pub pos: [f64; 2],
    #[serde(default)]
    pub nick: String,
}

impl Cursor {
    pub fn new(pos: [f64; 2], nick: impl Into<String>) -> Self {
        Self {
            pos,
            nick: nick.into(),
        }
    }
}
