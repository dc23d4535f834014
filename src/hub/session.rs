//! Per-connection lifecycle tracking
//!
//! `Connecting -> Active -> Closed`. Closing is exactly-once: only the first
//! caller of [`SessionTracker::close`] gets `true` and performs teardown.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::SessionId;

/// Phase of a session's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Active,
    Closed,
}

/// Phase table for every session that has not been torn down yet
pub struct SessionTracker {
    phases: Mutex<HashMap<SessionId, SessionPhase>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            phases: Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking a new session
    pub fn begin(&self, id: &str) {
        self.phases
            .lock()
            .insert(id.to_string(), SessionPhase::Connecting);
    }

    /// Move a connecting session to active. Returns `false` if it was closed
    /// in the meantime.
    pub fn activate(&self, id: &str) -> bool {
        let mut phases = self.phases.lock();
        match phases.get_mut(id) {
            Some(phase) if *phase == SessionPhase::Connecting => {
                *phase = SessionPhase::Active;
                true
            }
            _ => false,
        }
    }

    /// Claim the teardown of a session. `true` only for the first call.
    pub fn close(&self, id: &str) -> bool {
        self.phases.lock().remove(id).is_some()
    }

    /// Current phase; sessions no longer tracked count as closed
    pub fn phase(&self, id: &str) -> SessionPhase {
        self.phases
            .lock()
            .get(id)
            .copied()
            .unwrap_or(SessionPhase::Closed)
    }

    /// Number of sessions in the active phase
    pub fn active_count(&self) -> usize {
        self.phases
            .lock()
            .values()
            .filter(|phase| **phase == SessionPhase::Active)
            .count()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
