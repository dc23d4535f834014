//! Shared cursor board

use std::collections::BTreeMap;

use super::StateModel;
use crate::error::ValidationError;
use crate::protocol::{Operation, SnapshotAction};
use crate::types::{Cursor, SessionId};

/// Cursor of every connected session, ordered by session id
pub type CursorMap = BTreeMap<SessionId, Cursor>;

/// One cursor per session, created on connect and dropped on disconnect
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorBoard;

impl StateModel for CursorBoard {
    type State = CursorMap;

    fn name(&self) -> &'static str {
        "cursors"
    }

    fn snapshot_action(&self) -> SnapshotAction {
        SnapshotAction::SyncData
    }

    fn attach(&self, cursors: &mut CursorMap, session: &str) -> bool {
        cursors.insert(session.to_string(), Cursor::default());
        true
    }

    fn detach(&self, cursors: &mut CursorMap, session: &str) -> bool {
        cursors.remove(session).is_some()
    }

    fn apply(
        &self,
        cursors: &mut CursorMap,
        session: &str,
        op: &Operation,
    ) -> Result<bool, ValidationError> {
        match op {
            Operation::UpdatePos { pos, nick } => {
                // Only attached sessions own a cursor; a late update after
                // teardown must not resurrect the entry.
                let cursor = cursors
                    .get_mut(session)
                    .ok_or_else(|| ValidationError::UnknownSession(session.to_string()))?;
                let next = Cursor::new(*pos, nick.clone());
                if *cursor == next {
                    return Ok(false);
                }
                *cursor = next;
                Ok(true)
            }
            other => Err(ValidationError::Unsupported {
                operation: other.name(),
                model: self.name(),
            }),
        }
    }
}
