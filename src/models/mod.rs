//! Application state models
//!
//! A [`StateModel`] defines what the shared state looks like and how
//! operations change it. The hub owns the state; models only describe the
//! transitions.

mod cursors;
mod todos;

pub use cursors::{CursorBoard, CursorMap};
pub use todos::TodoList;

use serde::Serialize;

use crate::error::ValidationError;
use crate::protocol::{Operation, SnapshotAction};

/// Application-defined shared state and its transitions
///
/// Every method receives the state by mutable reference and returns whether
/// it changed. The store only publishes a new snapshot when it did.
pub trait StateModel: Send + Sync + 'static {
    /// The shared document
    type State: Clone + Default + Serialize + Send + Sync + 'static;

    /// Short model name used in logs and stats
    fn name(&self) -> &'static str;

    /// Outbound action carrying this model's snapshots
    fn snapshot_action(&self) -> SnapshotAction;

    /// Create the per-client entry for a new session
    fn attach(&self, _state: &mut Self::State, _session: &str) -> bool {
        false
    }

    /// Remove every entry owned by a session
    fn detach(&self, _state: &mut Self::State, _session: &str) -> bool {
        false
    }

    /// Apply a mutating operation on behalf of `session`
    fn apply(
        &self,
        state: &mut Self::State,
        session: &str,
        op: &Operation,
    ) -> Result<bool, ValidationError>;
}
