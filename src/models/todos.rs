//! Shared todo list

use tracing::debug;

use super::StateModel;
use crate::error::ValidationError;
use crate::protocol::{Operation, SnapshotAction};
use crate::types::Todo;

/// Todo list shared by every session; records are not owned by a session
#[derive(Debug, Clone, Copy, Default)]
pub struct TodoList;

impl StateModel for TodoList {
    type State = Vec<Todo>;

    fn name(&self) -> &'static str {
        "todos"
    }

    fn snapshot_action(&self) -> SnapshotAction {
        SnapshotAction::State
    }

    fn apply(
        &self,
        todos: &mut Vec<Todo>,
        _session: &str,
        op: &Operation,
    ) -> Result<bool, ValidationError> {
        match op {
            Operation::Add { text } => {
                // Blank todos are refused outright, see `ValidationError::EmptyText`
                if text.trim().is_empty() {
                    return Err(ValidationError::EmptyText);
                }
                todos.push(Todo::new(text.clone()));
                Ok(true)
            }
            Operation::Remove { id } => {
                let before = todos.len();
                todos.retain(|todo| &todo.id != id);
                let removed = todos.len() != before;
                if !removed {
                    debug!(todo_id = %id, "remove of unknown todo ignored");
                }
                Ok(removed)
            }
            Operation::Toggle { id } => match todos.iter_mut().find(|todo| &todo.id == id) {
                Some(todo) => {
                    todo.toggle();
                    Ok(true)
                }
                None => {
                    debug!(todo_id = %id, "toggle of unknown todo ignored");
                    Ok(false)
                }
            },
            other => Err(ValidationError::Unsupported {
                operation: other.name(),
                model: self.name(),
            }),
        }
    }
}
