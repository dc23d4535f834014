//! Data types shared by the hub and its clients
//!
//! This module contains the records held in the shared state.

mod cursor;
mod todo;

pub use cursor::Cursor;
pub use todo::Todo;

/// Opaque identifier of a connected session
pub type SessionId = String;

/// Generate a new unique session id
pub fn new_session_id() -> SessionId {
    uuid::Uuid::new_v4().to_string()
}
