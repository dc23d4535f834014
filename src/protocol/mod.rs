//! Wire protocol
//!
//! Both directions use a JSON envelope `{ "action": ..., "data": ... }`.

mod messages;
mod operation;

pub use messages::{error_frame, Frame, InitPayload, ServerMessage, SnapshotAction};
pub use operation::{Envelope, Operation};
