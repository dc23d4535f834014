//! Sync Hub
//!
//! A real-time state synchronization hub: it holds one authoritative shared
//! state, applies mutations sent by many WebSocket clients, and fans
//! consistent snapshots out to all of them.
//!
//! # Features
//!
//! - **Single writer**: every mutation is serialized, readers get immutable snapshots
//! - **Two broadcast policies**: fixed interval or right after each change
//! - **Slow-consumer isolation**: bounded per-connection queues, laggards are closed
//! - **Idempotent teardown**: per-client state disappears exactly once
//! - **Two models**: shared cursor board and shared todo list
//!
//! # Modules
//!
//! - `types`: Records held in the shared state (Todo, Cursor)
//! - `protocol`: `{action, data}` wire envelope and operations
//! - `models`: State models (cursor board, todo list)
//! - `hub`: Registry, store, processor, scheduler and session lifecycle
//! - `api`: Axum router and WebSocket transport
//! - `config`: Environment-based configuration
//! - `error`: Error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use sync_hub::{HubConfig, ModelKind, TodoList};
//!
//! #[tokio::main]
//! async fn main() -> sync_hub::HubResult<()> {
//!     let config = HubConfig::for_model(ModelKind::Todos);
//!     sync_hub::api::serve(TodoList, config).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod types;

// Re-export commonly used items at crate root
pub use config::{BroadcastMode, HubConfig, ModelKind, ValidationPolicy};
pub use error::{
    ConfigError, HubError, HubResult, ProtocolError, TransportError, ValidationError,
};
pub use hub::{BroadcastReport, Hub, HubStats, Snapshot};
pub use models::{CursorBoard, CursorMap, StateModel, TodoList};
pub use protocol::{Frame, Operation, ServerMessage};
pub use types::{Cursor, SessionId, Todo};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
