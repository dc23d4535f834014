//! WebSocket transport for the hub
//!
//! Provides the WebSocket endpoint at `/ws` (and `/` for clients of the
//! cursor demo).
//!
//! ## Features
//! - `init` with the session id and full state right after the upgrade
//! - Bounded outbound queue per socket; slow consumers are disconnected
//! - Server pings and idle timeout

pub mod handler;

pub use handler::ws_handler;
