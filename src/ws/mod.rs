//! WebSocket transport: one connection per viewer, room membership is a
//! logical operation on top of it.

pub mod actor;
pub mod handler;

pub use handler::ws_upgrade;
