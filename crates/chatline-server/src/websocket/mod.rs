//! WebSocket connection handles, frame dispatch, idle reaping and the session task.

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod session;
