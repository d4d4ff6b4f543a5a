//! # chatline-server
//!
//! Connection and routing core for the chat backend, served over Axum.
//!
//! - [`registry`]: one live session per user, supersede on reconnect
//! - [`router`]: single-attempt delivery with eviction on send failure
//! - [`ingest`]: frame classification, persistence, envelope construction
//! - [`presence`]: online/offline fan-out to every other live session
//! - [`websocket`]: per-connection reader/writer tasks
//! - [`server`]: HTTP routes (`/ws/{user_id}`, history, health, metrics)

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod presence;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod websocket;
