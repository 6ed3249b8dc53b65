//! Parla API Library Crate
//!
//! The host process for browser conversations: configuration, shared state,
//! the PostgreSQL conversation store, routing and the WebSocket bridge that
//! relays each browser socket through its own live session. The `api` binary
//! is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
