//! Room server library: configuration, logging and the HTTP/WebSocket API.
//!
//! The `ps_server` binary wires these together; integration tests drive
//! the router directly.

pub mod api;
pub mod config;
pub mod logging;
