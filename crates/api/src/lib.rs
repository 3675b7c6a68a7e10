//! ocs-manager server library.
//!
//! Exposes the building blocks (config, state, dispatch, handlers, routes,
//! WebSocket infrastructure) so integration tests and the binary entrypoint
//! can both access them.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod forwarder;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod ws;
