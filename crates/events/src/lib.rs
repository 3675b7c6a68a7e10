//! ocs-manager event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`ServerEvent`]: the typed lifecycle events that handlers and jobs
//!   publish, and that the WebSocket layer fans out to every client.

pub mod bus;
pub mod event;

pub use bus::EventBus;
pub use event::{ItemPhase, ItemResult, ServerEvent};
