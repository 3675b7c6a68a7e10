//! Request/response dispatch.
//!
//! [`HandlerRegistry`] is the lookup table from `func` name to handler,
//! built once at startup. [`Dispatcher`] parses inbound frames, resolves
//! and invokes the handler, and replies to the originating connection.

pub mod args;
pub mod dispatcher;
pub mod registry;

pub use args::Args;
pub use dispatcher::Dispatcher;
pub use registry::{AfterReply, HandlerBinding, HandlerRegistry};
