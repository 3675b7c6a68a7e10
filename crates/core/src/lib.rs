//! Shared building blocks for the ocs-manager workspace.
//!
//! - [`envelope`]: the uniform `{id, func, data}` wire message.
//! - [`job`]: job lifecycle states and the public job record.
//! - [`funcs`]: event and function name constants.
//! - [`error`]: the domain error type.

pub mod envelope;
pub mod error;
pub mod funcs;
pub mod job;
pub mod types;

pub use envelope::Envelope;
pub use error::CoreError;
