//! Asynchronous job engine.
//!
//! Every long-running operation (content download, item update) follows the
//! same shape: it is started once, polled on a fixed interval for progress,
//! and reports exactly one terminal outcome.
//!
//! - [`Operation`]: the poll contract an external operation presents.
//! - [`TaskOperation`]: an [`Operation`] backed by a spawned async body.
//! - [`JobPoller`]: the state machine that drives one operation.
//! - [`JobRegistry`]: owns in-flight jobs, at most one per key.
//! - [`JobReporter`]: translates poll lifecycle into domain events.

pub mod operation;
pub mod poller;
pub mod registry;

pub use operation::{ByteCount, Operation, ProgressHandle, TaskOperation};
pub use poller::{JobPoller, JobReporter};
pub use registry::{JobCompletion, JobRegistry, JobSpec, DEFAULT_POLL_INTERVAL};
