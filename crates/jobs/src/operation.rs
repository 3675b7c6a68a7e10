//! The poll contract for long-running operations.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;

/// A long-running operation observed only through polling.
///
/// The poller calls [`start`](Operation::start) once, then on every tick
/// checks [`is_done`](Operation::is_done). While not done it reads
/// [`progress`](Operation::progress); once done it asks
/// [`has_error`](Operation::has_error) and, on error, drains
/// [`next_status_message`](Operation::next_status_message).
///
/// None of these methods may block.
pub trait Operation: Send + 'static {
    /// Begin the operation. An `Err` means it refused to start at all.
    fn start(&mut self) -> Result<(), String>;

    fn is_done(&self) -> bool;

    /// Current completion fraction, if the operation can tell.
    fn progress(&mut self) -> Option<f64>;

    /// Bytes transferred so far, for operations that move data.
    fn bytes(&self) -> Option<ByteCount> {
        None
    }

    fn has_error(&self) -> bool;

    /// Pop the oldest pending diagnostic message.
    fn next_status_message(&mut self) -> Option<String>;
}

/// Bytes received so far and the expected total (`0` when unknown).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCount {
    pub received: u64,
    pub total: u64,
}

// ---------------------------------------------------------------------------
// TaskOperation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TaskState {
    progress: Option<f64>,
    bytes: Option<ByteCount>,
    done: bool,
    failed: bool,
    messages: VecDeque<String>,
}

fn lock(state: &Mutex<TaskState>) -> MutexGuard<'_, TaskState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write side of a [`TaskOperation`], handed to the async body.
#[derive(Clone)]
pub struct ProgressHandle {
    state: Arc<Mutex<TaskState>>,
}

impl ProgressHandle {
    /// Record a completion fraction.
    pub fn set_progress(&self, fraction: f64) {
        lock(&self.state).progress = Some(fraction);
    }

    /// Record progress as a byte count. The fraction is only derived when
    /// the total is known and non-zero.
    pub fn set_bytes(&self, received: u64, total: Option<u64>) {
        let mut state = lock(&self.state);
        state.bytes = Some(ByteCount {
            received,
            total: total.unwrap_or(0),
        });
        if let Some(total) = total.filter(|t| *t > 0) {
            state.progress = Some(received as f64 / total as f64);
        }
    }

    /// Queue a diagnostic message. Drained into the error detail on failure.
    pub fn message(&self, text: impl Into<String>) {
        lock(&self.state).messages.push_back(text.into());
    }
}

type TaskBody = Box<dyn FnOnce(ProgressHandle) -> BoxFuture<'static, Result<(), String>> + Send>;

/// An [`Operation`] whose work is an async body spawned on the tokio runtime.
///
/// The body reports through a [`ProgressHandle`]; its `Err` string becomes
/// the last diagnostic message.
pub struct TaskOperation {
    body: Option<TaskBody>,
    refusal: Option<String>,
    state: Arc<Mutex<TaskState>>,
}

impl TaskOperation {
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(ProgressHandle) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            body: Some(Box::new(move |handle| body(handle).boxed())),
            refusal: None,
            state: Arc::default(),
        }
    }

    /// An operation that refuses to start with the given reason.
    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            body: None,
            refusal: Some(reason.into()),
            state: Arc::default(),
        }
    }
}

impl Operation for TaskOperation {
    fn start(&mut self) -> Result<(), String> {
        if let Some(reason) = self.refusal.take() {
            return Err(reason);
        }
        let body = self
            .body
            .take()
            .ok_or_else(|| "operation already started".to_string())?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("no async runtime available: {e}"))?;

        let state = Arc::clone(&self.state);
        let handle = ProgressHandle {
            state: Arc::clone(&state),
        };

        runtime.spawn(async move {
            let result = AssertUnwindSafe(body(handle)).catch_unwind().await;
            let mut state = lock(&state);
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    state.failed = true;
                    state.messages.push_back(e);
                }
                Err(_) => {
                    state.failed = true;
                    state.messages.push_back("operation panicked".to_string());
                }
            }
            state.done = true;
        });

        Ok(())
    }

    fn is_done(&self) -> bool {
        lock(&self.state).done
    }

    fn progress(&mut self) -> Option<f64> {
        lock(&self.state).progress
    }

    fn bytes(&self) -> Option<ByteCount> {
        lock(&self.state).bytes
    }

    fn has_error(&self) -> bool {
        lock(&self.state).failed
    }

    fn next_status_message(&mut self) -> Option<String> {
        lock(&self.state).messages.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn wait_done(op: &TaskOperation) {
        for _ in 0..200 {
            if op.is_done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("operation never finished");
    }

    #[tokio::test]
    async fn successful_body_reports_progress_and_no_error() {
        let mut op = TaskOperation::new(|handle| async move {
            handle.set_bytes(50, Some(100));
            handle.message("halfway");
            Ok(())
        });

        op.start().expect("should start");
        wait_done(&op).await;

        assert!(!op.has_error());
        assert_eq!(op.progress(), Some(0.5));
        assert_eq!(
            op.bytes(),
            Some(ByteCount {
                received: 50,
                total: 100
            })
        );
    }

    #[tokio::test]
    async fn failing_body_queues_messages_in_order() {
        let mut op = TaskOperation::new(|handle| async move {
            handle.message("resolving mirror");
            Err("connection reset".to_string())
        });

        op.start().unwrap();
        wait_done(&op).await;

        assert!(op.has_error());
        assert_eq!(op.next_status_message().as_deref(), Some("resolving mirror"));
        assert_eq!(op.next_status_message().as_deref(), Some("connection reset"));
        assert_eq!(op.next_status_message(), None);
    }

    #[tokio::test]
    async fn panicking_body_is_reported_as_failure() {
        let mut op = TaskOperation::new(|_handle| async move {
            if true {
                panic!("boom");
            }
            Ok(())
        });

        op.start().unwrap();
        wait_done(&op).await;

        assert!(op.has_error());
        assert_eq!(
            op.next_status_message().as_deref(),
            Some("operation panicked")
        );
    }

    #[tokio::test]
    async fn refused_operation_does_not_start() {
        let mut op = TaskOperation::refused("no update available");
        assert_eq!(op.start(), Err("no update available".to_string()));
        assert!(!op.is_done());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mut op = TaskOperation::new(|_| async { Ok(()) });
        op.start().unwrap();
        assert!(op.start().is_err());
    }

    #[test]
    fn unknown_total_leaves_progress_unset() {
        let op = TaskOperation::new(|_| async { Ok(()) });
        let handle = ProgressHandle {
            state: Arc::clone(&op.state),
        };
        handle.set_bytes(10, None);
        handle.set_bytes(10, Some(0));
        assert_eq!(lock(&op.state).progress, None);
        assert_eq!(
            op.bytes(),
            Some(ByteCount {
                received: 10,
                total: 0
            })
        );
    }
}
