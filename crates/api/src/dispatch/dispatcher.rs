//! Envelope dispatcher.
//!
//! Resolves each inbound call in the [`HandlerRegistry`], validates its
//! arity, invokes the handler and builds the reply. Unknown functions are
//! dropped without a reply so older and newer clients can talk to this
//! server.

use ocs_core::types::ConnId;
use ocs_core::Envelope;

use crate::dispatch::{AfterReply, Args, HandlerRegistry};
use crate::error::DispatchError;
use crate::ws::WsManager;

pub struct Dispatcher {
    handlers: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Dispatch one call and build its reply.
    ///
    /// Returns `None` when `func` is not registered. Argument and handler
    /// failures still produce a reply, carrying an error marker. After-reply
    /// hooks only run through [`Dispatcher::handle_frame`].
    pub async fn dispatch(&self, inbound: Envelope) -> Option<Envelope> {
        self.run(inbound).await.map(|(reply, _)| reply)
    }

    /// Resolve, check and invoke. The hook is returned only when the
    /// handler succeeded.
    async fn run(&self, inbound: Envelope) -> Option<(Envelope, Option<AfterReply>)> {
        let Some(binding) = self.handlers.resolve(&inbound.func) else {
            tracing::debug!(func = %inbound.func, id = %inbound.id, "Unknown function, dropping");
            return None;
        };

        if inbound.data.len() < binding.arity {
            let err = DispatchError::InvalidArguments(format!(
                "{} expects {} argument(s), got {}",
                inbound.func,
                binding.arity,
                inbound.data.len()
            ));
            tracing::warn!(func = %inbound.func, id = %inbound.id, error = %err, "Rejected call");
            return Some((inbound.reply(err.to_reply_data()), None));
        }

        tracing::debug!(func = %inbound.func, id = %inbound.id, "Dispatching call");
        let args = Args::new(inbound.data.clone());
        let (data, hook) = match (binding.call)(args).await {
            Ok(data) => (data, binding.after_reply.clone()),
            Err(err) => {
                tracing::warn!(func = %inbound.func, id = %inbound.id, error = %err, "Call failed");
                (err.to_reply_data(), None)
            }
        };

        Some((inbound.reply(data), hook))
    }

    /// Handle a raw text or binary frame received from `conn_id`.
    ///
    /// Malformed frames are logged and dropped. The reply, if any, goes only
    /// to the originating connection, and is queued before any after-reply
    /// hook of the function runs.
    pub async fn handle_frame(&self, ws_manager: &WsManager, conn_id: &ConnId, frame: &[u8]) {
        let inbound = match Envelope::from_slice(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "Dropping malformed frame");
                return;
            }
        };

        let Some((reply, hook)) = self.run(inbound).await else {
            return;
        };
        if !ws_manager.send_to(conn_id, &reply).await {
            tracing::debug!(conn_id = %conn_id, func = %reply.func, "Reply target is gone");
        }
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use axum::extract::ws::Message;
    use serde_json::json;

    use super::*;

    fn dispatcher() -> Dispatcher {
        dispatcher_with_hook(Arc::new(AtomicBool::new(false)))
    }

    /// `Echo::close` replies `[true]`, then sets `closed` after the reply.
    fn dispatcher_with_hook(closed: Arc<AtomicBool>) -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        let unit = Arc::new(());
        registry.bind("Echo::close", 0, &closed, |_, _| async { Ok(vec![json!(true)]) });
        registry.after_reply("Echo::close", &closed, |c| c.store(true, Ordering::SeqCst));
        registry.bind("Echo::echo", 1, &unit, |_, args| async move {
            Ok(vec![json!(args.string(0)?)])
        });
        registry.bind("Echo::fail", 0, &unit, |_, _| async {
            Err(DispatchError::Handler("backend unavailable".into()))
        });
        Dispatcher::new(registry)
    }

    #[tokio::test]
    async fn resolved_call_replies_with_same_id_and_func() {
        let reply = dispatcher()
            .dispatch(Envelope::call("1", "Echo::echo", vec![json!("hi")]))
            .await
            .expect("reply");

        assert_eq!(reply, Envelope::call("1", "Echo::echo", vec![json!("hi")]));
    }

    #[tokio::test]
    async fn unknown_func_is_dropped() {
        let reply = dispatcher()
            .dispatch(Envelope::call("3", "Bogus::nope", vec![]))
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn short_argument_list_replies_with_error_marker() {
        let reply = dispatcher()
            .dispatch(Envelope::call("4", "Echo::echo", vec![]))
            .await
            .expect("reply");

        assert_eq!(reply.id, "4");
        assert_eq!(reply.data[0]["code"], "INVALID_ARGUMENTS");
    }

    #[tokio::test]
    async fn wrong_argument_type_replies_with_error_marker() {
        let reply = dispatcher()
            .dispatch(Envelope::call("5", "Echo::echo", vec![json!(12)]))
            .await
            .expect("reply");
        assert_eq!(reply.data[0]["code"], "INVALID_ARGUMENTS");
    }

    #[tokio::test]
    async fn handler_error_replies_with_error_marker() {
        let reply = dispatcher()
            .dispatch(Envelope::call("6", "Echo::fail", vec![]))
            .await
            .expect("reply");
        assert_eq!(reply.data[0]["code"], "HANDLER_ERROR");
    }

    #[tokio::test]
    async fn frame_reply_goes_only_to_origin() {
        let ws = WsManager::new();
        let mut origin = ws.register("origin".to_string()).await;
        let mut other = ws.register("other".to_string()).await;

        dispatcher()
            .handle_frame(
                &ws,
                &"origin".to_string(),
                br#"{"id":"9","func":"Echo::echo","data":["x"]}"#,
            )
            .await;

        let msg = origin.recv().await.expect("origin gets reply");
        assert_matches!(msg, Message::Text(t) if t.as_str().contains("\"id\":\"9\""));
        assert!(other.try_recv().is_err(), "other connection must not get the reply");
    }

    #[tokio::test]
    async fn malformed_frame_is_dropped() {
        let ws = WsManager::new();
        let mut origin = ws.register("origin".to_string()).await;

        dispatcher()
            .handle_frame(&ws, &"origin".to_string(), b"{not json")
            .await;

        assert!(origin.try_recv().is_err());
    }

    /// Looks at the origin's queue from inside the hook.
    struct ReplyWatch {
        origin: std::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<Message>>,
        reply_was_queued: AtomicBool,
    }

    #[tokio::test]
    async fn after_reply_hook_runs_once_reply_is_queued() {
        let ws = WsManager::new();
        let watch = Arc::new(ReplyWatch {
            origin: std::sync::Mutex::new(ws.register("origin".to_string()).await),
            reply_was_queued: AtomicBool::new(false),
        });

        let mut registry = HandlerRegistry::new();
        registry.bind("Server::stop", 0, &watch, |_, _| async { Ok(vec![json!(true)]) });
        registry.after_reply("Server::stop", &watch, |w| {
            let queued = w.origin.lock().unwrap().try_recv();
            if matches!(queued, Ok(Message::Text(ref t)) if t.as_str().contains("\"id\":\"7\"")) {
                w.reply_was_queued.store(true, Ordering::SeqCst);
            }
        });

        Dispatcher::new(registry)
            .handle_frame(
                &ws,
                &"origin".to_string(),
                br#"{"id":"7","func":"Server::stop","data":[]}"#,
            )
            .await;

        assert!(watch.reply_was_queued.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_call_skips_after_reply_hook() {
        let ws = WsManager::new();
        let _origin = ws.register("origin".to_string()).await;
        let ran = Arc::new(AtomicBool::new(false));

        let mut registry = HandlerRegistry::new();
        registry.bind("Server::stop", 0, &ran, |_, _| async {
            Err(DispatchError::Handler("refused".into()))
        });
        registry.after_reply("Server::stop", &ran, |r| r.store(true, Ordering::SeqCst));

        Dispatcher::new(registry)
            .handle_frame(
                &ws,
                &"origin".to_string(),
                br#"{"id":"1","func":"Server::stop","data":[]}"#,
            )
            .await;

        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn plain_dispatch_skips_after_reply_hook() {
        let closed = Arc::new(AtomicBool::new(false));
        let reply = dispatcher_with_hook(Arc::clone(&closed))
            .dispatch(Envelope::call("8", "Echo::close", vec![]))
            .await
            .expect("reply");

        assert_eq!(reply.data, vec![json!(true)]);
        assert!(!closed.load(Ordering::SeqCst));
    }
}
