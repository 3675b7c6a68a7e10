//! The `WebSocketServer::*` funcs: server status and remote stop.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::dispatch::HandlerRegistry;

/// Listening URL, last server error, and the shared shutdown token.
pub struct ServerControl {
    shutdown: CancellationToken,
    url: RwLock<Option<String>>,
    error: RwLock<Option<String>>,
}

impl ServerControl {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            url: RwLock::new(None),
            error: RwLock::new(None),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request a graceful shutdown.
    pub fn stop(&self) {
        tracing::info!("Shutdown requested by client");
        self.shutdown.cancel();
    }

    pub fn set_url(&self, url: Option<String>) {
        *self.url.write().unwrap_or_else(PoisonError::into_inner) = url;
    }

    /// `ws://host:port` while listening, empty otherwise.
    pub fn server_url(&self) -> String {
        self.url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default()
    }

    pub fn set_error(&self, error: impl Into<String>) {
        *self.error.write().unwrap_or_else(PoisonError::into_inner) = Some(error.into());
    }

    pub fn is_error(&self) -> bool {
        self.error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn error_string(&self) -> String {
        self.error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default()
    }
}

pub fn register(registry: &mut HandlerRegistry, handler: &Arc<ServerControl>) {
    // Cancelling closes every connection, so it must not run before the
    // caller's reply is queued.
    registry.bind("WebSocketServer::stop", 0, handler, |_, _| async move {
        Ok(vec![json!(true)])
    });
    registry.after_reply("WebSocketServer::stop", handler, |h| h.stop());
    registry.bind("WebSocketServer::isError", 0, handler, |h, _| async move {
        Ok(vec![json!(h.is_error())])
    });
    registry.bind("WebSocketServer::errorString", 0, handler, |h, _| async move {
        Ok(vec![json!(h.error_string())])
    });
    registry.bind("WebSocketServer::serverUrl", 0, handler, |h, _| async move {
        Ok(vec![json!(h.server_url())])
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_cancels_the_shared_token() {
        let token = CancellationToken::new();
        let control = ServerControl::new(token.clone());

        control.stop();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn stop_call_cancels_only_after_reply() {
        let token = CancellationToken::new();
        let control = Arc::new(ServerControl::new(token.clone()));
        let mut registry = HandlerRegistry::new();
        register(&mut registry, &control);

        let binding = registry.resolve("WebSocketServer::stop").expect("bound");
        let reply = (binding.call)(crate::dispatch::Args::new(vec![])).await.unwrap();
        assert_eq!(reply, vec![json!(true)]);
        assert!(!token.is_cancelled());

        let hook = binding.after_reply.clone().expect("stop runs after the reply");
        hook();
        assert!(token.is_cancelled());
    }

    #[test]
    fn status_defaults_to_empty() {
        let control = ServerControl::new(CancellationToken::new());
        assert!(!control.is_error());
        assert_eq!(control.error_string(), "");
        assert_eq!(control.server_url(), "");

        control.set_url(Some("ws://127.0.0.1:4000".into()));
        control.set_error("address in use");
        assert_eq!(control.server_url(), "ws://127.0.0.1:4000");
        assert!(control.is_error());
    }
}
