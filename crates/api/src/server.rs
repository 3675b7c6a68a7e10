//! Server lifecycle: listen, serve, and shut down cleanly.

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tokio::net::TcpListener;

use crate::forwarder::EventForwarder;
use crate::handlers::config::Section;
use crate::routes;
use crate::state::AppState;
use crate::ws;

/// Serve clients on `listener` until `shutdown` resolves or a client calls
/// `WebSocketServer::stop`.
///
/// While running, the `ws://` URL is published in the user application
/// config as `websocket_url`; it is cleared again on the way out.
pub async fn serve<F>(state: AppState, listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let url = format!("ws://{addr}");
    let control = Arc::clone(&state.handlers.server);
    let settings = Arc::clone(&state.handlers.config);

    control.set_url(Some(url.clone()));
    if let Err(e) = settings
        .set_entry(Section::Application, "websocket_url", json!(url))
        .await
    {
        tracing::warn!(error = %e, "Failed to record websocket_url");
    }
    tracing::info!(%url, "WebSocket server listening");

    let token = control.shutdown_token();

    // --- Event forwarder ---
    let forwarder = EventForwarder::new(Arc::clone(&state.ws_manager));
    let forwarder_handle = tokio::spawn(forwarder.run(state.event_bus.subscribe(), token.clone()));

    // --- Heartbeat ---
    let heartbeat_handle =
        ws::start_heartbeat(Arc::clone(&state.ws_manager), state.config.heartbeat_interval);

    // An external shutdown signal cancels the same token as a remote stop.
    let signal_token = token.clone();
    let signal_handle = tokio::spawn(async move {
        tokio::select! {
            () = shutdown => signal_token.cancel(),
            () = signal_token.cancelled() => {}
        }
    });

    let ws_manager = Arc::clone(&state.ws_manager);
    let graceful_token = token.clone();
    let server = axum::serve(listener, routes::app_router(state.clone())).with_graceful_shutdown(
        async move {
            graceful_token.cancelled().await;
            let count = ws_manager.connection_count().await;
            tracing::info!(count, "Shutdown requested, closing WebSocket connections");
            ws_manager.shutdown_all().await;
        },
    );
    let server_handle = tokio::spawn(async move { server.await });

    token.cancelled().await;

    // --- Post-shutdown cleanup ---
    let timeout = state.config.shutdown_timeout;
    let served = match tokio::time::timeout(timeout, server_handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Server task failed");
            Ok(())
        }
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "Timed out waiting for connections to drain");
            Ok(())
        }
    };
    if let Err(e) = &served {
        control.set_error(e.to_string());
    }

    let _ = tokio::time::timeout(timeout, forwarder_handle).await;
    heartbeat_handle.abort();
    signal_handle.abort();
    tracing::info!("Event forwarder and heartbeat stopped");

    control.set_url(None);
    if let Err(e) = settings
        .remove_entry(Section::Application, "websocket_url")
        .await
    {
        tracing::warn!(error = %e, "Failed to clear websocket_url");
    }

    tracing::info!("Server stopped");
    served
}
