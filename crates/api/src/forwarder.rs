//! Event-to-client fan-out.
//!
//! [`EventForwarder`] subscribes to the event bus and broadcasts each
//! [`ServerEvent`] to every connected client as an `{id: "", func, data}`
//! envelope.

use std::sync::Arc;

use ocs_events::ServerEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::ws::WsManager;

pub struct EventForwarder {
    ws_manager: Arc<WsManager>,
}

impl EventForwarder {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }

    /// Run the forwarding loop.
    ///
    /// Exits when `cancel` fires or the bus is closed.
    pub async fn run(
        self,
        mut receiver: broadcast::Receiver<ServerEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event forwarder cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => {
                        let envelope = event.to_envelope();
                        let delivered = self.ws_manager.broadcast(&envelope).await;
                        tracing::trace!(func = %envelope.func, delivered, "Event broadcast");
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, event forwarder shutting down");
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use axum::extract::ws::Message;
    use ocs_events::EventBus;

    use super::*;

    #[tokio::test]
    async fn events_reach_every_connection() {
        let ws = Arc::new(WsManager::new());
        let mut a = ws.register("a".to_string()).await;
        let mut b = ws.register("b".to_string()).await;

        let bus = EventBus::default();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(EventForwarder::new(Arc::clone(&ws)).run(bus.subscribe(), cancel.clone()));

        bus.publish(ServerEvent::CheckAllStarted { status: true });

        for rx in [&mut a, &mut b] {
            let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timely")
                .expect("message");
            assert_matches!(
                msg,
                Message::Text(t) if t.as_str() == r#"{"id":"","func":"UpdateHandler::checkAllStarted","data":[true]}"#
            );
        }

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_bus_stops_the_forwarder() {
        let ws = Arc::new(WsManager::new());
        let bus = EventBus::default();
        let receiver = bus.subscribe();
        drop(bus);

        tokio::time::timeout(
            Duration::from_secs(1),
            EventForwarder::new(ws).run(receiver, CancellationToken::new()),
        )
        .await
        .expect("forwarder should stop when the bus is closed");
    }
}
