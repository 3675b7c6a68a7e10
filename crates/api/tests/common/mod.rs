#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::Path;
use axum::http::header::CONTENT_LENGTH;
use axum::routing;
use axum::Router;
use futures::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use ocs_api::config::ServerConfig;
use ocs_api::handlers::ocs_api::{
    Category, ContentApi, ContentApiError, ContentPage, ContentQuery, Provider,
};
use ocs_api::server;
use ocs_api::state::AppState;
use ocs_core::Envelope;

/// How long a test waits for any single message.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Key of the single provider served by [`StubContentApi`].
pub const PROVIDER_KEY: &str = "http://provider.test/ocs/v1/";

/// Build a test `ServerConfig` rooted in `dir`, with a fast poll interval.
pub fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        config_dir: dir.path().join("config"),
        data_dir: dir.path().join("data"),
        job_poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_secs(30),
        shutdown_timeout: Duration::from_secs(2),
    }
}

// ---------------------------------------------------------------------------
// Content API stub
// ---------------------------------------------------------------------------

/// One provider with one category; content entries are set per test.
#[derive(Default)]
pub struct StubContentApi {
    contents: Mutex<HashMap<String, Value>>,
}

impl StubContentApi {
    pub fn with_content(self, content_id: &str, content: Value) -> Self {
        self.contents
            .lock()
            .unwrap()
            .insert(content_id.to_string(), content);
        self
    }
}

#[async_trait]
impl ContentApi for StubContentApi {
    async fn fetch_providers(&self, _url: &str) -> Result<Vec<Provider>, ContentApiError> {
        Ok(vec![Provider {
            id: "provider".to_string(),
            location: PROVIDER_KEY.to_string(),
            name: "Test Provider".to_string(),
            icon: String::new(),
        }])
    }

    async fn fetch_categories(&self, _provider: &Provider) -> Result<Vec<Category>, ContentApiError> {
        Ok(vec![Category {
            id: "1".to_string(),
            name: "Wallpapers".to_string(),
        }])
    }

    async fn fetch_contents(
        &self,
        _provider: &Provider,
        _query: &ContentQuery,
    ) -> Result<ContentPage, ContentApiError> {
        let items: Vec<Value> = self.contents.lock().unwrap().values().cloned().collect();
        Ok(ContentPage {
            total_items: items.len() as u64,
            items,
        })
    }

    async fn fetch_content(
        &self,
        provider: &Provider,
        content_id: &str,
    ) -> Result<Value, ContentApiError> {
        self.contents
            .lock()
            .unwrap()
            .get(content_id)
            .cloned()
            .ok_or_else(|| ContentApiError::Status {
                url: format!("{}content/data/{content_id}", provider.location),
                status: 404,
            })
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Build the router for a fresh state rooted in `dir`.
pub async fn build_test_app(dir: &TempDir) -> Router {
    let state = AppState::new(test_config(dir), Arc::new(StubContentApi::default()))
        .await
        .expect("state");
    ocs_api::routes::app_router(state)
}

/// Issue a GET request against the router.
pub async fn get(app: Router, uri: &str) -> axum::response::Response {
    let request = axum::http::Request::builder()
        .method(axum::http::Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Server under test
// ---------------------------------------------------------------------------

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub dir: TempDir,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(StubContentApi::default()).await
    }

    pub async fn start_with(api: StubContentApi) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = AppState::new(test_config(&dir), Arc::new(api))
            .await
            .expect("state");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(server::serve(
            state.clone(),
            listener,
            std::future::pending(),
        ));

        Self {
            addr,
            state,
            dir,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn data_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("data")
    }

    pub async fn connect(&self) -> TestClient {
        let (stream, _) = tokio_tungstenite::connect_async(self.url())
            .await
            .expect("websocket connect");
        TestClient {
            stream,
            pending: VecDeque::new(),
        }
    }

    /// Wait for the serve task to end.
    pub async fn join(self) -> std::io::Result<()> {
        tokio::time::timeout(RECV_TIMEOUT, self.handle)
            .await
            .expect("server should stop")
            .expect("server task")
    }
}

// ---------------------------------------------------------------------------
// WebSocket client
// ---------------------------------------------------------------------------

pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Envelopes received while waiting for something else.
    pending: VecDeque<Envelope>,
}

impl TestClient {
    pub async fn send(&mut self, envelope: &Envelope) {
        self.send_raw(&envelope.to_json()).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .expect("send");
    }

    pub async fn send_binary(&mut self, bytes: &[u8]) {
        self.stream
            .send(Message::Binary(bytes.to_vec()))
            .await
            .expect("send");
    }

    /// Send a call and wait for its reply.
    pub async fn call(&mut self, id: &str, func: &str, data: Vec<Value>) -> Envelope {
        self.send(&Envelope::call(id, func, data)).await;
        self.reply(id).await
    }

    /// Next envelope from the socket, or `None` once it is closed.
    async fn read(&mut self, wait: Duration) -> Option<Envelope> {
        loop {
            let next = tokio::time::timeout(wait, self.stream.next())
                .await
                .ok()??;
            match next {
                Ok(Message::Text(text)) => {
                    return Some(Envelope::from_slice(text.as_bytes()).expect("valid envelope"));
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Wait for the reply carrying `id`, buffering anything else.
    pub async fn reply(&mut self, id: &str) -> Envelope {
        if let Some(pos) = self.pending.iter().position(|e| e.id == id) {
            return self.pending.remove(pos).expect("position is valid");
        }
        loop {
            let envelope = self.read(RECV_TIMEOUT).await.expect("reply before timeout");
            if envelope.id == id {
                return envelope;
            }
            self.pending.push_back(envelope);
        }
    }

    /// Wait for the next broadcast named `func`, buffering anything else.
    pub async fn event(&mut self, func: &str) -> Envelope {
        let mut events = self.events_until(func).await;
        events.pop().expect("at least the matching event")
    }

    /// Every broadcast (empty `id`) received up to and including the first
    /// `func` event.
    pub async fn events_until(&mut self, func: &str) -> Vec<Envelope> {
        let mut seen = Vec::new();
        while let Some(envelope) = self.pending.pop_front() {
            if !envelope.id.is_empty() {
                continue;
            }
            let done = envelope.func == func;
            seen.push(envelope);
            if done {
                return seen;
            }
        }
        loop {
            let envelope = self
                .read(RECV_TIMEOUT)
                .await
                .unwrap_or_else(|| panic!("timed out waiting for {func}"));
            if !envelope.id.is_empty() {
                self.pending.push_back(envelope);
                continue;
            }
            let done = envelope.func == func;
            seen.push(envelope);
            if done {
                return seen;
            }
        }
    }

    /// Assert nothing at all arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        assert!(self.pending.is_empty(), "unexpected buffered: {:?}", self.pending);
        if let Ok(Some(msg)) = tokio::time::timeout(wait, self.stream.next()).await {
            panic!("expected silence, got {msg:?}");
        }
    }

    /// Wait until the server closes the connection.
    pub async fn closed(&mut self) {
        while self.read(RECV_TIMEOUT).await.is_some() {}
    }
}

// ---------------------------------------------------------------------------
// File server for downloads
// ---------------------------------------------------------------------------

/// Size of every `/slow/*` response.
pub const SLOW_BODY_LEN: usize = 1000;

/// Serve download fixtures on an ephemeral port.
///
/// - `/files/{name}`: small plain body.
/// - `/slow/{name}`: ten 100-byte chunks, 30 ms apart, with `Content-Length`.
/// - `/zip/{name}`: an archive holding `Theme/index.theme` and `README`.
/// Anything else is a 404.
pub async fn spawn_file_server() -> SocketAddr {
    let app = Router::new()
        .route(
            "/files/{name}",
            routing::get(|Path(name): Path<String>| async move { format!("contents of {name}") }),
        )
        .route("/slow/{name}", routing::get(slow_body))
        .route("/zip/{name}", routing::get(|| async { zip_fixture() }));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("file server");
    });
    addr
}

async fn slow_body() -> impl axum::response::IntoResponse {
    let chunks = futures::stream::unfold(0usize, |sent| async move {
        if sent == 10 {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        Some((
            Ok::<_, std::io::Error>(Bytes::from(vec![b'x'; SLOW_BODY_LEN / 10])),
            sent + 1,
        ))
    });
    (
        [(CONTENT_LENGTH, SLOW_BODY_LEN.to_string())],
        Body::from_stream(chunks),
    )
}

/// Zip archive bytes served by `/zip/{name}`.
pub fn zip_fixture() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("Theme/index.theme", options).unwrap();
    writer.write_all(b"[Icon Theme]\nName=Theme\n").unwrap();
    writer.start_file("README", options).unwrap();
    writer.write_all(b"readme").unwrap();
    writer.finish().unwrap().into_inner()
}
