use std::sync::Arc;

use ocs_events::EventBus;
use ocs_jobs::JobRegistry;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::handlers::{
    self, ConfigError, ConfigHandler, ContentApi, DesktopThemeHandler, Handlers, ItemHandler,
    OcsApiHandler, ServerControl, SystemHandler, UpdateHandler,
};
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Registry of connected clients.
    pub ws_manager: Arc<WsManager>,
    /// Typed lifecycle events, fanned out to every client.
    pub event_bus: Arc<EventBus>,
    /// In-flight download and update jobs.
    pub jobs: Arc<JobRegistry>,
    /// Handler subsystems.
    pub handlers: Handlers,
    /// Function table built from `handlers`.
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Load the user configuration and wire every subsystem.
    pub async fn new(
        config: ServerConfig,
        content_api: Arc<dyn ContentApi>,
    ) -> Result<Self, ConfigError> {
        let settings = Arc::new(ConfigHandler::load(&config.config_dir, &config.data_dir).await?);
        let event_bus = Arc::new(EventBus::default());
        let jobs = Arc::new(JobRegistry::new(config.job_poll_interval));
        let http = reqwest::Client::new();
        let staging_dir = config.staging_dir();

        let ocs_api = Arc::new(OcsApiHandler::new(Arc::clone(&settings), content_api));
        let item = Arc::new(ItemHandler::new(
            Arc::clone(&settings),
            Arc::clone(&jobs),
            Arc::clone(&event_bus),
            http.clone(),
            staging_dir.clone(),
        ));
        let update = Arc::new(UpdateHandler::new(
            Arc::clone(&settings),
            Arc::clone(&ocs_api),
            Arc::clone(&jobs),
            Arc::clone(&event_bus),
            http,
            staging_dir,
        ));

        let handlers = Handlers {
            server: Arc::new(ServerControl::new(CancellationToken::new())),
            config: settings,
            system: Arc::new(SystemHandler::new()),
            ocs_api,
            item,
            update,
            desktop_theme: Arc::new(DesktopThemeHandler::from_env()),
        };
        let dispatcher = Arc::new(Dispatcher::new(handlers::register_all(&handlers)));

        Ok(Self {
            config: Arc::new(config),
            ws_manager: Arc::new(WsManager::new()),
            event_bus,
            jobs,
            handlers,
            dispatcher,
        })
    }
}
